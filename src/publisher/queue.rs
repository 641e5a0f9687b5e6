//! Outbound queue
//!
//! Messages published while the session is not connected wait here until
//! the next transition into `Connected`. Any number of tasks may enqueue;
//! only the publisher's drain task dequeues.
//!
//! A dequeued message counts as "in flight" until the drain reports the
//! outcome: `complete` forgets it, `requeue_front` puts it back at the head
//! so nothing is lost when a dispatch fails. While anything is queued or in
//! flight the queue is not idle, and new publishes must queue behind it to
//! keep enqueue order.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use crate::hub::HubMethod;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub method: HubMethod,
    /// Serialized JSON payload.
    pub payload: Vec<u8>,
    /// Position in enqueue order, starting at 0.
    pub order: u64,
}

impl QueuedMessage {
    pub fn payload_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<QueuedMessage>,
    next_order: u64,
    in_flight: bool,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize `payload` and append it. Returns the message's order.
    pub fn enqueue<T: Serialize + ?Sized>(
        &self,
        method: HubMethod,
        payload: &T,
    ) -> Result<u64, serde_json::Error> {
        let payload = serde_json::to_vec(payload)?;
        let mut inner = self.lock();
        let order = inner.next_order;
        inner.next_order += 1;
        inner.items.push_back(QueuedMessage {
            method,
            payload,
            order,
        });
        Ok(order)
    }

    /// Take the oldest message and mark it in flight.
    pub fn pop_front(&self) -> Option<QueuedMessage> {
        let mut inner = self.lock();
        let message = inner.items.pop_front();
        inner.in_flight = message.is_some();
        message
    }

    /// The in-flight message was delivered.
    pub fn complete(&self) {
        self.lock().in_flight = false;
    }

    /// The in-flight message was not delivered; put it back at the head.
    pub fn requeue_front(&self, message: QueuedMessage) {
        let mut inner = self.lock();
        inner.items.push_front(message);
        inner.in_flight = false;
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        let inner = self.lock();
        inner.items.is_empty() && !inner.in_flight
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Drop everything still queued. Returns how many messages were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.items.len();
        inner.items.clear();
        inner.in_flight = false;
        dropped
    }
}
