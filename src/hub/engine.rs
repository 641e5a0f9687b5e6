//! Broadcast hub
//!
//! The hub is the server-side counterpart of the publisher. It has no state
//! of its own: every received event is immediately re-invoked on all sessions
//! currently held by the transport's `SessionRegistry`. There is no
//! buffering, acknowledgement or ordering across receivers; a session that
//! cannot be reached is the registry's problem, not the hub's.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::debug;

use crate::hub::event::{DeskClientEvent, HubMethod};
use crate::transport::registry::SessionRegistry;
use crate::utils::error::HubError;

#[derive(Debug, Clone)]
pub struct ObservationDeckHub {
    registry: Arc<Mutex<SessionRegistry>>,
}

impl ObservationDeckHub {
    pub fn new(registry: Arc<Mutex<SessionRegistry>>) -> Self {
        Self { registry }
    }

    /// Fan a single added event out to every attached session.
    pub fn receive_added(&self, event: &DeskClientEvent) -> usize {
        self.fan_out(HubMethod::DeskEventAdded, event)
    }

    /// Fan a batch of updated events out to every attached session.
    pub fn receive_updated(&self, events: &[DeskClientEvent]) -> usize {
        self.fan_out(HubMethod::DeskEventUpdated, events)
    }

    /// Route a string-keyed invocation to the matching hub method.
    ///
    /// The payload is decoded into the method's parameter type before
    /// anything is broadcast, so a malformed call reaches nobody.
    pub fn dispatch(&self, method: &str, payload: Value) -> Result<usize, HubError> {
        let hub_method =
            HubMethod::from_name(method).ok_or_else(|| HubError::UnknownMethod(method.to_string()))?;
        let invalid = |source| HubError::InvalidPayload {
            method: method.to_string(),
            source,
        };

        match hub_method {
            HubMethod::DeskEventAdded => {
                let event: DeskClientEvent = serde_json::from_value(payload).map_err(invalid)?;
                Ok(self.receive_added(&event))
            }
            HubMethod::DeskEventUpdated => {
                let events: Vec<DeskClientEvent> =
                    serde_json::from_value(payload).map_err(invalid)?;
                Ok(self.receive_updated(&events))
            }
        }
    }

    fn fan_out<T: serde::Serialize + ?Sized>(&self, method: HubMethod, payload: &T) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let recipients = registry.broadcast(method.client_method(), payload);
        debug!(method = %method, recipients, "hub fan-out");
        recipients
    }
}
