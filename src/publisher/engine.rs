//! Resilient publisher
//!
//! The publisher owns one transport session at a time and keeps desk events
//! flowing to the hub across connection failures:
//!
//! - while connected (and nothing is waiting in the queue) `publish` invokes
//!   the hub directly and hands invocation failures back to the caller
//! - otherwise the payload is serialized into the `OutboundQueue` and
//!   `publish` returns immediately
//! - every transition into `Connected` drains the whole queue in enqueue
//!   order; a failed dispatch puts the message back at the head, and the
//!   drain resumes after `drain_retry_delay` if the session is still up
//!
//! Session lifecycle events arrive on one channel for the publisher's whole
//! life and are handled by a single event task:
//!
//! | event          | reaction                                          |
//! |----------------|---------------------------------------------------|
//! | `StateChanged` | record the state; drain on `Connected`            |
//! | `Reconnecting` | mark reconnecting                                 |
//! | `Reconnected`  | clear reconnecting                                |
//! | `Closed`       | schedule a delayed `initialize_connection`        |
//! | `Error`        | clear reconnecting, `initialize_connection` now   |
//!
//! At most one reconnect timer exists at a time. Once `dispose` has begun no
//! timer is armed and no session is (re)initialized.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PublisherSettings;
use crate::hub::{DeskClientEvent, HubMethod};
use crate::publisher::queue::OutboundQueue;
use crate::publisher::reconnect::ReconnectState;
use crate::transport::session::{
    ConnectionState, SessionEvent, SessionEvents, SessionFactory, SessionGeneration,
    TransportSession,
};
use crate::utils::error::{PublishError, SessionError};

type EventReceiver = mpsc::UnboundedReceiver<(SessionGeneration, SessionEvent)>;

#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Delay before a closed session is replaced.
    pub reconnect_delay: Duration,
    /// Delay before retrying a queued message that failed while connected.
    pub drain_retry_delay: Duration,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(5000),
            drain_retry_delay: Duration::from_millis(1000),
        }
    }
}

impl From<&PublisherSettings> for PublisherOptions {
    fn from(settings: &PublisherSettings) -> Self {
        Self {
            reconnect_delay: settings.reconnect_delay(),
            drain_retry_delay: settings.drain_retry_delay(),
        }
    }
}

/// Handle to a running publisher. Clones share the same connection and
/// queue. Call [`Publisher::dispose`] once at shutdown.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

struct Inner {
    factory: Arc<dyn SessionFactory>,
    options: PublisherOptions,
    queue: OutboundQueue,
    session: RwLock<Option<Arc<dyn TransportSession>>>,
    generation: AtomicU64,
    events_tx: mpsc::UnboundedSender<(SessionGeneration, SessionEvent)>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect: ReconnectState,
    disposing: AtomicBool,
    shutdown: CancellationToken,
    /// Serializes session (re)initialization with disposal.
    init_lock: tokio::sync::Mutex<()>,
    /// Keeps the queue to a single consumer.
    drain_lock: tokio::sync::Mutex<()>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    /// Create the publisher and make the first connection attempt.
    ///
    /// A failed first attempt is not an error: the publisher starts
    /// disconnected, queues what it is given and keeps retrying.
    pub async fn start(factory: Arc<dyn SessionFactory>, options: PublisherOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let inner = Arc::new(Inner {
            factory,
            options,
            queue: OutboundQueue::new(),
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            events_tx,
            state_tx,
            reconnect: ReconnectState::default(),
            disposing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            init_lock: tokio::sync::Mutex::new(()),
            drain_lock: tokio::sync::Mutex::new(()),
            event_task: Mutex::new(None),
        });

        let event_task = tokio::spawn(Inner::run_events(inner.clone(), events_rx));
        *inner
            .event_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(event_task);

        inner.initialize_connection().await;
        Self { inner }
    }

    /// Publish `payload` to `method` on the hub.
    ///
    /// Returns once the hub accepted the call, or as soon as the payload is
    /// queued when the publisher is not connected. A session that drops
    /// between the state check and the send also leads to queueing.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        method: HubMethod,
        payload: &T,
    ) -> Result<(), PublishError> {
        let inner = &self.inner;
        if inner.disposing.load(Ordering::SeqCst) {
            return Err(PublishError::Disposed);
        }

        if let Some(session) = inner.connected_session() {
            if inner.queue.is_idle() {
                let value = serde_json::to_value(payload)?;
                match session.invoke(method.as_str(), value).await {
                    Ok(()) => {
                        debug!(method = %method, "published");
                        return Ok(());
                    }
                    Err(SessionError::NotConnected) => {
                        debug!(method = %method, "session went away before send, queueing");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let order = inner.queue.enqueue(method, payload)?;
        debug!(method = %method, order, queued = inner.queue.len(), "queued");

        if inner.connected_session().is_some() {
            inner.spawn_drain();
        }
        Ok(())
    }

    pub async fn publish_added(&self, event: &DeskClientEvent) -> Result<(), PublishError> {
        self.publish(HubMethod::DeskEventAdded, event).await
    }

    pub async fn publish_updated(&self, events: &[DeskClientEvent]) -> Result<(), PublishError> {
        self.publish(HubMethod::DeskEventUpdated, events).await
    }

    /// Connection state as last reported by the current session.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of messages waiting for a connection.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnect.is_reconnecting()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.inner.reconnect.is_armed()
    }

    /// Stop the publisher for good.
    ///
    /// Cancels any pending reconnect, waits for an in-progress
    /// initialization, stops the session and discards undelivered messages.
    /// Safe to call more than once and from several tasks.
    pub async fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("disposing publisher");

        inner.shutdown.cancel();
        inner.reconnect.cancel();

        let _guard = inner.init_lock.lock().await;
        let session = inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.stop().await;
        }

        if let Some(task) = inner
            .event_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }

        let dropped = inner.queue.clear();
        if dropped > 0 {
            warn!(dropped, "discarded undelivered messages on dispose");
        }
        inner.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

impl Inner {
    fn current_session(&self) -> Option<Arc<dyn TransportSession>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn connected_session(&self) -> Option<Arc<dyn TransportSession>> {
        self.current_session()
            .filter(|session| session.state() == ConnectionState::Connected)
    }

    fn is_disposing(&self) -> bool {
        self.disposing.load(Ordering::SeqCst)
    }

    /// Replace the session with a fresh one and start it.
    async fn initialize_connection(self: &Arc<Self>) {
        let _guard = self.init_lock.lock().await;
        if self.is_disposing() {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = self
            .factory
            .create(SessionEvents::new(generation, self.events_tx.clone()));

        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session.clone());
        if let Some(previous) = previous {
            if previous.state().is_active() {
                debug!(generation, "stopping previous session");
                previous.stop().await;
            }
        }

        info!(generation, "starting session");
        if let Err(e) = session.start().await {
            error!(generation, error = %e, "session start failed");
            self.schedule_reconnect();
        }
    }

    /// Arm the one-shot reconnect timer unless one is already pending.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_disposing() {
            debug!("disposing, reconnect not scheduled");
            return;
        }
        if !self.reconnect.try_arm() {
            debug!("reconnect already pending");
            return;
        }
        if self.is_disposing() {
            self.reconnect.cancel();
            return;
        }

        let delay = self.options.reconnect_delay;
        info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        let inner = self.clone();
        self.reconnect.start_timer(move || {
            tokio::spawn(async move {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => inner.reconnect.fired(),
                    _ = tokio::time::sleep(delay) => {
                        inner.reconnect.fired();
                        inner.initialize_connection().await;
                    }
                }
            })
        });
    }

    async fn run_events(self: Arc<Self>, mut events: EventReceiver) {
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = events.recv() => next,
            };
            let Some((generation, event)) = next else {
                break;
            };

            if generation != self.generation.load(Ordering::SeqCst) {
                debug!(generation, ?event, "ignoring event from replaced session");
                continue;
            }
            self.handle_event(event).await;
        }
        debug!("publisher event loop stopped");
    }

    async fn handle_event(self: &Arc<Self>, event: SessionEvent) {
        match event {
            SessionEvent::StateChanged { old, new } => {
                debug!(?old, ?new, "connection state changed");
                self.state_tx.send_replace(new);
                if new == ConnectionState::Connected {
                    self.spawn_drain();
                }
            }
            SessionEvent::Reconnecting => {
                info!("session reconnecting");
                self.reconnect.set_reconnecting(true);
            }
            SessionEvent::Reconnected => {
                info!("session reconnected");
                self.reconnect.set_reconnecting(false);
            }
            SessionEvent::Closed => {
                info!("session closed");
                self.schedule_reconnect();
            }
            SessionEvent::Error(e) => {
                self.reconnect.set_reconnecting(false);
                error!(error = %e, "session error, reinitializing");
                self.initialize_connection().await;
            }
        }
    }

    fn spawn_drain(self: &Arc<Self>) {
        let inner = self.clone();
        tokio::spawn(async move { inner.drain().await });
    }

    fn spawn_drain_after(self: &Arc<Self>, delay: Duration) {
        let inner = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.drain().await,
            }
        });
    }

    /// Deliver queued messages in order for as long as the session stays
    /// connected.
    async fn drain(self: &Arc<Self>) {
        let _consumer = self.drain_lock.lock().await;

        while !self.is_disposing() {
            let Some(session) = self.connected_session() else {
                break;
            };
            let Some(message) = self.queue.pop_front() else {
                break;
            };

            let payload = match message.payload_value() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(order = message.order, error = %e, "dropping undecodable queued message");
                    self.queue.complete();
                    continue;
                }
            };

            match session.invoke(message.method.as_str(), payload).await {
                Ok(()) => {
                    debug!(method = %message.method, order = message.order, "delivered queued message");
                    self.queue.complete();
                }
                Err(SessionError::Remote(reason)) => {
                    // rejected by the hub, not retried
                    error!(
                        method = %message.method,
                        order = message.order,
                        reason = %reason,
                        "hub rejected queued message, dropping it"
                    );
                    self.queue.complete();
                }
                Err(e) => {
                    warn!(
                        method = %message.method,
                        order = message.order,
                        error = %e,
                        "queued message not delivered"
                    );
                    self.queue.requeue_front(message);
                    // a timeout leaves the session connected, so no new
                    // Connected transition will restart the drain
                    if session.state() == ConnectionState::Connected {
                        self.spawn_drain_after(self.options.drain_retry_delay);
                    }
                    break;
                }
            }
        }
    }
}
