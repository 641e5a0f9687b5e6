//! WebSocket transport session
//!
//! `WsSession` is the `TransportSession` the binary uses to reach the hub
//! server. It keeps a writer task fed by an unbounded channel (the same
//! arrangement the server uses for its clients) and a runner task that reads
//! frames, resolves invocation completions and handles connection loss:
//!
//! - the peer closes the stream: signal `Reconnecting`, retry the connection
//!   `session_retry_attempts` times, then signal `Reconnected` or `Closed`
//! - the stream errors: go `Disconnected` and signal `Error`
//!
//! A session is single-use. Once stopped it cannot be started again; the
//! publisher asks the factory for a new one instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::stream::{SplitStream, StreamExt};
use futures_util::SinkExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use url::Url;
use uuid::Uuid;

use crate::config::Settings;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::transport::session::{
    ConnectionState, SessionEvent, SessionEvents, SessionFactory, TransportSession,
};
use crate::utils::error::{SessionError, SettingsError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Completion = oneshot::Sender<Result<(), SessionError>>;

/// A broadcast received from the hub, forwarded to an optional listener.
#[derive(Debug, Clone, PartialEq)]
pub struct HubBroadcast {
    pub method: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct WsSessionConfig {
    pub url: Url,
    pub hub_name: String,
    pub connect_timeout: Duration,
    pub invoke_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl WsSessionConfig {
    /// Build the session config from settings. Fails when the hub endpoint
    /// is missing or malformed.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let publisher = &settings.publisher;
        Ok(Self {
            url: settings.hub_endpoint()?,
            hub_name: publisher.hub_name.clone(),
            connect_timeout: publisher.connect_timeout(),
            invoke_timeout: publisher.invoke_timeout(),
            retry_attempts: publisher.session_retry_attempts,
            retry_delay: publisher.session_retry_delay(),
        })
    }
}

pub struct WsSessionFactory {
    config: WsSessionConfig,
    listener: Option<mpsc::UnboundedSender<HubBroadcast>>,
}

impl WsSessionFactory {
    pub fn new(config: WsSessionConfig) -> Self {
        Self {
            config,
            listener: None,
        }
    }

    /// Forward every broadcast received by sessions from this factory.
    pub fn with_listener(mut self, listener: mpsc::UnboundedSender<HubBroadcast>) -> Self {
        self.listener = Some(listener);
        self
    }
}

impl SessionFactory for WsSessionFactory {
    fn create(&self, events: SessionEvents) -> Arc<dyn TransportSession> {
        Arc::new(WsSession::new(
            self.config.clone(),
            events,
            self.listener.clone(),
        ))
    }
}

pub struct WsSession {
    shared: Arc<Shared>,
}

struct Shared {
    config: WsSessionConfig,
    events: SessionEvents,
    listener: Option<mpsc::UnboundedSender<HubBroadcast>>,
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    pending: Mutex<HashMap<String, Completion>>,
    runner: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WsSession {
    pub fn new(
        config: WsSessionConfig,
        events: SessionEvents,
        listener: Option<mpsc::UnboundedSender<HubBroadcast>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                events,
                listener,
                state: Mutex::new(ConnectionState::Disconnected),
                outbound: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                runner: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }
}

impl TransportSession for WsSession {
    fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    fn start(&self) -> BoxFuture<'_, Result<(), SessionError>> {
        Box::pin(async move {
            let shared = &self.shared;
            if shared.stopped.load(Ordering::SeqCst) {
                return Err(SessionError::Closed);
            }

            shared.set_state(ConnectionState::Connecting);
            info!(url = %shared.config.url, generation = shared.events.generation(), "session connecting");

            let ws = match shared.connect().await {
                Ok(ws) => ws,
                Err(e) => {
                    shared.set_state(ConnectionState::Disconnected);
                    return Err(e);
                }
            };

            if shared.stopped.load(Ordering::SeqCst) {
                return Err(SessionError::Closed);
            }

            let reader = shared.attach(ws);
            shared.set_state(ConnectionState::Connected);

            let runner = tokio::spawn(Shared::run(shared.clone(), reader));
            *lock(&shared.runner) = Some(runner);
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let shared = &self.shared;
            if shared.stopped.swap(true, Ordering::SeqCst) {
                return;
            }

            if let Some(runner) = lock(&shared.runner).take() {
                runner.abort();
            }
            if let Some(outbound) = lock(&shared.outbound).take() {
                let _ = outbound.send(WsMessage::Close(None));
            }
            shared.fail_pending(SessionError::Closed);

            let was_active = shared.state().is_active();
            shared.set_state(ConnectionState::Disconnected);
            if was_active {
                shared.events.emit(SessionEvent::Closed);
            }
            debug!(generation = shared.events.generation(), "session stopped");
        })
    }

    fn invoke(&self, method: &str, payload: Value) -> BoxFuture<'_, Result<(), SessionError>> {
        let method = method.to_string();
        Box::pin(async move {
            let shared = &self.shared;
            if shared.state() != ConnectionState::Connected {
                return Err(SessionError::NotConnected);
            }

            let invocation_id = Uuid::new_v4().to_string();
            let frame = ClientMessage::Invoke {
                hub: shared.config.hub_name.clone(),
                method,
                invocation_id: invocation_id.clone(),
                payload,
            };
            let text =
                serde_json::to_string(&frame).map_err(|e| SessionError::Send(e.to_string()))?;

            let (tx, rx) = oneshot::channel();
            lock(&shared.pending).insert(invocation_id.clone(), tx);

            let sent = lock(&shared.outbound)
                .as_ref()
                .is_some_and(|outbound| outbound.send(WsMessage::text(text)).is_ok());
            if !sent {
                lock(&shared.pending).remove(&invocation_id);
                return Err(SessionError::NotConnected);
            }

            match tokio::time::timeout(shared.config.invoke_timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(SessionError::Closed),
                Err(_) => {
                    lock(&shared.pending).remove(&invocation_id);
                    Err(SessionError::Timeout(invocation_id))
                }
            }
        })
    }
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, new: ConnectionState) {
        let old = std::mem::replace(&mut *lock(&self.state), new);
        if old != new {
            self.events.emit(SessionEvent::StateChanged { old, new });
        }
    }

    async fn connect(&self) -> Result<WsStream, SessionError> {
        let url = self.config.url.as_str();
        match tokio::time::timeout(self.config.connect_timeout, connect_async(url)).await {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(SessionError::Connect(e.to_string())),
            Err(_) => Err(SessionError::Connect(format!(
                "timed out after {}ms",
                self.config.connect_timeout.as_millis()
            ))),
        }
    }

    /// Spawn the writer for `ws` and hand back its reading half.
    fn attach(&self, ws: WsStream) -> SplitStream<WsStream> {
        let (mut sink, stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let generation = self.events.generation();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!(generation, error = %e, "failed to write frame");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        *lock(&self.outbound) = Some(tx);
        stream
    }

    async fn run(self: Arc<Self>, mut reader: SplitStream<WsStream>) {
        loop {
            let outcome = self.read_until_closed(&mut reader).await;
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }

            lock(&self.outbound).take();
            self.fail_pending(SessionError::Closed);

            if let Err(e) = outcome {
                warn!(error = %e, "session connection failed");
                self.set_state(ConnectionState::Disconnected);
                self.events.emit(SessionEvent::Error(e));
                return;
            }

            info!(generation = self.events.generation(), "connection closed by peer, reconnecting");
            self.events.emit(SessionEvent::Reconnecting);
            self.set_state(ConnectionState::Reconnecting);

            match self.reconnect().await {
                Some(ws) => {
                    if self.stopped.load(Ordering::SeqCst) {
                        return;
                    }
                    reader = self.attach(ws);
                    self.set_state(ConnectionState::Connected);
                    self.events.emit(SessionEvent::Reconnected);
                }
                None => {
                    self.set_state(ConnectionState::Disconnected);
                    self.events.emit(SessionEvent::Closed);
                    return;
                }
            }
        }
    }

    async fn read_until_closed(&self, reader: &mut SplitStream<WsStream>) -> Result<(), SessionError> {
        while let Some(msg) = reader.next().await {
            match msg {
                Ok(WsMessage::Close(_)) => return Ok(()),
                Ok(msg) if msg.is_text() => {
                    if let Ok(text) = msg.to_text() {
                        self.handle_frame(text);
                    }
                }
                Ok(_) => {}
                Err(e) => return Err(SessionError::Transport(e.to_string())),
            }
        }
        Ok(())
    }

    async fn reconnect(&self) -> Option<WsStream> {
        for attempt in 1..=self.config.retry_attempts {
            tokio::time::sleep(self.config.retry_delay).await;
            if self.stopped.load(Ordering::SeqCst) {
                return None;
            }
            match self.connect().await {
                Ok(ws) => {
                    info!(attempt, "session reconnected");
                    return Some(ws);
                }
                Err(e) => debug!(attempt, error = %e, "session reconnect attempt failed"),
            }
        }
        warn!(attempts = self.config.retry_attempts, "session gave up reconnecting");
        None
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Completion {
                invocation_id,
                error,
            }) => {
                let Some(waiter) = lock(&self.pending).remove(&invocation_id) else {
                    debug!(invocation_id, "completion for unknown invocation");
                    return;
                };
                let result = match error {
                    Some(message) => Err(SessionError::Remote(message)),
                    None => Ok(()),
                };
                let _ = waiter.send(result);
            }
            Ok(ServerMessage::Invoke { method, payload }) => {
                if let Some(listener) = &self.listener {
                    let _ = listener.send(HubBroadcast { method, payload });
                }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    frame = %text.chars().take(100).collect::<String>(),
                    "invalid frame from hub"
                );
            }
        }
    }

    fn fail_pending(&self, error: SessionError) {
        let waiters: Vec<_> = lock(&self.pending).drain().map(|(_, tx)| tx).collect();
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}
