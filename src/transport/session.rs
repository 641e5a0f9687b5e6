//! Transport session abstraction
//!
//! The publisher never talks to a socket directly. It owns one
//! `TransportSession` at a time, obtained from a `SessionFactory`, and
//! learns about the session's lifecycle through a single event channel.
//!
//! Every session is created with a `SessionEvents` handle stamped with a
//! generation number. The publisher keeps one receiver for the whole of its
//! life and drops events whose generation is not the current one, so a
//! replaced session can keep talking without confusing the state machine.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::utils::error::SessionError;

pub type SessionGeneration = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    /// Connecting, connected or reconnecting: anything that should be stopped
    /// before the session is replaced.
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

/// Lifecycle notifications raised by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The connection failed underneath the session.
    Error(SessionError),
    /// The session lost its connection and is trying to get it back.
    Reconnecting,
    /// The session got its connection back on its own.
    Reconnected,
    /// The session is down for good; only a new session can recover.
    Closed,
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
}

/// Sending half of the publisher's event channel, bound to one session.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    generation: SessionGeneration,
    tx: mpsc::UnboundedSender<(SessionGeneration, SessionEvent)>,
}

impl SessionEvents {
    pub fn new(
        generation: SessionGeneration,
        tx: mpsc::UnboundedSender<(SessionGeneration, SessionEvent)>,
    ) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    /// Raise an event. Silently dropped once the publisher is gone.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send((self.generation, event));
    }
}

/// A bidirectional connection to the hub.
///
/// `start` and `stop` drive the connection; `invoke` is a remote call
/// addressed by method name. Implementations report every state transition
/// through the `SessionEvents` they were created with.
pub trait TransportSession: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Connect. Resolves once the session is connected or has given up.
    fn start(&self) -> BoxFuture<'_, Result<(), SessionError>>;

    /// Disconnect and release the connection. Must be idempotent.
    fn stop(&self) -> BoxFuture<'_, ()>;

    /// Invoke `method` on the hub. Resolves when the hub has accepted the
    /// call or the invocation failed.
    fn invoke(&self, method: &str, payload: Value) -> BoxFuture<'_, Result<(), SessionError>>;
}

/// Builds a fresh session for every connection attempt.
pub trait SessionFactory: Send + Sync {
    fn create(&self, events: SessionEvents) -> Arc<dyn TransportSession>;
}
