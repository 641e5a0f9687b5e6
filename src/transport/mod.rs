//! The `transport` module is responsible for network communication between
//! publishers, the hub and listeners.
//!
//! It defines the session abstraction the publisher depends on, the JSON
//! frame protocol, the server-side session registry, the WebSocket hub
//! server and the WebSocket client session.

pub mod message;
pub mod registry;
pub mod session;
pub mod websocket;
pub mod ws_session;

pub use message::{ClientMessage, ServerMessage};
pub use registry::SessionRegistry;
pub use session::{
    ConnectionState, SessionEvent, SessionEvents, SessionFactory, SessionGeneration,
    TransportSession,
};
pub use websocket::{serve, start_websocket_server};
pub use ws_session::{HubBroadcast, WsSession, WsSessionConfig, WsSessionFactory};

#[cfg(test)]
mod tests;
