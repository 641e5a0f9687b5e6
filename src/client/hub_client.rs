//! Attached session representation
//!
//! `Client` models a peer attached to the hub and holds the sending side of
//! a per-connection channel. The WebSocket send loop owns the receiving side
//! and writes whatever arrives to the socket, so pushing to a client never
//! blocks on network I/O.

use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

pub type ClientId = String;

#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub sender: UnboundedSender<WsMessage>,
    /// Milliseconds since the UNIX epoch.
    pub connected_at: i64,
}

impl Client {
    /// Create a new client with a sender channel. The `id` is a UUID used
    /// to identify the client in the session registry.
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            connected_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Queue a frame for this client. Returns `false` once the send loop is gone.
    pub fn push(&self, frame: WsMessage) -> bool {
        self.sender.send(frame).is_ok()
    }
}
