//! Session registry
//!
//! The registry owns the set of sessions currently attached to the hub
//! server. The WebSocket server registers a `Client` per accepted connection
//! and removes it when either of its loops ends; the broadcast hub only ever
//! asks it to fan a frame out to everyone.
//!
//! Concurrency note: the registry is synchronous and is held behind an
//! `Arc<Mutex<SessionRegistry>>`. Broadcasting only pushes into unbounded
//! per-client channels, so the lock is never held across network I/O.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::{Client, ClientId};
use crate::transport::message::ServerMessage;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    pub clients: HashMap<ClientId, Client>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn register_client(&mut self, client: Client) {
        debug!(client_id = %client.id, "client attached");
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove_client(&mut self, client_id: &ClientId) -> Option<Client> {
        let removed = self.clients.remove(client_id);
        if let Some(client) = &removed {
            let age_ms = chrono::Utc::now().timestamp_millis() - client.connected_at;
            debug!(client_id = %client_id, age_ms, "client detached");
        }
        removed
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send `client` a single frame. Returns `false` when the client is
    /// unknown or its send loop has ended.
    pub fn send_to(&self, client_id: &ClientId, frame: &ServerMessage) -> bool {
        let Some(client) = self.clients.get(client_id) else {
            return false;
        };
        match serde_json::to_string(frame) {
            Ok(json) => client.push(WsMessage::text(json)),
            Err(e) => {
                warn!(error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Invoke `method` with `payload` on every attached client.
    ///
    /// Returns the number of clients the frame was queued for. Per-client
    /// failures are logged and skipped.
    pub fn broadcast<T: Serialize + ?Sized>(&self, method: &str, payload: &T) -> usize {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(method, error = %e, "failed to serialize broadcast payload");
                return 0;
            }
        };
        let frame = ServerMessage::Invoke {
            method: method.to_string(),
            payload,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!(method, error = %e, "failed to serialize broadcast frame");
                return 0;
            }
        };

        let ws_msg = WsMessage::text(text);
        let mut delivered = 0;
        for (client_id, client) in &self.clients {
            if client.push(ws_msg.clone()) {
                delivered += 1;
            } else {
                warn!(client_id = %client_id, method, "failed to queue broadcast for client");
            }
        }
        debug!(method, recipients = delivered, "broadcast");
        delivered
    }
}
