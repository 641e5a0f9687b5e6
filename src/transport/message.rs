//! Wire frames exchanged between publisher sessions, the hub server and
//! listeners. Every frame is a JSON text message tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent by a session to the hub server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Invoke `method` on `hub`. The server answers with a
    /// [`ServerMessage::Completion`] carrying the same `invocation_id`.
    #[serde(rename = "invoke")]
    Invoke {
        hub: String,
        method: String,
        invocation_id: String,
        payload: Value,
    },
}

/// Frames sent by the hub server to attached sessions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Result of a [`ClientMessage::Invoke`]; `error` is `None` on success.
    #[serde(rename = "completion")]
    Completion {
        invocation_id: String,
        error: Option<String>,
    },
    /// A broadcast: the hub invoking `method` on every attached session.
    #[serde(rename = "invoke")]
    Invoke { method: String, payload: Value },
}
