//! Desk events and the hub's method names
//!
//! `DeskClientEvent` is what applications publish. The hub and the publisher
//! treat it as an opaque JSON document; only the CLI and tests look inside.
//!
//! Method names are the wire contract with unmodified peers and must not
//! change:
//! - `SendDeskEventAddedMessage` / `SendDeskEventUpdatedMessage`: publisher -> hub
//! - `DeskEventAddedMessage` / `DeskEventUpdatedMessage`: hub -> listeners

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskClientEvent {
    pub id: String,
    pub desk_id: String,
    pub event_type: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub data: Value,
}

impl DeskClientEvent {
    /// Build an event stamped with a fresh id and the current time.
    pub fn new(desk_id: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            desk_id: desk_id.into(),
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            data,
        }
    }
}

/// Remote methods exposed by the broadcast hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMethod {
    /// Carries a single `DeskClientEvent`.
    DeskEventAdded,
    /// Carries a sequence of `DeskClientEvent`s.
    DeskEventUpdated,
}

impl HubMethod {
    pub const ALL: [HubMethod; 2] = [HubMethod::DeskEventAdded, HubMethod::DeskEventUpdated];

    /// Name invoked on the hub.
    pub const fn as_str(self) -> &'static str {
        match self {
            HubMethod::DeskEventAdded => "SendDeskEventAddedMessage",
            HubMethod::DeskEventUpdated => "SendDeskEventUpdatedMessage",
        }
    }

    /// Name the hub invokes on every attached session.
    pub const fn client_method(self) -> &'static str {
        match self {
            HubMethod::DeskEventAdded => "DeskEventAddedMessage",
            HubMethod::DeskEventUpdated => "DeskEventUpdatedMessage",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl std::fmt::Display for HubMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
