//! The `hub` module is the server half of the bridge: the desk event types
//! and the stateless broadcast hub that fans every received event out to all
//! attached sessions.

pub mod engine;
pub mod event;

pub use engine::ObservationDeckHub;
pub use event::{DeskClientEvent, HubMethod};

#[cfg(test)]
mod tests;
