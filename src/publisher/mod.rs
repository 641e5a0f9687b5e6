//! The `publisher` module is the client half of the bridge: the resilient
//! publisher that keeps one session to the hub alive, queues desk events
//! while the session is down and replays them in order once it is back.

pub mod engine;
pub mod queue;
pub mod reconnect;

pub use engine::{Publisher, PublisherOptions};
pub use queue::{OutboundQueue, QueuedMessage};
