//! # DeskHub
//!
//! `deskhub` is a real-time fan-out bridge for desk events. A WebSocket hub
//! re-broadcasts every event it receives to all attached sessions, and a
//! resilient publisher keeps events flowing to that hub across connection
//! failures, queueing them while disconnected and replaying them in order
//! once the connection is back.
//!
//! ## Core Modules
//!
//! - `publisher`: The resilient publisher, its outbound queue and reconnect bookkeeping.
//! - `hub`: Desk event types and the stateless broadcast hub.
//! - `transport`: The session abstraction, the JSON frame protocol, the WebSocket hub server and client session.
//! - `client`: Represents a session attached to the hub server.
//! - `config`: Handles loading and managing configuration.
//! - `utils`: Shared utilities, such as error types and logging.

pub mod client;
pub mod config;
pub mod hub;
pub mod publisher;
pub mod transport;
pub mod utils;
