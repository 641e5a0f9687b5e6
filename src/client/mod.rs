//! The `client` module defines the server-side representation of an attached
//! session.
//!
//! It provides the `Client` struct, which encapsulates the state of a single
//! connected peer, including its unique identifier and the channel used to
//! push frames to it.

pub mod hub_client;
pub use hub_client::{Client, ClientId};

#[cfg(test)]
mod tests;
