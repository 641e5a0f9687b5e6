//! The `error` module defines the error types used within `deskhub`.
//!
//! Each layer gets its own enum so callers can tell a transient transport
//! failure apart from a rejected invocation or a broken configuration:
//!
//! - [`SessionError`]: failures of a transport session (connect, send, invoke).
//! - [`PublishError`]: what `Publisher::publish` can hand back to its caller.
//! - [`HubError`]: rejections produced by the broadcast hub's dispatcher.
//! - [`SettingsError`]: fatal startup configuration problems.

use thiserror::Error;

/// Errors raised by a transport session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// An invocation was attempted while the session was not connected.
    #[error("session is not connected")]
    NotConnected,

    /// The established connection failed underneath the session.
    #[error("transport error: {0}")]
    Transport(String),

    /// Writing a frame to the connection failed.
    #[error("send failed: {0}")]
    Send(String),

    /// No completion arrived for an invocation in time.
    #[error("invocation {0} timed out")]
    Timeout(String),

    /// The remote hub answered the invocation with an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// The session was stopped while the invocation was in flight.
    #[error("session closed")]
    Closed,
}

/// Errors returned to callers of `Publisher::publish`.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The payload could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The remote invocation failed while connected.
    #[error("invocation failed: {0}")]
    Invoke(#[from] SessionError),

    /// The publisher has been disposed.
    #[error("publisher is disposed")]
    Disposed,
}

/// Errors produced when the hub routes an inbound invocation.
#[derive(Error, Debug)]
pub enum HubError {
    /// No hub method is registered under this name.
    #[error("unknown hub method: {0}")]
    UnknownMethod(String),

    /// The payload does not match the method's parameter type.
    #[error("invalid payload for {method}: {source}")]
    InvalidPayload {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Fatal configuration problems detected at startup.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Loading or deserializing the configuration sources failed.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// `publisher.hub_url` is not set.
    #[error("publisher.hub_url is not configured")]
    MissingEndpoint,

    /// `publisher.hub_url` is not a usable WebSocket URL.
    #[error("invalid hub endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}
