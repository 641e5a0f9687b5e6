//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `deskhub` application.
//!
//! This module centralizes the error types shared by the publisher, the hub
//! and the transport, plus the logging bootstrap used by the binary and tests.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("bogus");
    }
}
