//! Error types for the postwatch system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for postwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the postwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// The snapshot store could not be opened, read or committed
    #[error("Snapshot store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store operation was attempted before `open` or after `close`
    #[error("Snapshot store is not open")]
    StoreNotOpen,

    /// A snapshot could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// A persisted record could not be deserialized
    #[error("Decode error: {0}")]
    Decode(String),

    /// The remote fetcher failed (network, malformed response)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The notifier failed to deliver a notification
    #[error("Notify error: {0}")]
    Notify(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Carrier-specific error
    #[error("Carrier error ({carrier}): {message}")]
    Carrier {
        /// Carrier name
        carrier: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store-unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a notify error
    pub fn notify(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a carrier-specific error
    pub fn carrier(carrier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Carrier {
            carrier: carrier.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
