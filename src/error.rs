//! Error types for the RTMP push listener.

use thiserror::Error;

/// Errors raised while opening or reading from a capture source.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Failed to create capture channel: {0}")]
    ChannelCreation(String),

    #[error("Insufficient permissions to capture packets (try running as root)")]
    InsufficientPermissions,

    #[error("Receive error: {0}")]
    Receive(#[from] std::io::Error),
}

/// Errors raised when building a field matcher.
#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("Invalid pattern for {name}: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Empty signature for {0}")]
    EmptySignature(String),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Matcher(#[from] MatcherError),
}
