//! Error types for crpt-gate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for crpt-gate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// A caller-supplied value was rejected before any waiting or network activity
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The wait for an admission slot was interrupted
    #[error("Wait for an admission slot was cancelled")]
    Cancelled,

    /// No admission slot became free within the allowed wait
    #[error("No admission slot became available within {0:?}")]
    AdmissionTimeout(Duration),

    /// A structured payload was given but no structured encoder is configured
    #[error("No JSON encoder configured; pass the document as serialized JSON text")]
    NoEncoderAvailable,

    /// The configured encoder failed
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Network-level failure reported by the transport
    #[error("Transport failure: {0}")]
    TransportFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for GateError {
    fn from(err: reqwest::Error) -> Self {
        GateError::TransportFailure(Box::new(err))
    }
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for crpt-gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
