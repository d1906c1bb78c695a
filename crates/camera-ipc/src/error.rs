//! Construction-time errors.

use thiserror::Error;

/// Errors that prevent a pipeline from being constructed.
///
/// When one of these is returned nothing is left running: any resource
/// opened before the failure has already been released.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Width or height is zero, or the frame size overflows.
    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Endpoint string is empty.
    #[error("Endpoint must not be empty")]
    EmptyEndpoint,

    /// Queue capacity is zero.
    #[error("Queue capacity must be at least 1")]
    InvalidQueueCapacity,

    /// Any other rejected setting.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Endpoint could not be parsed, resolved or opened.
    #[error("Endpoint {endpoint} unavailable: {reason}")]
    EndpointUnavailable { endpoint: String, reason: String },

    /// Encoder could not be created.
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    /// A pipeline thread could not be started.
    #[error("Failed to start {thread} thread: {reason}")]
    Spawn { thread: String, reason: String },
}
