//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint string could not be parsed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Endpoint scheme has no transport.
    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// Endpoint host could not be resolved.
    #[error("Failed to resolve {endpoint}: {reason}")]
    Resolve { endpoint: String, reason: String },

    /// Transport settings are unusable.
    #[error("Invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// Outgoing queue is full; the payload was dropped.
    #[error("Transport backlog full, payload dropped")]
    Backpressure,

    /// Not connected.
    #[error("Not connected")]
    NotConnected,

    /// Payload needs more fragments than the framing can express.
    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Received datagram is not valid framing.
    #[error("Malformed datagram: {0}")]
    MalformedDatagram(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
