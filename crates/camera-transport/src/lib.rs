//! Endpoint addressing and datagram transport for encoded frames.
//!
//! A [`Transport`] accepts encoded payloads for one endpoint. Delivery
//! failures are reported per payload and never retried here.

mod datagram;
mod endpoint;
mod error;
mod udp;

pub use datagram::{
    fragment, max_payload_len, DatagramHeader, ReassembledPayload, Reassembler, DATAGRAM_HEADER_LEN,
    DATAGRAM_MAGIC, DATAGRAM_VERSION,
};
pub use endpoint::{Endpoint, Scheme};
pub use error::TransportError;
pub use udp::UdpTransport;

use camera_encoder::EncodedPayload;

/// Channel capacity for payloads waiting to be written to the socket.
pub const PAYLOAD_CHANNEL_CAPACITY: usize = 30;

/// Partial payloads a [`Reassembler`] tracks before evicting the oldest.
pub const REASSEMBLY_WINDOW: usize = 8;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatistics {
    pub bytes_sent: u64,
    pub payloads_sent: u64,
    pub datagrams_sent: u64,
    pub payloads_dropped: u64,
    pub socket_errors: u64,
}

/// Trait for transports.
pub trait Transport: Send {
    /// Hand one payload over for delivery. Ownership moves to the transport.
    fn send(&mut self, payload: EncodedPayload) -> TransportResult<()>;

    /// Flush what can be flushed and release the connection.
    fn close(&mut self) -> TransportResult<()>;

    /// Get transport statistics.
    fn statistics(&self) -> TransportStatistics;

    /// Get transport name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Open a transport for an endpoint string such as `udp://localhost:5000`.
pub fn open_transport(
    endpoint: &str,
    max_datagram_size: usize,
) -> TransportResult<Box<dyn Transport>> {
    let endpoint = Endpoint::parse(endpoint)?;
    match endpoint.scheme() {
        Scheme::Udp => Ok(Box::new(UdpTransport::open(&endpoint, max_datagram_size)?)),
    }
}
