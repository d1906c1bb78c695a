//! UDP transport.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use camera_encoder::EncodedPayload;

use crate::datagram::{fragment, DATAGRAM_HEADER_LEN};
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::{Transport, TransportResult, TransportStatistics, PAYLOAD_CHANNEL_CAPACITY};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Counters {
    bytes_sent: AtomicU64,
    payloads_sent: AtomicU64,
    datagrams_sent: AtomicU64,
    payloads_dropped: AtomicU64,
    socket_errors: AtomicU64,
}

struct Outgoing {
    sequence: u64,
    datagrams: Vec<Bytes>,
}

/// Sends encoded payloads to one endpoint as framed datagrams.
///
/// `send` fragments the payload and queues it without blocking; a task on a
/// private runtime writes the datagrams to a connected socket. UDP delivery
/// is not acknowledged, so a payload counts as sent once every fragment has
/// left the socket.
pub struct UdpTransport {
    endpoint: String,
    max_datagram_size: usize,
    runtime: Option<Runtime>,
    sender: Option<mpsc::Sender<Outgoing>>,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl UdpTransport {
    /// Resolve the endpoint and connect a socket to it.
    #[instrument(name = "udp_open", skip(endpoint), fields(endpoint = %endpoint))]
    pub fn open(endpoint: &Endpoint, max_datagram_size: usize) -> TransportResult<Self> {
        if max_datagram_size <= DATAGRAM_HEADER_LEN {
            return Err(TransportError::InvalidConfig(format!(
                "datagram size {max_datagram_size} leaves no room for data"
            )));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("camera-transport")
            .enable_all()
            .build()?;

        let socket = runtime.block_on(connect(endpoint))?;
        let peer = socket.peer_addr()?;
        info!(%peer, max_datagram_size, "UDP transport connected");

        let (sender, receiver) = mpsc::channel(PAYLOAD_CHANNEL_CAPACITY);
        let counters = Arc::new(Counters::default());
        let task = runtime.spawn(run_sender(socket, receiver, Arc::clone(&counters)));

        Ok(Self {
            endpoint: endpoint.to_string(),
            max_datagram_size,
            runtime: Some(runtime),
            sender: Some(sender),
            task: Some(task),
            counters,
        })
    }

    /// Endpoint this transport sends to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, payload: EncodedPayload) -> TransportResult<()> {
        let Some(sender) = &self.sender else {
            return Err(TransportError::NotConnected);
        };

        let datagrams = fragment(&payload, self.max_datagram_size)?;
        let outgoing = Outgoing {
            sequence: payload.sequence,
            datagrams,
        };

        match sender.try_send(outgoing) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.counters.payloads_dropped.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Backpressure)
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::NotConnected),
        }
    }

    #[instrument(name = "udp_close", skip(self), fields(endpoint = %self.endpoint))]
    fn close(&mut self) -> TransportResult<()> {
        // Dropping the sender lets the task drain what is queued and exit.
        if self.sender.take().is_none() {
            return Ok(());
        }

        if let Some(runtime) = self.runtime.take() {
            if let Some(task) = self.task.take() {
                let drained = runtime.block_on(async { tokio::time::timeout(CLOSE_TIMEOUT, task).await });
                if drained.is_err() {
                    warn!("Sender task did not drain before timeout");
                }
            }
            runtime.shutdown_timeout(CLOSE_TIMEOUT);
        }

        let stats = self.statistics();
        info!(
            payloads_sent = stats.payloads_sent,
            payloads_dropped = stats.payloads_dropped,
            bytes_sent = stats.bytes_sent,
            "UDP transport closed"
        );
        Ok(())
    }

    fn statistics(&self) -> TransportStatistics {
        TransportStatistics {
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            payloads_sent: self.counters.payloads_sent.load(Ordering::Relaxed),
            datagrams_sent: self.counters.datagrams_sent.load(Ordering::Relaxed),
            payloads_dropped: self.counters.payloads_dropped.load(Ordering::Relaxed),
            socket_errors: self.counters.socket_errors.load(Ordering::Relaxed),
        }
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

async fn connect(endpoint: &Endpoint) -> TransportResult<UdpSocket> {
    let resolve_error = |reason: String| TransportError::Resolve {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut addrs: Vec<SocketAddr> = tokio::net::lookup_host((endpoint.host(), endpoint.port()))
        .await
        .map_err(|e| resolve_error(e.to_string()))?
        .collect();
    // Hosts without IPv6 still list ::1 for localhost.
    addrs.sort_by_key(|addr| addr.is_ipv6());

    let mut last_error = None;
    for addr in addrs {
        match connect_to(addr).await {
            Ok(socket) => {
                debug!(%addr, "Socket connected");
                return Ok(socket);
            }
            Err(e) => {
                debug!(%addr, error = %e, "Address unusable");
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => TransportError::Io(e),
        None => resolve_error("no addresses found".to_string()),
    })
}

async fn connect_to(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let local = match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

async fn run_sender(
    socket: UdpSocket,
    mut receiver: mpsc::Receiver<Outgoing>,
    counters: Arc<Counters>,
) {
    while let Some(outgoing) = receiver.recv().await {
        let mut failed = false;
        for datagram in &outgoing.datagrams {
            match socket.send(datagram).await {
                Ok(n) => {
                    counters.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                    counters.datagrams_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Usually an ICMP unreachable from a previous datagram.
                    warn!(sequence = outgoing.sequence, error = %e, "Datagram send failed");
                    counters.socket_errors.fetch_add(1, Ordering::Relaxed);
                    failed = true;
                    break;
                }
            }
        }

        if failed {
            counters.payloads_dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.payloads_sent.fetch_add(1, Ordering::Relaxed);
            trace!(
                sequence = outgoing.sequence,
                fragments = outgoing.datagrams.len(),
                "Payload sent"
            );
        }
    }

    debug!("Payload channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reassembler;
    use camera_capture::CaptureTimestamp;
    use std::time::Instant;

    fn payload(sequence: u64, len: usize) -> EncodedPayload {
        EncodedPayload {
            data: Bytes::from(vec![(sequence % 256) as u8; len]),
            source_capture_time: CaptureTimestamp::now(Instant::now()),
            sequence,
            is_keyframe: true,
        }
    }

    #[test]
    fn test_delivers_fragmented_payload() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let endpoint = Endpoint::parse(&format!("udp://127.0.0.1:{port}")).unwrap();
        let mut transport = UdpTransport::open(&endpoint, 1200).unwrap();
        transport.send(payload(7, 3000)).unwrap();

        let mut reassembler = Reassembler::new();
        let mut buf = [0u8; 2048];
        let result = loop {
            let n = receiver.recv(&mut buf).unwrap();
            assert!(n <= 1200);
            if let Some(out) = reassembler.push(&buf[..n]).unwrap() {
                break out;
            }
        };

        assert_eq!(result.sequence, 7);
        assert_eq!(result.data.len(), 3000);

        transport.close().unwrap();
        let stats = transport.statistics();
        assert_eq!(stats.payloads_sent, 1);
        assert_eq!(stats.datagrams_sent, 3);
    }

    #[test]
    fn test_send_after_close_fails() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();

        let endpoint = Endpoint::parse(&format!("127.0.0.1:{port}")).unwrap();
        let mut transport = UdpTransport::open(&endpoint, 512).unwrap();
        transport.close().unwrap();
        transport.close().unwrap();

        assert!(matches!(
            transport.send(payload(0, 10)),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_idle_sender_leaves_runtime_responsive() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();

        let endpoint = Endpoint::parse(&format!("udp://127.0.0.1:{port}")).unwrap();
        let mut transport = UdpTransport::open(&endpoint, 1200).unwrap();

        // The sender task shares the single worker with this ticker.
        let runtime = transport.runtime.as_ref().unwrap();
        let ticks = runtime.block_on(async {
            runtime
                .spawn(async {
                    let started = Instant::now();
                    let mut ticks = 0u32;
                    while started.elapsed() < Duration::from_millis(200) {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        ticks += 1;
                    }
                    ticks
                })
                .await
                .unwrap()
        });

        assert!(ticks >= 15, "only {ticks} ticks in 200ms");
        transport.close().unwrap();
    }

    #[test]
    fn test_rejects_tiny_datagram_size() {
        let endpoint = Endpoint::parse("udp://127.0.0.1:5000").unwrap();
        assert!(matches!(
            UdpTransport::open(&endpoint, 8),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
