//! Datagram framing for encoded payloads.
//!
//! Encoded frames are usually far larger than a datagram, so each payload
//! is split into fragments that carry a fixed 16-byte header:
//!
//! ```text
//! magic u16 | version u8 | flags u8 | sequence u32 | index u16 | count u16 | total_len u32
//! ```
//!
//! All fields are big endian. Bit 0 of `flags` marks a keyframe. The
//! receiver collects fragments by `sequence` with a [`Reassembler`].

use std::collections::{HashMap, VecDeque};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use camera_encoder::EncodedPayload;

use crate::error::TransportError;
use crate::{TransportResult, REASSEMBLY_WINDOW};

/// Length of the datagram header in bytes.
pub const DATAGRAM_HEADER_LEN: usize = 16;

/// Magic number opening every datagram ("HC").
pub const DATAGRAM_MAGIC: u16 = 0x4843;

/// Framing version.
pub const DATAGRAM_VERSION: u8 = 1;

const FLAG_KEYFRAME: u8 = 0x01;

/// Header of a single fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub is_keyframe: bool,
    pub sequence: u32,
    pub index: u16,
    pub count: u16,
    pub total_len: u32,
}

impl DatagramHeader {
    /// Append the header to `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u16(DATAGRAM_MAGIC);
        buf.put_u8(DATAGRAM_VERSION);
        buf.put_u8(if self.is_keyframe { FLAG_KEYFRAME } else { 0 });
        buf.put_u32(self.sequence);
        buf.put_u16(self.index);
        buf.put_u16(self.count);
        buf.put_u32(self.total_len);
    }

    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> TransportResult<Self> {
        if data.len() < DATAGRAM_HEADER_LEN {
            return Err(TransportError::MalformedDatagram(format!(
                "{} bytes is shorter than the header",
                data.len()
            )));
        }

        let mut buf = &data[..DATAGRAM_HEADER_LEN];
        let magic = buf.get_u16();
        if magic != DATAGRAM_MAGIC {
            return Err(TransportError::MalformedDatagram(format!(
                "bad magic {magic:#06x}"
            )));
        }
        let version = buf.get_u8();
        if version != DATAGRAM_VERSION {
            return Err(TransportError::MalformedDatagram(format!(
                "unsupported version {version}"
            )));
        }

        let flags = buf.get_u8();
        let header = Self {
            is_keyframe: flags & FLAG_KEYFRAME != 0,
            sequence: buf.get_u32(),
            index: buf.get_u16(),
            count: buf.get_u16(),
            total_len: buf.get_u32(),
        };

        if header.count == 0 || header.index >= header.count {
            return Err(TransportError::MalformedDatagram(format!(
                "fragment {} of {}",
                header.index, header.count
            )));
        }

        Ok(header)
    }
}

/// Largest payload that fits in `u16::MAX` fragments of `max_datagram_size`
/// bytes. Zero when the datagram cannot hold the header plus any data.
pub fn max_payload_len(max_datagram_size: usize) -> usize {
    if max_datagram_size <= DATAGRAM_HEADER_LEN {
        return 0;
    }
    let chunk_size = max_datagram_size - DATAGRAM_HEADER_LEN;
    chunk_size
        .saturating_mul(u16::MAX as usize)
        .min(u32::MAX as usize)
}

/// Split a payload into framed datagrams of at most `max_datagram_size`
/// bytes each.
pub fn fragment(payload: &EncodedPayload, max_datagram_size: usize) -> TransportResult<Vec<Bytes>> {
    if max_datagram_size <= DATAGRAM_HEADER_LEN {
        return Err(TransportError::InvalidConfig(format!(
            "datagram size {max_datagram_size} leaves no room for data"
        )));
    }

    let chunk_size = max_datagram_size - DATAGRAM_HEADER_LEN;
    let data = &payload.data;
    let max_len = max_payload_len(max_datagram_size);
    if data.len() > max_len {
        return Err(TransportError::PayloadTooLarge {
            len: data.len(),
            max: max_len,
        });
    }

    let count = data.len().div_ceil(chunk_size).max(1);
    let mut datagrams = Vec::with_capacity(count);

    for index in 0..count {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(data.len());

        let mut buf = BytesMut::with_capacity(DATAGRAM_HEADER_LEN + (end - start));
        DatagramHeader {
            is_keyframe: payload.is_keyframe,
            sequence: payload.sequence as u32,
            index: index as u16,
            count: count as u16,
            total_len: data.len() as u32,
        }
        .write(&mut buf);
        buf.put_slice(&data[start..end]);
        datagrams.push(buf.freeze());
    }

    trace!(
        sequence = payload.sequence,
        fragments = count,
        "Fragmented payload"
    );

    Ok(datagrams)
}

/// A payload rebuilt from its fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledPayload {
    pub sequence: u32,
    pub is_keyframe: bool,
    pub data: Bytes,
}

struct Partial {
    header: DatagramHeader,
    chunks: Vec<Option<Bytes>>,
    received: usize,
}

/// Rebuilds payloads from datagrams arriving in any order.
///
/// Only the most recent [`REASSEMBLY_WINDOW`] incomplete payloads are kept;
/// a payload that loses a fragment is eventually evicted and never yielded.
pub struct Reassembler {
    partial: HashMap<u32, Partial>,
    order: VecDeque<u32>,
    window: usize,
    evicted: u64,
}

impl Reassembler {
    /// Create a reassembler with the default window.
    pub fn new() -> Self {
        Self::with_window(REASSEMBLY_WINDOW)
    }

    /// Create a reassembler tracking at most `window` partial payloads.
    pub fn with_window(window: usize) -> Self {
        Self {
            partial: HashMap::new(),
            order: VecDeque::new(),
            window: window.max(1),
            evicted: 0,
        }
    }

    /// Feed one datagram. Returns the payload once its last fragment arrives.
    pub fn push(&mut self, datagram: &[u8]) -> TransportResult<Option<ReassembledPayload>> {
        let header = DatagramHeader::parse(datagram)?;
        let chunk = Bytes::copy_from_slice(&datagram[DATAGRAM_HEADER_LEN..]);

        if !self.partial.contains_key(&header.sequence) {
            self.order.push_back(header.sequence);
            self.partial.insert(
                header.sequence,
                Partial {
                    header,
                    chunks: vec![None; header.count as usize],
                    received: 0,
                },
            );
            self.evict_stale();
        }

        let Some(partial) = self.partial.get_mut(&header.sequence) else {
            return Ok(None);
        };

        if partial.header.count != header.count || partial.header.total_len != header.total_len {
            return Err(TransportError::MalformedDatagram(format!(
                "fragment {} disagrees with payload {}",
                header.index, header.sequence
            )));
        }

        let slot = &mut partial.chunks[header.index as usize];
        if slot.is_none() {
            *slot = Some(chunk);
            partial.received += 1;
        }

        if partial.received < partial.chunks.len() {
            return Ok(None);
        }

        self.order.retain(|seq| *seq != header.sequence);
        let Some(partial) = self.partial.remove(&header.sequence) else {
            return Ok(None);
        };

        let mut data = BytesMut::with_capacity(partial.header.total_len as usize);
        for chunk in partial.chunks.into_iter().flatten() {
            data.put_slice(&chunk);
        }

        if data.len() != partial.header.total_len as usize {
            return Err(TransportError::MalformedDatagram(format!(
                "payload {} is {} bytes, header says {}",
                header.sequence,
                data.len(),
                partial.header.total_len
            )));
        }

        Ok(Some(ReassembledPayload {
            sequence: header.sequence,
            is_keyframe: partial.header.is_keyframe,
            data: data.freeze(),
        }))
    }

    /// Number of incomplete payloads dropped to make room.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    fn evict_stale(&mut self) {
        while self.order.len() > self.window {
            if let Some(sequence) = self.order.pop_front() {
                self.partial.remove(&sequence);
                self.evicted += 1;
                debug!(sequence, "Evicted incomplete payload");
            }
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::CaptureTimestamp;
    use std::time::Instant;

    fn payload(sequence: u64, len: usize) -> EncodedPayload {
        EncodedPayload {
            data: Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>()),
            source_capture_time: CaptureTimestamp::now(Instant::now()),
            sequence,
            is_keyframe: sequence % 2 == 0,
        }
    }

    #[test]
    fn test_header_layout() {
        let mut buf = BytesMut::new();
        DatagramHeader {
            is_keyframe: true,
            sequence: 0x01020304,
            index: 2,
            count: 5,
            total_len: 1000,
        }
        .write(&mut buf);

        assert_eq!(buf.len(), DATAGRAM_HEADER_LEN);
        assert_eq!(&buf[..4], &[0x48, 0x43, 0x01, 0x01]);
        assert_eq!(&buf[4..8], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_fragment_sizes() {
        let datagrams = fragment(&payload(0, 250), 116).unwrap();
        assert_eq!(datagrams.len(), 3);
        assert!(datagrams.iter().all(|d| d.len() <= 116));
        assert_eq!(datagrams[2].len(), DATAGRAM_HEADER_LEN + 50);
    }

    #[test]
    fn test_empty_payload_is_one_fragment() {
        let datagrams = fragment(&payload(1, 0), 64).unwrap();
        assert_eq!(datagrams.len(), 1);

        let mut reassembler = Reassembler::new();
        let out = reassembler.push(&datagrams[0]).unwrap().unwrap();
        assert!(out.data.is_empty());
    }

    #[test]
    fn test_fragment_rejects_tiny_datagrams() {
        assert!(matches!(
            fragment(&payload(0, 10), DATAGRAM_HEADER_LEN),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_max_payload_len() {
        assert_eq!(max_payload_len(DATAGRAM_HEADER_LEN), 0);
        assert_eq!(max_payload_len(64), 48 * u16::MAX as usize);
        assert_eq!(max_payload_len(usize::MAX), u32::MAX as usize);

        let limit = max_payload_len(17);
        assert!(fragment(&payload(0, limit), 17).is_ok());
        assert!(matches!(
            fragment(&payload(0, limit + 1), 17),
            Err(TransportError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_reassembles_out_of_order() {
        let original = payload(4, 1000);
        let mut datagrams = fragment(&original, 100).unwrap();
        datagrams.reverse();

        let mut reassembler = Reassembler::new();
        let mut result = None;
        for datagram in &datagrams {
            if let Some(out) = reassembler.push(datagram).unwrap() {
                result = Some(out);
            }
        }

        let result = result.unwrap();
        assert_eq!(result.sequence, 4);
        assert!(result.is_keyframe);
        assert_eq!(result.data, original.data);
    }

    #[test]
    fn test_missing_fragment_never_completes() {
        let datagrams = fragment(&payload(3, 500), 100).unwrap();
        let mut reassembler = Reassembler::with_window(2);

        for datagram in datagrams.iter().skip(1) {
            assert!(reassembler.push(datagram).unwrap().is_none());
        }

        // Two newer partial payloads push the first one out of the window.
        for seq in [10, 11] {
            let newer = fragment(&payload(seq, 500), 100).unwrap();
            assert!(reassembler.push(&newer[1]).unwrap().is_none());
        }
        assert_eq!(reassembler.evicted(), 1);
        assert!(reassembler.push(&datagrams[0]).unwrap().is_none());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut datagram = fragment(&payload(0, 10), 64).unwrap()[0].to_vec();
        datagram[0] = 0;
        assert!(matches!(
            Reassembler::new().push(&datagram),
            Err(TransportError::MalformedDatagram(_))
        ));
    }
}
