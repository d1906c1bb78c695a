//! Reference-frame delta codec.
//!
//! Keyframes carry the full pixel buffer. Every other frame carries the XOR
//! of the frame against the previous one, written as a sequence of runs:
//!
//! ```text
//! zero_run u16 | literal_len u16 | literal bytes ...
//! ```
//!
//! Static regions of a camera image XOR to zero, so they collapse into
//! `zero_run` counters. If a delta would come out larger than the raw
//! frame, a keyframe is emitted instead.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use camera_capture::FrameBuffer;
use camera_ipc::PixelFormat;

use crate::error::EncodeError;
use crate::header::{FrameHeader, FrameKind, FRAME_HEADER_LEN};
use crate::{Codec, CodecOutput, EncodeResult};

const MAX_RUN: usize = u16::MAX as usize;

/// Stateful delta encoder.
pub struct DeltaCodec {
    keyframe_interval: u64,
    frame_index: u64,
    reference: Option<Bytes>,
}

impl DeltaCodec {
    /// Create a codec forcing a keyframe every `keyframe_interval` frames.
    pub fn new(keyframe_interval: u32) -> Self {
        Self {
            keyframe_interval: keyframe_interval.max(1) as u64,
            frame_index: 0,
            reference: None,
        }
    }

    fn write_keyframe(&self, frame: &FrameBuffer) -> Bytes {
        let pixels = frame.pixels();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + pixels.len());
        self.header(FrameKind::Key, frame).write(&mut buf);
        buf.put_slice(pixels);
        buf.freeze()
    }

    fn write_delta(&self, frame: &FrameBuffer, reference: &[u8]) -> Option<Bytes> {
        let pixels = frame.pixels();
        let limit = FRAME_HEADER_LEN + pixels.len();
        let mut buf = BytesMut::with_capacity(limit / 4);
        self.header(FrameKind::Delta, frame).write(&mut buf);

        let xor = |i: usize| pixels[i] ^ reference[i];
        let len = pixels.len();
        let mut i = 0;

        while i < len {
            let zero_start = i;
            while i < len && i - zero_start < MAX_RUN && xor(i) == 0 {
                i += 1;
            }
            let zero_run = i - zero_start;

            let literal_start = i;
            while i < len && i - literal_start < MAX_RUN && xor(i) != 0 {
                i += 1;
            }

            buf.put_u16(zero_run as u16);
            buf.put_u16((i - literal_start) as u16);
            for j in literal_start..i {
                buf.put_u8(xor(j));
            }

            if buf.len() >= limit {
                return None;
            }
        }

        Some(buf.freeze())
    }

    fn header(&self, kind: FrameKind, frame: &FrameBuffer) -> FrameHeader {
        FrameHeader {
            kind,
            width: frame.width(),
            height: frame.height(),
            frame_index: self.frame_index,
        }
    }
}

impl Codec for DeltaCodec {
    fn encode(&mut self, frame: &FrameBuffer) -> EncodeResult<CodecOutput> {
        let scheduled_key = self.frame_index % self.keyframe_interval == 0;

        let delta = match self.reference.as_ref() {
            Some(reference) if !scheduled_key => {
                if reference.len() != frame.pixels().len() {
                    return Err(EncodeError::Codec(format!(
                        "reference frame is {} bytes, input is {}",
                        reference.len(),
                        frame.pixels().len()
                    )));
                }
                self.write_delta(frame, reference)
            }
            _ => None,
        };

        let (data, is_keyframe) = match delta {
            Some(data) => (data, false),
            None => (self.write_keyframe(frame), true),
        };

        trace!(
            frame = self.frame_index,
            is_keyframe,
            size = data.len(),
            "Delta codec output"
        );

        self.reference = Some(frame.pixels().clone());
        self.frame_index += 1;

        Ok(CodecOutput { data, is_keyframe })
    }

    fn flush(&mut self) -> EncodeResult<()> {
        debug!(frames = self.frame_index, "Flushing delta codec reference");
        self.reference = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "delta-rle"
    }
}

/// Reconstructs frames produced by [`DeltaCodec`] (and [`crate::RawCodec`]).
pub struct DeltaDecoder {
    format: PixelFormat,
    reference: Option<Vec<u8>>,
}

impl DeltaDecoder {
    /// Create a decoder for frames of the given pixel format.
    pub fn new(format: PixelFormat) -> Self {
        Self {
            format,
            reference: None,
        }
    }

    /// Decode one encoded frame into raw pixels.
    pub fn decode(&mut self, data: &[u8]) -> EncodeResult<Bytes> {
        let header = FrameHeader::parse(data)?;
        let size = self
            .format
            .buffer_size(header.width, header.height)
            .ok_or_else(|| EncodeError::InvalidInput("frame size overflows".to_string()))?;
        let body = &data[FRAME_HEADER_LEN..];

        let pixels = match header.kind {
            FrameKind::Raw | FrameKind::Key => {
                if body.len() != size {
                    return Err(EncodeError::InvalidInput(format!(
                        "keyframe body is {} bytes, expected {}",
                        body.len(),
                        size
                    )));
                }
                body.to_vec()
            }
            FrameKind::Delta => {
                let reference = self.reference.as_ref().ok_or_else(|| {
                    EncodeError::Codec("delta frame without a reference".to_string())
                })?;
                if reference.len() != size {
                    return Err(EncodeError::Codec(
                        "delta frame shape differs from reference".to_string(),
                    ));
                }
                apply_runs(reference.clone(), body)?
            }
        };

        self.reference = Some(pixels.clone());
        Ok(Bytes::from(pixels))
    }
}

fn apply_runs(mut pixels: Vec<u8>, mut body: &[u8]) -> EncodeResult<Vec<u8>> {
    let truncated = || EncodeError::InvalidInput("truncated delta run".to_string());
    let mut pos = 0usize;

    while body.has_remaining() {
        if body.remaining() < 4 {
            return Err(truncated());
        }
        let zero_run = body.get_u16() as usize;
        let literal_len = body.get_u16() as usize;

        pos += zero_run;
        if body.remaining() < literal_len || pos + literal_len > pixels.len() {
            return Err(truncated());
        }

        for (dst, src) in pixels[pos..pos + literal_len].iter_mut().zip(&body[..literal_len]) {
            *dst ^= *src;
        }
        body.advance(literal_len);
        pos += literal_len;
    }

    if pos > pixels.len() {
        return Err(truncated());
    }

    Ok(pixels)
}
