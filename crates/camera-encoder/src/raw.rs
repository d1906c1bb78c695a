//! Uncompressed codec.

use bytes::{BufMut, BytesMut};
use tracing::trace;

use camera_capture::FrameBuffer;

use crate::header::{FrameHeader, FrameKind, FRAME_HEADER_LEN};
use crate::{Codec, CodecOutput, EncodeResult};

/// Emits every frame as a header followed by its raw pixels.
#[derive(Debug, Default)]
pub struct RawCodec {
    frame_count: u64,
}

impl RawCodec {
    /// Create a new raw codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Codec for RawCodec {
    fn encode(&mut self, frame: &FrameBuffer) -> EncodeResult<CodecOutput> {
        let pixels = frame.pixels();
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + pixels.len());

        FrameHeader {
            kind: FrameKind::Raw,
            width: frame.width(),
            height: frame.height(),
            frame_index: self.frame_count,
        }
        .write(&mut buf);
        buf.put_slice(pixels);

        trace!(frame = self.frame_count, size = buf.len(), "Raw frame");
        self.frame_count += 1;

        Ok(CodecOutput {
            data: buf.freeze(),
            is_keyframe: true,
        })
    }

    fn name(&self) -> &'static str {
        "raw"
    }
}
