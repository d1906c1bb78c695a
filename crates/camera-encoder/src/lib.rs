//! Frame encoder adapter and codecs.
//!
//! The [`Encoder`] adapter validates frames against its configured shape and
//! drives a [`Codec`], which is treated as a black box. Two codecs are
//! provided: [`RawCodec`] and the stateful [`DeltaCodec`].

mod delta;
mod encoder;
mod error;
mod header;
mod raw;
mod runtime;

pub use delta::{DeltaCodec, DeltaDecoder};
pub use encoder::Encoder;
pub use error::EncodeError;
pub use header::{FrameHeader, FrameKind, FRAME_HEADER_LEN};
pub use raw::RawCodec;
pub use runtime::{CodecRuntime, CodecRuntimeGuard};

use bytes::Bytes;

use camera_capture::{CaptureTimestamp, FrameBuffer};
use camera_ipc::{CodecKind, PixelFormat};

/// Result type for encoder operations.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Encoder configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Pixel layout of input frames.
    pub format: PixelFormat,

    /// Codec to create.
    pub codec: CodecKind,

    /// Frames between forced keyframes.
    pub keyframe_interval: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Bgr24,
            codec: CodecKind::Delta,
            keyframe_interval: 30,
        }
    }
}

/// Output of a single codec invocation.
#[derive(Debug, Clone)]
pub struct CodecOutput {
    /// Encoded bytes.
    pub data: Bytes,

    /// Whether the output decodes without any earlier output.
    pub is_keyframe: bool,
}

/// An encoded frame, ready to be handed to a transport.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    /// Encoded data.
    pub data: Bytes,

    /// Capture timestamp of the source frame.
    pub source_capture_time: CaptureTimestamp,

    /// Sequence number of the source frame.
    pub sequence: u64,

    /// Whether this is a keyframe.
    pub is_keyframe: bool,
}

/// Trait for codecs.
///
/// Implementations may keep state across calls (reference frames), so frames
/// must be fed in order and `encode` is never called concurrently.
pub trait Codec: Send {
    /// Encode one frame. The adapter has already checked its shape.
    fn encode(&mut self, frame: &FrameBuffer) -> EncodeResult<CodecOutput>;

    /// Drop any reference state so the next frame is self-contained.
    fn flush(&mut self) -> EncodeResult<()> {
        Ok(())
    }

    /// Get codec name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Create a codec for the given configuration.
pub fn create_codec(config: &EncoderConfig) -> EncodeResult<Box<dyn Codec>> {
    if config.keyframe_interval == 0 {
        return Err(EncodeError::Initialization(
            "keyframe interval must be at least 1".to_string(),
        ));
    }

    let codec: Box<dyn Codec> = match config.codec {
        CodecKind::Raw => Box::new(RawCodec::new()),
        CodecKind::Delta => Box::new(DeltaCodec::new(config.keyframe_interval)),
    };

    tracing::info!(codec = codec.name(), "Using {} codec", codec.name());
    Ok(codec)
}
