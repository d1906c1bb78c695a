//! Encoder adapter over a codec.

use tracing::{debug, instrument, trace};

use camera_capture::FrameBuffer;
use camera_ipc::PixelFormat;

use crate::error::EncodeError;
use crate::runtime::{CodecRuntime, CodecRuntimeGuard};
use crate::{create_codec, Codec, EncodeResult, EncodedPayload, EncoderConfig};

/// Owns a codec sized to fixed frame dimensions.
///
/// Frames whose shape differs from the configured one are rejected before
/// the codec sees them. `encode` takes `&mut self`, so a single encoder is
/// never driven from two threads at once.
pub struct Encoder {
    codec: Box<dyn Codec>,
    width: u32,
    height: u32,
    format: PixelFormat,
    frames_encoded: u64,
    _runtime: CodecRuntimeGuard,
}

impl Encoder {
    /// Create an encoder with the codec named in `config`.
    #[instrument(name = "encoder_new", skip_all)]
    pub fn new(config: &EncoderConfig) -> EncodeResult<Self> {
        let codec = create_codec(config)?;
        Self::with_codec(config.width, config.height, config.format, codec)
    }

    /// Create an encoder around an existing codec.
    pub fn with_codec(
        width: u32,
        height: u32,
        format: PixelFormat,
        codec: Box<dyn Codec>,
    ) -> EncodeResult<Self> {
        if width == 0 || height == 0 || format.buffer_size(width, height).is_none() {
            return Err(EncodeError::Initialization(format!(
                "invalid encoder dimensions {}x{}",
                width, height
            )));
        }

        let runtime = CodecRuntime::acquire();

        debug!(
            width,
            height,
            format = format.name(),
            codec = codec.name(),
            "Encoder initialized"
        );

        Ok(Self {
            codec,
            width,
            height,
            format,
            frames_encoded: 0,
            _runtime: runtime,
        })
    }

    /// Encode one frame.
    #[instrument(name = "encoder_encode", skip(self, frame), fields(sequence = frame.sequence()))]
    pub fn encode(&mut self, frame: &FrameBuffer) -> EncodeResult<EncodedPayload> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(EncodeError::DimensionMismatch {
                expected: (self.width, self.height),
                actual: frame.dimensions(),
            });
        }

        if frame.format() != self.format {
            return Err(EncodeError::FormatMismatch {
                expected: self.format,
                actual: frame.format(),
            });
        }

        let output = self.codec.encode(frame)?;
        self.frames_encoded += 1;

        trace!(
            size = output.data.len(),
            is_keyframe = output.is_keyframe,
            "Frame encoded"
        );

        Ok(EncodedPayload {
            data: output.data,
            source_capture_time: frame.timestamp(),
            sequence: frame.sequence(),
            is_keyframe: output.is_keyframe,
        })
    }

    /// Drop codec reference state; the next frame becomes a keyframe.
    pub fn flush(&mut self) -> EncodeResult<()> {
        self.codec.flush()
    }

    /// Number of frames encoded successfully.
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Configured dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Configured pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Codec name for diagnostics.
    pub fn name(&self) -> &'static str {
        self.codec.name()
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        debug!(
            codec = self.codec.name(),
            frames = self.frames_encoded,
            "Closing encoder"
        );
    }
}
