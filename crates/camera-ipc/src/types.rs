//! Common types shared by the pipeline crates.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{DEFAULT_QUEUE_CAPACITY, MAX_DATAGRAM_SIZE, MIN_DATAGRAM_SIZE};

/// Raw pixel layout of captured frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Packed 8-bit blue, green, red (what the Pi camera driver delivers).
    #[default]
    Bgr24,

    /// Packed 8-bit red, green, blue.
    Rgb24,

    /// Packed 8-bit red, green, blue, alpha.
    Rgba32,
}

impl PixelFormat {
    /// Bytes used by a single pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr24 | Self::Rgb24 => 3,
            Self::Rgba32 => 4,
        }
    }

    /// Size in bytes of a full frame with the given dimensions, or `None`
    /// if it does not fit in `usize`.
    pub fn buffer_size(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }

    /// Returns the display name for this format.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bgr24 => "bgr24",
            Self::Rgb24 => "rgb24",
            Self::Rgba32 => "rgba32",
        }
    }
}

/// Codec used by the pipeline's encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// Uncompressed pixels behind a small header.
    Raw,

    /// Keyframes plus run-length coded differences against the reference.
    #[default]
    Delta,
}

/// Configuration for a pipeline instance. Immutable once the pipeline is
/// constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Network endpoint (e.g., "udp://localhost:5000").
    pub endpoint: String,

    /// Pixel layout of submitted frames.
    #[serde(default)]
    pub pixel_format: PixelFormat,

    /// Capacity of the bounded frame queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Codec driven by the encode worker.
    #[serde(default)]
    pub codec: CodecKind,

    /// Frames between forced keyframes (delta codec only).
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval: u32,

    /// How long destruction waits for an in-flight encode, in milliseconds.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Largest datagram the transport emits, header included.
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_keyframe_interval() -> u32 {
    30
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

fn default_max_datagram_size() -> usize {
    1200
}

impl PipelineConfig {
    /// Create a configuration with default tuning for the given frame shape
    /// and endpoint.
    pub fn new(width: u32, height: u32, endpoint: impl Into<String>) -> Self {
        Self {
            width,
            height,
            endpoint: endpoint.into(),
            pixel_format: PixelFormat::default(),
            queue_capacity: default_queue_capacity(),
            codec: CodecKind::default(),
            keyframe_interval: default_keyframe_interval(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_datagram_size: default_max_datagram_size(),
        }
    }

    /// Set the frame queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the pixel format.
    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    /// Set the codec.
    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Set the shutdown timeout in milliseconds.
    pub fn with_shutdown_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.shutdown_timeout_ms = timeout_ms;
        self
    }

    /// Size in bytes of one frame of this configuration.
    pub fn frame_size(&self) -> Option<usize> {
        self.pixel_format.buffer_size(self.width, self.height)
    }

    /// Check the configuration before any resource is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.frame_size().is_none() {
            return Err(ConfigError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }

        if self.keyframe_interval == 0 {
            return Err(ConfigError::Invalid(
                "keyframe_interval must be at least 1".to_string(),
            ));
        }

        if !(MIN_DATAGRAM_SIZE..=MAX_DATAGRAM_SIZE).contains(&self.max_datagram_size) {
            return Err(ConfigError::Invalid(format!(
                "max_datagram_size must be within {}..={}, got {}",
                MIN_DATAGRAM_SIZE, MAX_DATAGRAM_SIZE, self.max_datagram_size
            )));
        }

        Ok(())
    }
}

/// Point-in-time pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Frames accepted by `submit_frame`.
    pub frames_submitted: u64,

    /// Frames successfully encoded.
    pub frames_encoded: u64,

    /// Payloads accepted by the transport.
    pub payloads_sent: u64,

    /// Total dropped frames (overflow + shutdown).
    pub dropped_frames: u64,

    /// Frames evicted by the drop-oldest policy.
    pub overflow_drops: u64,

    /// Frames discarded when the pipeline was destroyed.
    pub shutdown_drops: u64,

    /// Frames the encoder rejected or failed on.
    pub encode_errors: u64,

    /// Payloads the transport refused.
    pub send_errors: u64,

    /// Encoded bytes handed to the transport.
    pub bytes_sent: u64,

    /// Frames currently waiting in the queue.
    pub queue_depth: usize,

    /// Pipeline uptime in seconds.
    pub uptime_seconds: u64,
}
