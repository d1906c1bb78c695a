//! Error types for the encoder module.

use thiserror::Error;

use camera_ipc::PixelFormat;

/// Errors that can occur during encoding operations.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Frame shape differs from the encoder's configured dimensions. The
    /// codec is not invoked.
    #[error("Frame is {}x{}, encoder expects {}x{}", actual.0, actual.1, expected.0, expected.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Frame pixel format differs from the encoder's.
    #[error("Frame format is {}, encoder expects {}", actual.name(), expected.name())]
    FormatMismatch {
        expected: PixelFormat,
        actual: PixelFormat,
    },

    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    /// Codec initialization failed.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Codec-internal failure.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl EncodeError {
    /// Status code reported across the C boundary. Zero is success and is
    /// never returned here; `-1` is reserved for handle errors.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::DimensionMismatch { .. } => -2,
            Self::FormatMismatch { .. } | Self::InvalidInput(_) => -3,
            Self::Initialization(_) | Self::Codec(_) => -4,
        }
    }
}
