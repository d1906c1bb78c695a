//! Error types for the capture module.

use thiserror::Error;

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Pixel buffer length does not match the frame shape.
    #[error("Pixel buffer is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// Frame dimensions are zero or overflow.
    #[error("Invalid frame dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Capture source was stopped.
    #[error("Capture source stopped")]
    Stopped,

    /// The camera device failed.
    #[error("Capture device error: {0}")]
    Device(String),
}
