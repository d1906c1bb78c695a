//! Frame buffers and camera capture sources.
//!
//! A capture source is a lazy sequence of [`FrameBuffer`]s. It is started by
//! construction and can only be restarted by constructing a new one.

mod error;
mod frame;
mod pattern;

pub use camera_ipc::PixelFormat;
pub use error::CaptureError;
pub use frame::{CaptureTimestamp, FrameBuffer};
pub use pattern::TestPatternSource;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for capture sources.
pub trait CaptureSource: Send {
    /// Produce the next frame. `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> CaptureResult<Option<FrameBuffer>>;

    /// Stop capturing. Further calls to `next_frame` return `Ok(None)`.
    fn stop(&mut self) -> CaptureResult<()>;

    /// Check if capture is active.
    fn is_active(&self) -> bool;

    /// Get the source dimensions.
    fn dimensions(&self) -> (u32, u32);

    /// Get the pixel format of produced frames.
    fn format(&self) -> PixelFormat;
}
