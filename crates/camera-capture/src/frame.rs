//! Captured frame types.

use bytes::Bytes;
use std::time::Instant;

use camera_ipc::PixelFormat;

use crate::error::CaptureError;
use crate::CaptureResult;

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Frame presentation timestamp in 100ns units, relative to the start
    /// of the capture.
    pub pts_100ns: u64,
}

impl CaptureTimestamp {
    /// Create a new capture timestamp.
    pub fn now(start_time: Instant) -> Self {
        let capture_time = Instant::now();
        let elapsed = capture_time.saturating_duration_since(start_time);
        let pts_100ns = elapsed.as_nanos() as u64 / 100;

        Self {
            capture_time,
            pts_100ns,
        }
    }

    /// Get the presentation timestamp in milliseconds.
    pub fn pts_ms(&self) -> u64 {
        self.pts_100ns / 10_000
    }
}

/// A captured video frame.
///
/// The pixel buffer always holds exactly `width * height * bytes_per_pixel`
/// bytes; the constructors reject anything else. Cloning is cheap since the
/// pixels are reference counted.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pixels: Bytes,
    width: u32,
    height: u32,
    format: PixelFormat,
    timestamp: CaptureTimestamp,
    sequence: u64,
}

impl FrameBuffer {
    /// Create a frame that takes ownership of `pixels`.
    pub fn new(
        pixels: Bytes,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: CaptureTimestamp,
        sequence: u64,
    ) -> CaptureResult<Self> {
        let expected = Self::buffer_size(width, height, format)?;
        if pixels.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            pixels,
            width,
            height,
            format,
            timestamp,
            sequence,
        })
    }

    /// Create a frame by copying borrowed pixel data. The caller's buffer
    /// may be reused as soon as this returns.
    pub fn copy_from_slice(
        data: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp: CaptureTimestamp,
    ) -> CaptureResult<Self> {
        Self::new(
            Bytes::copy_from_slice(data),
            width,
            height,
            format,
            timestamp,
            0,
        )
    }

    /// Expected pixel buffer size for the given shape.
    pub fn buffer_size(width: u32, height: u32, format: PixelFormat) -> CaptureResult<usize> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidDimensions { width, height });
        }
        format
            .buffer_size(width, height)
            .ok_or(CaptureError::InvalidDimensions { width, height })
    }

    /// Replace the sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Raw pixel data.
    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frame dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel layout.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Capture timestamp.
    pub fn timestamp(&self) -> CaptureTimestamp {
        self.timestamp
    }

    /// Sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_wrong_length() {
        let ts = CaptureTimestamp::now(Instant::now());
        let err = FrameBuffer::new(Bytes::from(vec![0u8; 10]), 2, 2, PixelFormat::Bgr24, ts, 0)
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::BufferSize {
                expected: 12,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_new_rejects_zero_dimensions() {
        let ts = CaptureTimestamp::now(Instant::now());
        let err = FrameBuffer::new(Bytes::new(), 0, 4, PixelFormat::Rgb24, ts, 0).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_copy_from_slice_detaches_from_caller() {
        let ts = CaptureTimestamp::now(Instant::now());
        let mut data = vec![7u8; 2 * 2 * 4];
        let frame = FrameBuffer::copy_from_slice(&data, 2, 2, PixelFormat::Rgba32, ts).unwrap();
        data.fill(0);
        assert!(frame.pixels().iter().all(|&b| b == 7));
        assert_eq!(frame.dimensions(), (2, 2));
    }

    #[test]
    fn test_pts_ms() {
        let ts = CaptureTimestamp {
            capture_time: Instant::now(),
            pts_100ns: 333_000,
        };
        assert_eq!(ts.pts_ms(), 33);
    }
}
