//! Synthetic test-pattern capture source.

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, trace};

use camera_ipc::PixelFormat;

use crate::frame::{CaptureTimestamp, FrameBuffer};
use crate::{CaptureResult, CaptureSource};

/// Produces a moving diagonal gradient at a fixed frame rate.
///
/// Stands in for a camera when none is attached, and drives the pipeline in
/// tests and benchmarks.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    frame_interval: Option<Duration>,
    frame_limit: Option<u64>,
    start_time: Instant,
    next_deadline: Instant,
    sequence: u64,
    is_active: bool,
}

impl TestPatternSource {
    /// Create a source producing frames at `fps`. An `fps` of zero produces
    /// frames as fast as they are pulled.
    pub fn new(width: u32, height: u32, format: PixelFormat, fps: u32) -> CaptureResult<Self> {
        FrameBuffer::buffer_size(width, height, format)?;

        let frame_interval = (fps > 0).then(|| Duration::from_nanos(1_000_000_000 / fps as u64));

        debug!(width, height, format = format.name(), fps, "Creating test pattern source");

        let start_time = Instant::now();
        Ok(Self {
            width,
            height,
            format,
            frame_interval,
            frame_limit: None,
            start_time,
            next_deadline: start_time,
            sequence: 0,
            is_active: true,
        })
    }

    /// End the stream after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    fn render(&self, sequence: u64) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let bpp = self.format.bytes_per_pixel();
        let shift = (sequence * 4) as usize;
        let mut pixels = vec![0u8; w * h * bpp];

        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * bpp;
                let base = x + y + shift;
                pixels[offset] = base as u8;
                pixels[offset + 1] = (base / 2) as u8;
                pixels[offset + 2] = (x * 255 / w.max(1)) as u8;
                if bpp == 4 {
                    pixels[offset + 3] = 0xFF;
                }
            }
        }

        pixels
    }
}

impl CaptureSource for TestPatternSource {
    fn next_frame(&mut self) -> CaptureResult<Option<FrameBuffer>> {
        if !self.is_active {
            return Ok(None);
        }

        if self.frame_limit.is_some_and(|limit| self.sequence >= limit) {
            info!(frames = self.sequence, "Test pattern reached frame limit");
            self.is_active = false;
            return Ok(None);
        }

        // Deadlines advance by a fixed step so jitter does not accumulate.
        if let Some(interval) = self.frame_interval {
            let now = Instant::now();
            if self.next_deadline > now {
                thread::sleep(self.next_deadline - now);
            }
            self.next_deadline += interval;
        }

        let sequence = self.sequence;
        self.sequence += 1;

        let pixels = Bytes::from(self.render(sequence));
        let timestamp = CaptureTimestamp::now(self.start_time);

        trace!(sequence, "Rendered test pattern frame");

        FrameBuffer::new(
            pixels,
            self.width,
            self.height,
            self.format,
            timestamp,
            sequence,
        )
        .map(Some)
    }

    fn stop(&mut self) -> CaptureResult<()> {
        if self.is_active {
            debug!(frames = self.sequence, "Stopping test pattern source");
        }
        self.is_active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> PixelFormat {
        self.format
    }
}
