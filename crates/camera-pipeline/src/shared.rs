//! State shared by the service handle, the capture pump and the encode worker.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::{debug, trace};

use camera_capture::FrameBuffer;
use camera_ipc::{DropReason, PipelineEvent, PipelineMetrics, PipelineState, PixelFormat};

use crate::error::ContractViolation;
use crate::metrics::MetricsCollector;
use crate::queue::{FrameQueue, PushOutcome};

/// What happened to a submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Sequence number the pipeline assigned to the frame.
    pub sequence: u64,

    /// Sequence of the frame evicted to make room, if the queue was full.
    pub evicted: Option<u64>,
}

impl SubmitOutcome {
    /// Returns true if accepting this frame dropped an older one.
    pub fn dropped_oldest(&self) -> bool {
        self.evicted.is_some()
    }
}

pub(crate) struct Shared {
    width: u32,
    height: u32,
    format: PixelFormat,
    pub(crate) queue: FrameQueue,
    pub(crate) metrics: MetricsCollector,
    state: RwLock<PipelineState>,
    event_tx: Sender<PipelineEvent>,
    event_rx: Receiver<PipelineEvent>,
    next_sequence: AtomicU64,
}

impl Shared {
    pub(crate) fn new(width: u32, height: u32, format: PixelFormat, queue_capacity: usize) -> Self {
        let (event_tx, event_rx) = camera_ipc::event_channel();
        Self {
            width,
            height,
            format,
            queue: FrameQueue::new(queue_capacity),
            metrics: MetricsCollector::new(),
            state: RwLock::new(PipelineState::Stopped),
            event_tx,
            event_rx,
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Check a frame and enqueue it under a fresh sequence number.
    pub(crate) fn submit(&self, frame: FrameBuffer) -> Result<SubmitOutcome, ContractViolation> {
        if !self.state.read().accepts_frames() {
            return Err(ContractViolation::UseAfterDestroy);
        }

        self.check_shape(frame.dimensions(), frame.format())?;

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let evicted = match self.queue.push(frame.with_sequence(sequence)) {
            PushOutcome::Enqueued => None,
            PushOutcome::Evicted(old) => {
                let old_sequence = old.sequence();
                self.metrics.record_overflow_drop();
                debug!(sequence = old_sequence, "Queue full, dropped oldest frame");
                self.send_event(PipelineEvent::FrameDropped {
                    sequence: old_sequence,
                    reason: DropReason::QueueOverflow,
                });
                Some(old_sequence)
            }
            PushOutcome::Closed(_) => return Err(ContractViolation::UseAfterDestroy),
        };

        self.metrics.record_submitted();
        trace!(sequence, "Frame queued");

        Ok(SubmitOutcome { sequence, evicted })
    }

    pub(crate) fn check_shape(
        &self,
        (width, height): (u32, u32),
        format: PixelFormat,
    ) -> Result<(), ContractViolation> {
        if (width, height) != (self.width, self.height) || format != self.format {
            return Err(ContractViolation::FrameShape {
                expected_width: self.width,
                expected_height: self.height,
                expected_format: self.format,
                width,
                height,
                format,
            });
        }
        Ok(())
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state.read().clone()
    }

    pub(crate) fn transition_to(&self, new_state: PipelineState) {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, new_state.clone())
        };

        debug!(
            previous = previous.name(),
            current = new_state.name(),
            "State transition"
        );

        self.send_event(PipelineEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    /// Publish an event. When no one keeps up with the channel the oldest
    /// event is discarded so the sender never blocks.
    pub(crate) fn send_event(&self, event: PipelineEvent) {
        if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
            let _ = self.event_rx.try_recv();
            if self.event_tx.try_send(event).is_err() {
                trace!("Event dropped");
            }
        }
    }

    pub(crate) fn events(&self) -> Receiver<PipelineEvent> {
        self.event_rx.clone()
    }

    pub(crate) fn metrics_snapshot(&self) -> PipelineMetrics {
        self.metrics.snapshot(self.queue.len())
    }
}
