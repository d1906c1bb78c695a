//! Events emitted by a running pipeline.

use serde::{Deserialize, Serialize};

use crate::state::PipelineState;
use crate::types::PipelineMetrics;

/// Why a frame was dropped before it was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Evicted by the drop-oldest policy when the queue was full.
    QueueOverflow,

    /// Discarded because the pipeline was destroyed.
    Shutdown,
}

/// Observability events. Steady-state failures surface only here and in the
/// metrics counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<PipelineState>,

        /// Current state.
        current: Box<PipelineState>,
    },

    /// A queued frame was dropped without being encoded.
    FrameDropped { sequence: u64, reason: DropReason },

    /// The encoder failed on a frame; the frame was dropped.
    EncodeFailed { sequence: u64, message: String },

    /// The transport refused a payload; the payload was dropped.
    SendFailed { sequence: u64, message: String },

    /// The attached capture source ended.
    CaptureEnded {
        /// Error that ended the capture, if it did not end cleanly.
        error: Option<String>,
    },

    /// Periodic metrics snapshot.
    Metrics(PipelineMetrics),
}
