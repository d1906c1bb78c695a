//! Capture-to-encode pipeline.
//!
//! A [`PipelineService`] couples a frame producer (the caller, or an
//! attached [`CaptureSource`](camera_capture::CaptureSource)) to a single
//! encode worker through a bounded drop-oldest [`FrameQueue`]. Encoded
//! payloads are handed to a transport for delivery to the endpoint.

mod capture;
mod error;
mod metrics;
mod queue;
mod resources;
mod service;
mod shared;
mod threads;
mod worker;

#[cfg(test)]
mod testing;

pub use error::{ContractViolation, PipelineError};
pub use metrics::MetricsCollector;
pub use queue::{FrameQueue, Popped, PushOutcome};
pub use service::{PipelineService, ShutdownReport};
pub use shared::SubmitOutcome;
pub use worker::STATS_INTERVAL;

pub use camera_ipc::{
    ConfigError, DropReason, PipelineConfig, PipelineEvent, PipelineMetrics, PipelineState,
};

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
