//! Shared configuration, state and event types for the camera pipeline.
//!
//! This crate defines the types that cross crate boundaries: the pipeline
//! configuration, lifecycle states, observability events and metric
//! snapshots.

mod error;
mod events;
mod state;
mod types;

pub use error::ConfigError;
pub use events::{DropReason, PipelineEvent};
pub use state::{PipelineState, ShutdownPhase, StartupPhase};
pub use types::{CodecKind, PipelineConfig, PipelineMetrics, PixelFormat};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for events (pipeline → observer).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default capacity of the bounded frame queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Smallest datagram size the transport can frame a payload into.
pub const MIN_DATAGRAM_SIZE: usize = 64;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<PipelineEvent>, Receiver<PipelineEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
