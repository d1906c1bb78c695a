//! Pipeline lifecycle types.

use serde::{Deserialize, Serialize};

/// The current state of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Resources are being created.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// Frames are being accepted and encoded.
    Running,

    /// Frames are accepted but the worker is not dequeuing.
    Paused,

    /// Destruction is in progress.
    Stopping {
        /// Current shutdown phase.
        phase: ShutdownPhase,
    },

    /// All resources have been released.
    #[default]
    Stopped,
}

impl PipelineState {
    /// Returns true if frames are accepted.
    pub fn accepts_frames(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Returns true if the pipeline is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns true if the pipeline has stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting { .. } => "Starting",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopping { .. } => "Stopping",
            Self::Stopped => "Stopped",
        }
    }
}

/// Startup phases for a pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Creating the encoder.
    InitEncoder,

    /// Opening the transport to the endpoint.
    OpenTransport,

    /// Spawning the encode worker.
    StartWorker,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::InitEncoder => Some(Self::OpenTransport),
            Self::OpenTransport => Some(Self::StartWorker),
            Self::StartWorker => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::InitEncoder => None,
            Self::OpenTransport => Some(Self::InitEncoder),
            Self::StartWorker => Some(Self::OpenTransport),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::InitEncoder => "Initializing encoder",
            Self::OpenTransport => "Opening transport",
            Self::StartWorker => "Starting encode worker",
        }
    }
}

/// Shutdown phases for a pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPhase {
    /// Stopping the capture pump.
    StopCapture,

    /// Closing the queue and discarding waiting frames.
    DiscardQueue,

    /// Waiting for the in-flight encode and releasing encoder and transport.
    StopWorker,
}

impl ShutdownPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::StopCapture => Some(Self::DiscardQueue),
            Self::DiscardQueue => Some(Self::StopWorker),
            Self::StopWorker => None,
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::StopCapture => "Stopping capture",
            Self::DiscardQueue => "Discarding queued frames",
            Self::StopWorker => "Stopping encode worker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_phase_order() {
        let mut phases = vec![StartupPhase::InitEncoder];
        while let Some(next) = phases.last().and_then(|p| p.next()) {
            phases.push(next);
        }
        assert_eq!(
            phases,
            vec![
                StartupPhase::InitEncoder,
                StartupPhase::OpenTransport,
                StartupPhase::StartWorker
            ]
        );
        assert_eq!(StartupPhase::StartWorker.previous(), Some(StartupPhase::OpenTransport));
        assert_eq!(StartupPhase::InitEncoder.previous(), None);
    }

    #[test]
    fn test_accepts_frames() {
        assert!(PipelineState::Running.accepts_frames());
        assert!(PipelineState::Paused.accepts_frames());
        assert!(!PipelineState::Stopped.accepts_frames());
        assert!(!PipelineState::Stopping {
            phase: ShutdownPhase::StopCapture
        }
        .accepts_frames());
    }
}
