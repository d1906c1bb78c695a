//! Error types for the pipeline service.

use thiserror::Error;

use camera_ipc::{ConfigError, PixelFormat};

/// Misuse of the pipeline by its caller. Returned immediately and never
/// affects frames that were already accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// Frame shape differs from the one the pipeline was built for.
    #[error(
        "Frame is {width}x{height} {}, pipeline expects {expected_width}x{expected_height} {}",
        format.name(),
        expected_format.name()
    )]
    FrameShape {
        expected_width: u32,
        expected_height: u32,
        expected_format: PixelFormat,
        width: u32,
        height: u32,
        format: PixelFormat,
    },

    /// The pipeline is being or has been destroyed.
    #[error("Pipeline used after destruction")]
    UseAfterDestroy,

    /// The pipeline was destroyed twice.
    #[error("Pipeline destroyed twice")]
    DoubleDestroy,

    /// A handle that was never issued, or was already released.
    #[error("Unknown handle {0:#x}")]
    UnknownHandle(usize),

    /// A capture source is already feeding this pipeline.
    #[error("A capture source is already attached")]
    SourceAlreadyAttached,
}

/// Errors from pipeline operations that can fail for more than one reason.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Contract(#[from] ContractViolation),
}
