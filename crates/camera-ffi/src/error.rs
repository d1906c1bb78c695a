//! Errors raised at the C boundary.

use std::str::Utf8Error;

use thiserror::Error;

use camera_capture::CaptureError;
use camera_encoder::EncodeError;
use camera_pipeline::{ConfigError, ContractViolation};

/// Status returned for a null, unknown or released handle.
pub const STATUS_BAD_HANDLE: i32 = -1;

/// Status returned for malformed arguments.
pub const STATUS_INVALID_INPUT: i32 = -3;

/// Status returned when the library itself failed.
pub const STATUS_INTERNAL: i32 = -4;

/// Errors that can occur in a C entry point.
#[derive(Debug, Error)]
pub enum FfiError {
    /// The handle argument was null.
    #[error("Null handle")]
    NullHandle,

    /// A required pointer argument was null.
    #[error("Null {0} pointer")]
    NullArgument(&'static str),

    /// A string argument was not UTF-8.
    #[error("Invalid string argument: {0}")]
    InvalidString(#[from] Utf8Error),

    /// Configuration JSON did not parse.
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Contract(#[from] ContractViolation),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// A Rust panic was caught before it crossed the boundary.
    #[error("Internal panic: {0}")]
    Panic(String),
}

impl FfiError {
    /// Status code reported to C callers.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::NullHandle
            | Self::Contract(
                ContractViolation::UnknownHandle(_)
                | ContractViolation::UseAfterDestroy
                | ContractViolation::DoubleDestroy,
            ) => STATUS_BAD_HANDLE,
            Self::Encode(e) => e.status_code(),
            Self::NullArgument(_)
            | Self::InvalidString(_)
            | Self::Json(_)
            | Self::Contract(_)
            | Self::Capture(_) => STATUS_INVALID_INPUT,
            Self::Config(_) | Self::Panic(_) => STATUS_INTERNAL,
        }
    }
}

/// Result type for C entry points.
pub type FfiResult<T> = Result<T, FfiError>;
