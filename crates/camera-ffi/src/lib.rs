//! C ABI for the camera pipeline.
//!
//! Exposes the pipeline service (`new_service`, `send_frame`,
//! `free_service`) and a standalone frame encoder (`new_encoder`,
//! `encode_frame`, `encoder_output`, `free_encoder`). Objects live in handle
//! registries on the Rust side; C callers only ever see opaque ids. Misuse
//! is logged and reported, never undefined behavior, and no panic unwinds
//! into the caller.

mod encoder;
mod error;
mod handle;
mod service;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use encoder::{encode_frame, encoder_output, free_encoder, new_encoder};
pub use error::{FfiError, FfiResult, STATUS_BAD_HANDLE, STATUS_INTERNAL, STATUS_INVALID_INPUT};
pub use handle::HandleRegistry;
pub use service::{free_service, new_service, new_service_with_config, send_frame};

const DEFAULT_LOG_FILTER: &str = "camera_ffi=info,camera_pipeline=info,camera_encoder=info,camera_transport=info,camera_capture=info";

static LOGGING: Once = Once::new();

/// Install the tracing subscriber. `RUST_LOG` overrides the default filter.
/// Safe to call more than once; a subscriber installed by the host wins.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

/// C entry point for [`init_logging`].
#[no_mangle]
pub extern "C" fn camera_init_logging() {
    init_logging();
}

/// Run `f`, turning a panic into an error so it never crosses the boundary.
pub(crate) fn guarded<T>(op: &'static str, f: impl FnOnce() -> FfiResult<T>) -> FfiResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(op, %message, "Panic caught at C boundary");
            Err(FfiError::Panic(message))
        }
    }
}

/// Log a failed call.
pub(crate) fn report(op: &'static str, err: &FfiError) {
    match err {
        FfiError::Contract(_) | FfiError::NullHandle | FfiError::NullArgument(_) => {
            error!(op, error = %err, "Contract violation")
        }
        _ => error!(op, error = %err, "Call failed"),
    }
}
