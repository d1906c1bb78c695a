//! Process-wide codec runtime.
//!
//! Native codec libraries commonly keep global state that must be set up
//! before the first encoder exists and torn down after the last one is gone.
//! Every [`crate::Encoder`] holds a [`CodecRuntimeGuard`]; the runtime is
//! initialized on the first acquire and torn down on the last release.
//! Acquire and release are serialized, so init and teardown never overlap.

use parking_lot::{const_mutex, Mutex};
use tracing::{debug, info};

struct RuntimeState {
    users: usize,
    initializations: u64,
}

static RUNTIME: Mutex<RuntimeState> = const_mutex(RuntimeState {
    users: 0,
    initializations: 0,
});

/// Handle to the process-wide codec runtime.
pub struct CodecRuntime;

impl CodecRuntime {
    /// Acquire the runtime, initializing it if this is the first user.
    pub fn acquire() -> CodecRuntimeGuard {
        let mut state = RUNTIME.lock();
        if state.users == 0 {
            state.initializations += 1;
            info!(
                generation = state.initializations,
                "Initializing codec runtime"
            );
        }
        state.users += 1;
        debug!(users = state.users, "Codec runtime acquired");
        CodecRuntimeGuard { _private: () }
    }

    /// Number of live guards.
    pub fn active_users() -> usize {
        RUNTIME.lock().users
    }

    /// Whether the runtime is currently initialized.
    pub fn is_initialized() -> bool {
        RUNTIME.lock().users > 0
    }

    /// How many times the runtime has been initialized in this process.
    pub fn initializations() -> u64 {
        RUNTIME.lock().initializations
    }
}

/// Keeps the codec runtime alive. Not `Clone`: each guard is released
/// exactly once, on drop.
pub struct CodecRuntimeGuard {
    _private: (),
}

impl Drop for CodecRuntimeGuard {
    fn drop(&mut self) {
        let mut state = RUNTIME.lock();
        state.users = state.users.saturating_sub(1);
        debug!(users = state.users, "Codec runtime released");
        if state.users == 0 {
            info!("Tearing down codec runtime");
        }
    }
}
