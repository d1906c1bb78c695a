//! Named threads that can be joined with a deadline.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use camera_ipc::ConfigError;

/// A spawned thread plus a signal fired when its body returns.
pub(crate) struct ManagedThread {
    name: &'static str,
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
}

impl ManagedThread {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Result<Self, ConfigError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body();
                let _ = done_tx.send(());
            })
            .map_err(|e| ConfigError::Spawn {
                thread: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            handle,
            done_rx,
        })
    }

    /// Wait for the thread to finish, at most `timeout`. Returns false and
    /// detaches the thread if it is still running at the deadline.
    pub(crate) fn join_timeout(self, timeout: Duration) -> bool {
        match self.done_rx.recv_timeout(timeout) {
            // A dropped sender means the body panicked.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!(thread = self.name, "Thread panicked");
                }
                debug!(thread = self.name, "Thread joined");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    thread = self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Thread did not finish in time, detaching"
                );
                false
            }
        }
    }
}
