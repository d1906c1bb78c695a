//! Capture pump: pulls frames from an attached source into the queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use camera_capture::CaptureSource;
use camera_ipc::{ConfigError, PipelineEvent};

use crate::error::ContractViolation;
use crate::shared::Shared;
use crate::threads::ManagedThread;

/// A running capture pump thread.
pub(crate) struct CapturePump {
    should_stop: Arc<AtomicBool>,
    thread: ManagedThread,
}

impl CapturePump {
    pub(crate) fn start(
        shared: Arc<Shared>,
        source: Box<dyn CaptureSource>,
    ) -> Result<Self, ConfigError> {
        let should_stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&should_stop);
        let thread = ManagedThread::spawn("camera-capture", move || pump(shared, source, stop))?;

        Ok(Self {
            should_stop,
            thread,
        })
    }

    /// Signal the pump and wait for it to stop the source.
    pub(crate) fn stop(self, timeout: Duration) -> bool {
        self.should_stop.store(true, Ordering::SeqCst);
        self.thread.join_timeout(timeout)
    }
}

fn pump(shared: Arc<Shared>, mut source: Box<dyn CaptureSource>, should_stop: Arc<AtomicBool>) {
    let (width, height) = source.dimensions();
    info!(width, height, format = source.format().name(), "Capture pump started");

    let mut frames: u64 = 0;
    let mut ended: Option<Option<String>> = None;

    while !should_stop.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(Some(frame)) => match shared.submit(frame) {
                Ok(_) => frames += 1,
                Err(ContractViolation::UseAfterDestroy) => break,
                Err(e) => {
                    warn!(error = %e, "Capture source produced an unusable frame");
                    ended = Some(Some(e.to_string()));
                    break;
                }
            },
            Ok(None) => {
                debug!("Capture source ended");
                ended = Some(None);
                break;
            }
            Err(e) => {
                warn!(error = %e, "Capture failed");
                ended = Some(Some(e.to_string()));
                break;
            }
        }
    }

    if let Err(e) = source.stop() {
        debug!(error = %e, "Capture source stop failed");
    }

    if let Some(error) = ended {
        shared.send_event(PipelineEvent::CaptureEnded { error });
    }

    info!(frames, "Capture pump stopped");
}
