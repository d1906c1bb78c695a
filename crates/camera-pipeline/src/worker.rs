//! Encode worker: the single consumer of the frame queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use camera_capture::FrameBuffer;
use camera_encoder::{EncodeError, Encoder};
use camera_ipc::PipelineEvent;
use camera_transport::Transport;

use crate::queue::Popped;
use crate::shared::Shared;

/// Interval between periodic stats logs and metrics events.
pub const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Owns the encoder and transport for the lifetime of the worker thread.
pub(crate) struct EncodeWorker {
    shared: Arc<Shared>,
    encoder: Encoder,
    transport: Box<dyn Transport>,
}

impl EncodeWorker {
    pub(crate) fn new(shared: Arc<Shared>, encoder: Encoder, transport: Box<dyn Transport>) -> Self {
        Self {
            shared,
            encoder,
            transport,
        }
    }

    /// Drain the queue until it is closed, then release encoder and transport.
    #[instrument(name = "encode_worker", skip(self), fields(codec = self.encoder.name(), transport = self.transport.name()))]
    pub(crate) fn run(mut self) {
        info!("Encode worker started");
        let mut last_stats = Instant::now();

        loop {
            let wait = STATS_INTERVAL.saturating_sub(last_stats.elapsed());
            match self.shared.queue.pop_timeout(wait) {
                Popped::Frame(frame) => self.process(frame),
                Popped::Idle => {}
                Popped::Closed => break,
            }

            if last_stats.elapsed() >= STATS_INTERVAL {
                self.report_stats();
                last_stats = Instant::now();
            }
        }

        self.release();
    }

    fn process(&mut self, frame: FrameBuffer) {
        let sequence = frame.sequence();

        let encoded = match panic::catch_unwind(AssertUnwindSafe(|| self.encoder.encode(&frame))) {
            Ok(result) => result,
            Err(payload) => {
                // Codec state is unknown after a panic.
                self.reset_codec();
                Err(EncodeError::Codec(format!(
                    "codec panicked: {}",
                    panic_message(payload.as_ref())
                )))
            }
        };

        let payload = match encoded {
            Ok(payload) => payload,
            Err(e) => {
                warn!(sequence, error = %e, "Encode failed, frame dropped");
                self.shared.metrics.record_encode_error();
                self.shared.send_event(PipelineEvent::EncodeFailed {
                    sequence,
                    message: e.to_string(),
                });
                return;
            }
        };
        drop(frame);
        self.shared.metrics.record_encoded();

        let size = payload.data.len() as u64;
        let sent = match panic::catch_unwind(AssertUnwindSafe(|| self.transport.send(payload))) {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(payload) => Err(format!(
                "transport panicked: {}",
                panic_message(payload.as_ref())
            )),
        };

        match sent {
            Ok(()) => self.shared.metrics.record_sent(size),
            Err(message) => {
                warn!(sequence, error = %message, "Send failed, payload dropped");
                self.shared.metrics.record_send_error();
                self.shared.send_event(PipelineEvent::SendFailed { sequence, message });
                // The receiver never saw this frame, so it cannot be a reference.
                self.reset_codec();
            }
        }
    }

    /// Drop codec reference state so the next frame is a keyframe.
    fn reset_codec(&mut self) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.encoder.flush())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Encoder flush failed"),
            Err(payload) => warn!(
                error = %panic_message(payload.as_ref()),
                "Encoder flush panicked"
            ),
        }
    }

    fn report_stats(&self) {
        let metrics = self.shared.metrics_snapshot();
        let transport = self.transport.statistics();
        info!(
            "Pipeline stats: submitted={}, encoded={}, sent={}, dropped={}, errors={}, socket_errors={}, uptime={}s",
            metrics.frames_submitted,
            metrics.frames_encoded,
            metrics.payloads_sent,
            metrics.dropped_frames,
            metrics.encode_errors + metrics.send_errors,
            transport.socket_errors,
            metrics.uptime_seconds
        );
        self.shared.send_event(PipelineEvent::Metrics(metrics));
    }

    fn release(mut self) {
        self.reset_codec();
        if let Err(e) = self.transport.close() {
            warn!(error = %e, "Transport close failed");
        }

        info!(
            frames_encoded = self.encoder.frames_encoded(),
            bytes_sent = self.transport.statistics().bytes_sent,
            "Encode worker stopped"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
