//! The pipeline service.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, info, instrument, warn};

use camera_capture::{CaptureSource, FrameBuffer};
use camera_encoder::Encoder;
use camera_ipc::{
    ConfigError, DropReason, PipelineConfig, PipelineEvent, PipelineMetrics, PipelineState,
    ShutdownPhase,
};
use camera_transport::Transport;

use crate::capture::CapturePump;
use crate::error::ContractViolation;
use crate::resources::{check_framing, Startup, StartupResources};
use crate::shared::{Shared, SubmitOutcome};
use crate::threads::ManagedThread;
use crate::PipelineResult;

/// What destruction observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// Frames still queued at destruction and discarded unencoded.
    pub discarded_frames: usize,

    /// The in-flight encode outlived the shutdown timeout; the worker was
    /// detached and releases the encoder and transport when it returns.
    pub timed_out: bool,

    /// Final counters.
    pub metrics: PipelineMetrics,
}

/// Capture-to-encode pipeline bound to one frame shape and one endpoint.
///
/// Frames go into a bounded drop-oldest queue; a dedicated `camera-encode`
/// thread encodes them in order and hands each payload to the transport.
/// The service owns that thread, and through it the encoder and transport,
/// until [`destroy`](Self::destroy) or drop.
pub struct PipelineService {
    config: PipelineConfig,
    shared: Arc<Shared>,
    worker: Option<ManagedThread>,
    capture: Option<CapturePump>,
}

impl PipelineService {
    /// Build the encoder and transport described by `config` and start the
    /// encode worker.
    pub fn create(config: PipelineConfig) -> Result<Self, ConfigError> {
        Self::start(config, StartupResources::default())
    }

    /// Shorthand for [`create`](Self::create) with default tuning.
    pub fn create_default(
        width: u32,
        height: u32,
        endpoint: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::create(PipelineConfig::new(width, height, endpoint))
    }

    /// Start a pipeline around an existing encoder and transport. The
    /// endpoint in `config` is informational only.
    pub fn with_parts(
        config: PipelineConfig,
        encoder: Encoder,
        transport: Box<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        Self::start(
            config,
            StartupResources {
                encoder: Some(encoder),
                transport: Some(transport),
            },
        )
    }

    #[instrument(name = "pipeline_create", skip_all, fields(width = config.width, height = config.height, endpoint = %config.endpoint))]
    fn start(config: PipelineConfig, supplied: StartupResources) -> Result<Self, ConfigError> {
        config.validate()?;
        if supplied.transport.is_none() {
            check_framing(&config)?;
        }

        let shared = Arc::new(Shared::new(
            config.width,
            config.height,
            config.pixel_format,
            config.queue_capacity,
        ));

        let worker = Startup::new(&config, &shared, supplied).run()?;

        shared.metrics.start();
        shared.transition_to(PipelineState::Running);
        info!(
            queue_capacity = config.queue_capacity,
            codec = ?config.codec,
            "Pipeline started"
        );

        Ok(Self {
            config,
            shared,
            worker: Some(worker),
            capture: None,
        })
    }

    /// Feed frames from `source` through a `camera-capture` pump thread.
    pub fn attach_source(&mut self, source: Box<dyn CaptureSource>) -> PipelineResult<()> {
        if self.capture.is_some() {
            return Err(ContractViolation::SourceAlreadyAttached.into());
        }
        if !self.shared.state().accepts_frames() {
            return Err(ContractViolation::UseAfterDestroy.into());
        }
        self.shared
            .check_shape(source.dimensions(), source.format())?;

        self.capture = Some(CapturePump::start(Arc::clone(&self.shared), source)?);
        debug!("Capture source attached");
        Ok(())
    }

    /// Enqueue one frame. Never blocks on the encoder; when the queue is
    /// full the oldest waiting frame is dropped.
    pub fn submit_frame(&self, frame: FrameBuffer) -> Result<SubmitOutcome, ContractViolation> {
        self.shared.submit(frame)
    }

    /// Stop dequeuing. Submissions are still accepted.
    pub fn pause(&self) {
        if self.shared.state() != PipelineState::Running {
            debug!("Not running, ignoring pause");
            return;
        }
        self.shared.queue.pause();
        self.shared.transition_to(PipelineState::Paused);
    }

    /// Resume dequeuing after [`pause`](Self::pause).
    pub fn resume(&self) {
        if self.shared.state() != PipelineState::Paused {
            debug!("Not paused, ignoring resume");
            return;
        }
        self.shared.queue.resume();
        self.shared.transition_to(PipelineState::Running);
    }

    /// Current counters.
    pub fn metrics(&self) -> PipelineMetrics {
        self.shared.metrics_snapshot()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Observability events. Steady-state failures are reported only here
    /// and in [`metrics`](Self::metrics).
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.shared.events()
    }

    /// Configuration the pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stop capture, discard queued frames, wait for the in-flight encode and
    /// release the encoder and transport.
    pub fn destroy(mut self) -> ShutdownReport {
        self.shutdown()
    }

    #[instrument(name = "pipeline_destroy", skip(self))]
    fn shutdown(&mut self) -> ShutdownReport {
        let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        let mut timed_out = false;

        info!("Stopping pipeline");
        self.shared.transition_to(PipelineState::Stopping {
            phase: ShutdownPhase::StopCapture,
        });
        if let Some(capture) = self.capture.take() {
            timed_out |= !capture.stop(timeout);
        }

        self.shared.transition_to(PipelineState::Stopping {
            phase: ShutdownPhase::DiscardQueue,
        });
        let discarded = self.shared.queue.close();
        for frame in &discarded {
            self.shared.metrics.record_shutdown_drop();
            self.shared.send_event(PipelineEvent::FrameDropped {
                sequence: frame.sequence(),
                reason: DropReason::Shutdown,
            });
        }
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "Discarded queued frames");
        }

        self.shared.transition_to(PipelineState::Stopping {
            phase: ShutdownPhase::StopWorker,
        });
        if let Some(worker) = self.worker.take() {
            if !worker.join_timeout(timeout) {
                warn!("In-flight encode outlived the shutdown timeout");
                timed_out = true;
            }
        }

        let metrics = self.shared.metrics_snapshot();
        self.shared.metrics.stop();
        self.shared.transition_to(PipelineState::Stopped);

        info!(
            encoded = metrics.frames_encoded,
            sent = metrics.payloads_sent,
            dropped = metrics.dropped_frames,
            "Pipeline stopped"
        );

        ShutdownReport {
            discarded_frames: discarded.len(),
            timed_out,
            metrics,
        }
    }
}

impl Drop for PipelineService {
    fn drop(&mut self) {
        if !self.shared.state().is_stopped() {
            self.shutdown();
        }
    }
}
