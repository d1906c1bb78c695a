//! Startup sequencing with rollback.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use camera_encoder::{Encoder, EncoderConfig, FRAME_HEADER_LEN};
use camera_ipc::{ConfigError, PipelineConfig, PipelineState, StartupPhase};
use camera_transport::{max_payload_len, open_transport, Transport, TransportError};

use crate::shared::Shared;
use crate::threads::ManagedThread;
use crate::worker::EncodeWorker;

/// Resources created so far during startup.
#[derive(Default)]
pub(crate) struct StartupResources {
    pub(crate) encoder: Option<Encoder>,
    pub(crate) transport: Option<Box<dyn Transport>>,
}

/// Walks the startup phases in order. On failure every resource created by
/// an earlier phase is released, latest first, before the error is returned.
pub(crate) struct Startup<'a> {
    config: &'a PipelineConfig,
    shared: &'a Arc<Shared>,
    resources: StartupResources,
    current_phase: Option<StartupPhase>,
}

impl<'a> Startup<'a> {
    /// `supplied` may already hold an encoder and transport; those phases then
    /// adopt them instead of creating new ones.
    pub(crate) fn new(
        config: &'a PipelineConfig,
        shared: &'a Arc<Shared>,
        supplied: StartupResources,
    ) -> Self {
        Self {
            config,
            shared,
            resources: supplied,
            current_phase: None,
        }
    }

    /// Run every phase and return the started worker.
    #[instrument(name = "pipeline_startup", skip(self), fields(endpoint = %self.config.endpoint))]
    pub(crate) fn run(mut self) -> Result<ManagedThread, ConfigError> {
        let mut phase = StartupPhase::InitEncoder;

        loop {
            self.current_phase = Some(phase);
            self.shared
                .transition_to(PipelineState::Starting { phase });

            if let Err(e) = self.init_phase(phase) {
                warn!(phase = phase.name(), error = %e, "Startup failed");
                self.rollback();
                return Err(e);
            }

            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }

        self.start_worker()
    }

    fn init_phase(&mut self, phase: StartupPhase) -> Result<(), ConfigError> {
        info!("Initializing phase: {}", phase.name());

        match phase {
            StartupPhase::InitEncoder => self.init_encoder(),
            StartupPhase::OpenTransport => self.open_transport(),
            // Spawned last, once nothing else can fail.
            StartupPhase::StartWorker => Ok(()),
        }
    }

    fn init_encoder(&mut self) -> Result<(), ConfigError> {
        let expected = (self.config.width, self.config.height);

        if let Some(encoder) = &self.resources.encoder {
            if encoder.dimensions() != expected || encoder.format() != self.config.pixel_format {
                return Err(ConfigError::EncoderInit(format!(
                    "encoder is {}x{} {}, pipeline is {}x{} {}",
                    encoder.dimensions().0,
                    encoder.dimensions().1,
                    encoder.format().name(),
                    expected.0,
                    expected.1,
                    self.config.pixel_format.name()
                )));
            }
            debug!(codec = encoder.name(), "Using supplied encoder");
            return Ok(());
        }

        let encoder = Encoder::new(&EncoderConfig {
            width: self.config.width,
            height: self.config.height,
            format: self.config.pixel_format,
            codec: self.config.codec,
            keyframe_interval: self.config.keyframe_interval,
        })
        .map_err(|e| ConfigError::EncoderInit(e.to_string()))?;

        debug!(codec = encoder.name(), "Encoder initialized");
        self.resources.encoder = Some(encoder);
        Ok(())
    }

    fn open_transport(&mut self) -> Result<(), ConfigError> {
        if self.resources.transport.is_some() {
            debug!("Using supplied transport");
            return Ok(());
        }

        let transport = open_transport(&self.config.endpoint, self.config.max_datagram_size)
            .map_err(|e| endpoint_error(&self.config.endpoint, e))?;

        debug!(transport = transport.name(), "Transport opened");
        self.resources.transport = Some(transport);
        Ok(())
    }

    fn start_worker(mut self) -> Result<ManagedThread, ConfigError> {
        let (Some(encoder), Some(transport)) =
            (self.resources.encoder.take(), self.resources.transport.take())
        else {
            self.rollback();
            return Err(ConfigError::Invalid(
                "startup finished without encoder and transport".to_string(),
            ));
        };

        let worker = EncodeWorker::new(Arc::clone(self.shared), encoder, transport);
        match ManagedThread::spawn("camera-encode", move || worker.run()) {
            Ok(thread) => Ok(thread),
            Err(e) => {
                // A failed spawn drops the closure, and the worker with it.
                warn!(error = %e, "Startup failed");
                self.shared.transition_to(PipelineState::Stopped);
                Err(e)
            }
        }
    }

    /// Release resources from the current phase backwards.
    #[instrument(name = "startup_rollback", skip(self))]
    fn rollback(&mut self) {
        let Some(mut phase) = self.current_phase.take() else {
            return;
        };

        loop {
            info!("Rolling back phase: {}", phase.name());
            self.rollback_phase(phase);

            match phase.previous() {
                Some(prev) => phase = prev,
                None => break,
            }
        }

        // A supplied transport is held before its phase runs.
        self.rollback_phase(StartupPhase::OpenTransport);
        self.shared.transition_to(PipelineState::Stopped);
    }

    fn rollback_phase(&mut self, phase: StartupPhase) {
        match phase {
            StartupPhase::StartWorker => {}
            StartupPhase::OpenTransport => {
                if let Some(mut transport) = self.resources.transport.take() {
                    if let Err(e) = transport.close() {
                        warn!(error = %e, "Transport close failed during rollback");
                    }
                }
            }
            StartupPhase::InitEncoder => {
                self.resources.encoder = None;
            }
        }
    }
}

/// Reject configurations whose largest encoded frame cannot be framed into
/// datagrams of `max_datagram_size`. Checked before anything is created.
pub(crate) fn check_framing(config: &PipelineConfig) -> Result<(), ConfigError> {
    let frame_size = config.frame_size().ok_or(ConfigError::InvalidDimensions {
        width: config.width,
        height: config.height,
    })?;
    let worst_case = frame_size.saturating_add(FRAME_HEADER_LEN);
    let limit = max_payload_len(config.max_datagram_size);

    if worst_case > limit {
        return Err(ConfigError::Invalid(format!(
            "{}x{} {} frames need up to {} bytes, datagrams of {} bytes carry at most {}",
            config.width,
            config.height,
            config.pixel_format.name(),
            worst_case,
            config.max_datagram_size,
            limit
        )));
    }
    Ok(())
}

fn endpoint_error(endpoint: &str, error: TransportError) -> ConfigError {
    ConfigError::EndpointUnavailable {
        endpoint: endpoint.to_string(),
        reason: error.to_string(),
    }
}
