//! Deterministic collaborators for pipeline tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use camera_capture::{CaptureTimestamp, FrameBuffer};
use camera_encoder::{Codec, CodecOutput, EncodeError, EncodeResult, Encoder, EncodedPayload};
use camera_ipc::{PipelineConfig, PipelineEvent, PixelFormat};
use camera_transport::{Transport, TransportError, TransportResult, TransportStatistics};

pub(crate) const WIDTH: u32 = 8;
pub(crate) const HEIGHT: u32 = 6;

pub(crate) fn frame(width: u32, height: u32, sequence: u64) -> FrameBuffer {
    let size = PixelFormat::Bgr24.buffer_size(width, height).unwrap();
    FrameBuffer::new(
        Bytes::from(vec![sequence as u8; size]),
        width,
        height,
        PixelFormat::Bgr24,
        CaptureTimestamp::now(Instant::now()),
        sequence,
    )
    .unwrap()
}

pub(crate) fn test_frame() -> FrameBuffer {
    frame(WIDTH, HEIGHT, 0)
}

pub(crate) fn test_config() -> PipelineConfig {
    PipelineConfig::new(WIDTH, HEIGHT, "udp://127.0.0.1:9")
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub(crate) fn drain_events(events: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    events.try_iter().collect()
}

/// Observation points shared by a [`ScriptedCodec`] and the test body.
#[derive(Clone, Default)]
pub(crate) struct CodecTally {
    pub calls: Arc<AtomicUsize>,
    pub flushes: Arc<AtomicUsize>,
    pub drops: Arc<AtomicUsize>,
}

/// Codec whose behavior per frame sequence is set up front.
pub(crate) struct ScriptedCodec {
    tally: CodecTally,
    fail_on: HashSet<u64>,
    panic_on: HashSet<u64>,
    gate: Option<Receiver<()>>,
    started: Option<Sender<u64>>,
}

impl ScriptedCodec {
    pub(crate) fn new(tally: &CodecTally) -> Self {
        Self {
            tally: tally.clone(),
            fail_on: HashSet::new(),
            panic_on: HashSet::new(),
            gate: None,
            started: None,
        }
    }

    /// Fail when encoding the frame with this sequence.
    pub(crate) fn failing_on(mut self, sequence: u64) -> Self {
        self.fail_on.insert(sequence);
        self
    }

    /// Panic when encoding the frame with this sequence.
    pub(crate) fn panicking_on(mut self, sequence: u64) -> Self {
        self.panic_on.insert(sequence);
        self
    }

    /// Report each encode on `started`, then block until `gate` yields.
    pub(crate) fn gated(mut self, gate: Receiver<()>, started: Sender<u64>) -> Self {
        self.gate = Some(gate);
        self.started = Some(started);
        self
    }

    pub(crate) fn into_encoder(self) -> Encoder {
        Encoder::with_codec(WIDTH, HEIGHT, PixelFormat::Bgr24, Box::new(self)).unwrap()
    }
}

impl Codec for ScriptedCodec {
    fn encode(&mut self, frame: &FrameBuffer) -> EncodeResult<CodecOutput> {
        self.tally.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(started) = &self.started {
            let _ = started.send(frame.sequence());
        }
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }

        if self.panic_on.contains(&frame.sequence()) {
            panic!("scripted panic on {}", frame.sequence());
        }
        if self.fail_on.contains(&frame.sequence()) {
            return Err(EncodeError::Codec(format!("scripted failure on {}", frame.sequence())));
        }

        Ok(CodecOutput {
            data: Bytes::copy_from_slice(&frame.sequence().to_be_bytes()),
            is_keyframe: true,
        })
    }

    fn flush(&mut self) -> EncodeResult<()> {
        self.tally.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

impl Drop for ScriptedCodec {
    fn drop(&mut self) {
        self.tally.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a [`RecordingTransport`] has seen.
#[derive(Clone, Default)]
pub(crate) struct TransportLog {
    pub sequences: Arc<Mutex<Vec<u64>>>,
    pub keyframes: Arc<Mutex<Vec<bool>>>,
    pub closes: Arc<AtomicUsize>,
}

impl TransportLog {
    pub(crate) fn delivered(&self) -> Vec<u64> {
        self.sequences.lock().clone()
    }

    /// Keyframe flag of each delivered payload, in delivery order.
    pub(crate) fn keyframes(&self) -> Vec<bool> {
        self.keyframes.lock().clone()
    }
}

/// Transport that records payload sequences instead of sending them.
pub(crate) struct RecordingTransport {
    log: TransportLog,
    reject: HashSet<u64>,
    panic_on: HashSet<u64>,
}

impl RecordingTransport {
    pub(crate) fn new(log: &TransportLog) -> Self {
        Self {
            log: log.clone(),
            reject: HashSet::new(),
            panic_on: HashSet::new(),
        }
    }

    /// Refuse the payload with this sequence.
    pub(crate) fn rejecting(mut self, sequence: u64) -> Self {
        self.reject.insert(sequence);
        self
    }

    /// Panic when handed the payload with this sequence.
    pub(crate) fn panicking_on(mut self, sequence: u64) -> Self {
        self.panic_on.insert(sequence);
        self
    }

    pub(crate) fn boxed(self) -> Box<dyn Transport> {
        Box::new(self)
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, payload: EncodedPayload) -> TransportResult<()> {
        if self.panic_on.contains(&payload.sequence) {
            panic!("scripted transport panic on {}", payload.sequence);
        }
        if self.reject.contains(&payload.sequence) {
            return Err(TransportError::Backpressure);
        }
        self.log.sequences.lock().push(payload.sequence);
        self.log.keyframes.lock().push(payload.is_keyframe);
        Ok(())
    }

    fn close(&mut self) -> TransportResult<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn statistics(&self) -> TransportStatistics {
        TransportStatistics {
            payloads_sent: self.log.sequences.lock().len() as u64,
            ..Default::default()
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
