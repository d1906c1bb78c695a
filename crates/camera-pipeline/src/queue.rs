//! Bounded drop-oldest frame queue between the producer and the encode worker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use camera_capture::FrameBuffer;

/// Result of pushing a frame.
#[derive(Debug)]
pub enum PushOutcome {
    /// The frame was queued without displacing anything.
    Enqueued,

    /// The frame was queued and the oldest waiting frame was evicted.
    Evicted(FrameBuffer),

    /// The queue is closed; the frame is handed back.
    Closed(FrameBuffer),
}

/// Result of waiting for a frame.
#[derive(Debug)]
pub enum Popped {
    /// The next frame in FIFO order.
    Frame(FrameBuffer),

    /// The wait timed out with nothing to take (or the queue is paused).
    Idle,

    /// The queue was closed; no frame will be handed out again.
    Closed,
}

struct QueueState {
    frames: VecDeque<FrameBuffer>,
    paused: bool,
    closed: bool,
}

/// Multi-producer, single-consumer queue of at most `capacity` frames.
///
/// Pushing never blocks beyond the lock: when the queue is full the oldest
/// frame is evicted and returned to the caller. The consumer's wait is the
/// only blocking point, and `close` wakes it.
pub struct FrameQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                paused: false,
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest one if the queue is full.
    pub fn push(&self, frame: FrameBuffer) -> PushOutcome {
        let mut state = self.state.lock();
        if state.closed {
            return PushOutcome::Closed(frame);
        }

        let evicted = if state.frames.len() >= self.capacity {
            state.frames.pop_front()
        } else {
            None
        };
        state.frames.push_back(frame);
        drop(state);

        self.ready.notify_one();

        match evicted {
            Some(old) => PushOutcome::Evicted(old),
            None => PushOutcome::Enqueued,
        }
    }

    /// Wait up to `timeout` for the next frame.
    pub fn pop_timeout(&self, timeout: Duration) -> Popped {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Popped::Closed;
            }
            if !state.paused {
                if let Some(frame) = state.frames.pop_front() {
                    return Popped::Frame(frame);
                }
            }
            if Instant::now() >= deadline {
                return Popped::Idle;
            }
            self.ready.wait_until(&mut state, deadline);
        }
    }

    /// Close the queue and hand back every frame still waiting.
    ///
    /// Wakes the consumer. Idempotent; later calls return nothing.
    pub fn close(&self) -> Vec<FrameBuffer> {
        let mut state = self.state.lock();
        state.closed = true;
        let remaining = state.frames.drain(..).collect();
        drop(state);

        self.ready.notify_all();
        remaining
    }

    /// Stop handing frames to the consumer. Pushes still apply drop-oldest.
    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    /// Resume handing frames to the consumer.
    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.ready.notify_all();
    }

    /// Whether the consumer is held off.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Frames currently waiting.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Returns true if no frames are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of waiting frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
