//! Single-worker frame queue for asynchronous sending.
//!
//! The producer copies each frame into the queue and returns immediately; one
//! background thread takes frames in FIFO order and hands them to a
//! [`FrameHandler`]. The queue lock is never held while a frame is handled.

use framecast_core::{FramecastError, OverflowPolicy, PendingFrame, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Consumer of queued frames, called on the worker thread.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: PendingFrame) -> Result<()>;
}

impl<F> FrameHandler for F
where
    F: Fn(PendingFrame) -> Result<()> + Send + Sync,
{
    fn handle(&self, frame: PendingFrame) -> Result<()> {
        self(frame)
    }
}

/// Queue bound and overflow behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    /// `None` is unbounded.
    pub queue_depth: Option<usize>,
    pub overflow: OverflowPolicy,
}

/// Snapshot of pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub enqueued: u64,
    pub processed: u64,
    pub failed: u64,
    /// Frames lost to a full queue or submitted while stopped.
    pub dropped: u64,
    /// Frames still queued when `stop` drained the queue.
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<PendingFrame>,
    running: bool,
    stop_requested: bool,
    /// The worker is handling a frame outside the lock.
    busy: bool,
    options: PipelineOptions,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signals the worker: a frame arrived or stop was requested.
    wake: Condvar,
    /// Signals waiters: the worker finished a frame.
    idle: Condvar,
    counters: Counters,
}

/// Producer/consumer queue with exactly one worker while running.
pub struct AsyncFramePipeline {
    shared: Arc<Shared>,
    handler: Arc<dyn FrameHandler>,
    /// Also serializes start/stop transitions.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncFramePipeline {
    pub fn new(handler: Arc<dyn FrameHandler>, options: PipelineOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    options,
                    ..Default::default()
                }),
                wake: Condvar::new(),
                idle: Condvar::new(),
                counters: Counters::default(),
            }),
            handler,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. Starting a running pipeline is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        {
            let mut state = self.shared.state.lock();
            state.stop_requested = false;
            state.running = true;
        }

        let shared = Arc::clone(&self.shared);
        let handler = Arc::clone(&self.handler);
        let handle = thread::Builder::new()
            .name("framecast-sender".to_string())
            .spawn(move || worker_loop(shared, handler))
            .map_err(|e| {
                self.shared.state.lock().running = false;
                FramecastError::Pipeline(format!("failed to spawn worker: {}", e))
            })?;

        *worker = Some(handle);
        info!("async frame pipeline started");
        Ok(())
    }

    /// Request stop, join the worker, then discard anything left in the queue.
    ///
    /// The worker finishes every frame queued before the request. Stopping a
    /// stopped pipeline is a no-op.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };

        {
            let mut state = self.shared.state.lock();
            state.stop_requested = true;
            state.running = false;
        }
        self.shared.wake.notify_all();

        if handle.join().is_err() {
            error!("async frame pipeline worker panicked");
        }

        let leftover = {
            let mut state = self.shared.state.lock();
            state.busy = false;
            let n = state.frames.len();
            state.frames.clear();
            n
        };
        self.shared.idle.notify_all();
        if leftover > 0 {
            self.shared
                .counters
                .discarded
                .fetch_add(leftover as u64, Ordering::Relaxed);
            warn!(frames = leftover, "discarded queued frames on stop");
        }
        info!("async frame pipeline stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Queue a frame. Never waits on the worker.
    ///
    /// Fails with `QueueFull` under [`OverflowPolicy::Reject`] and with
    /// `Pipeline` when the pipeline is stopped.
    pub fn enqueue(&self, frame: PendingFrame) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.running {
            drop(state);
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(FramecastError::Pipeline(
                "pipeline is not running".to_string(),
            ));
        }

        if let Some(depth) = state.options.queue_depth {
            if state.frames.len() >= depth {
                match state.options.overflow {
                    OverflowPolicy::DropOldest => {
                        let oldest = state.frames.pop_front().map(|f| f.sequence);
                        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(depth, sequence = ?oldest, "send queue full, dropped oldest frame");
                    }
                    OverflowPolicy::Reject => {
                        drop(state);
                        self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(depth, sequence = frame.sequence, "send queue full, rejected frame");
                        return Err(FramecastError::QueueFull { depth });
                    }
                }
            }
        }

        state.frames.push_back(frame);
        drop(state);
        self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Change the queue bound. Applies to later enqueues.
    pub fn set_options(&self, options: PipelineOptions) {
        self.shared.state.lock().options = options;
    }

    pub fn options(&self) -> PipelineOptions {
        self.shared.state.lock().options
    }

    /// Frames waiting, not counting one in flight.
    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().frames.len()
    }

    /// Block until the queue is empty and no frame is in flight, or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.frames.is_empty() || state.busy {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.frames.is_empty() && !state.busy;
            }
        }
        true
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.shared.counters;
        PipelineStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            processed: c.processed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Drop for AsyncFramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>, handler: Arc<dyn FrameHandler>) {
    debug!("sender worker running");
    loop {
        let frame = {
            let mut state = shared.state.lock();
            while state.frames.is_empty() && !state.stop_requested {
                shared.wake.wait(&mut state);
            }
            match state.frames.pop_front() {
                Some(frame) => {
                    state.busy = true;
                    frame
                }
                None => break,
            }
        };

        let sequence = frame.sequence;
        // A panicking handler costs its frame, not the worker.
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(frame))) {
            Ok(Ok(())) => {
                shared.counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(sequence, error = %e, "failed to send queued frame");
            }
            Err(_) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(sequence, "frame handler panicked");
            }
        }

        shared.state.lock().busy = false;
        shared.idle.notify_all();
    }
    debug!("sender worker exiting");
}
