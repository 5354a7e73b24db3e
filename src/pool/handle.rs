// In: src/pool/handle.rs

//! The `BatchingHandle`: one worker thread, one shared region, and the state
//! machine that feeds the region with batches and turns finished batches back
//! into per-job completions.
//!
//! Handle state at any moment:
//! - at most one batch *pending* (in the region, or finished but not yet demultiplexed),
//! - zero or more batches *queued* behind it; the last queued batch is the
//!   *open* one that new jobs are appended to while it has room.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::config::BatchConfig;
use crate::error::BatchzipError;
use crate::pool::job::{CompressionFuture, Job};
use crate::pool::region::{item_ranges, SharedRegion, OPCODE_COMPRESS};
use crate::pool::worker::WorkerLoop;

//==================================================================================
// 1. Stats
//==================================================================================

/// Running counters for one handle.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    /// Jobs accepted into a batch.
    pub jobs_submitted: u64,
    /// Jobs resolved with compressed bytes.
    pub jobs_completed: u64,
    /// Jobs the worker could not compress.
    pub jobs_failed: u64,
    /// Jobs turned away as queue-full or destroyed (at submit or by `destroy`).
    /// Oversized input is refused before it reaches the handle's counters.
    pub jobs_rejected: u64,
    /// Batches handed to the worker.
    pub batches_dispatched: u64,
    /// Item count of the largest batch dispatched so far.
    pub largest_batch: usize,
}

impl HandleStats {
    pub fn absorb(&mut self, other: &HandleStats) {
        self.jobs_submitted += other.jobs_submitted;
        self.jobs_completed += other.jobs_completed;
        self.jobs_failed += other.jobs_failed;
        self.jobs_rejected += other.jobs_rejected;
        self.batches_dispatched += other.batches_dispatched;
        self.largest_batch = self.largest_batch.max(other.largest_batch);
    }
}

//==================================================================================
// 2. Internal State
//==================================================================================

#[derive(Default)]
struct HandleState {
    destroyed: bool,
    pending: Option<Vec<Job>>,
    batches: VecDeque<Vec<Job>>,
    /// Room left in the open batch. Both zero means no batch is open.
    free_space: usize,
    free_entries: usize,
    /// A flush is scheduled, or a batch is pending (which triggers the next flush itself).
    run_queued: bool,
    worker: Option<JoinHandle<()>>,
    stats: HandleStats,
}

struct HandleInner {
    id: usize,
    config: Arc<BatchConfig>,
    region: Arc<SharedRegion>,
    runtime: tokio::runtime::Handle,
    state: Mutex<HandleState>,
    /// Liveness reference on the worker: `true` while any batch is queued or pending.
    keep_alive: watch::Sender<bool>,
}

//==================================================================================
// 3. Public Handle
//==================================================================================

/// Owner of one worker thread and its shared region.
///
/// Dropping the handle destroys it.
pub struct BatchingHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for BatchingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingHandle")
            .field("id", &self.inner.id)
            .field("queued", &self.queued())
            .field("pending", &self.is_pending())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl BatchingHandle {
    /// Allocates the region, starts the worker thread, and attaches the
    /// completion listener to the current tokio runtime.
    pub fn create(id: usize, config: Arc<BatchConfig>) -> Result<Self, BatchzipError> {
        config.validate()?;
        let region = Arc::new(SharedRegion::new(&config));
        Self::start(id, config, region)
    }

    #[cfg(test)]
    pub(crate) fn create_with_region(
        id: usize,
        config: Arc<BatchConfig>,
        region: SharedRegion,
    ) -> Result<Self, BatchzipError> {
        Self::start(id, config, Arc::new(region))
    }

    fn start(
        id: usize,
        config: Arc<BatchConfig>,
        region: Arc<SharedRegion>,
    ) -> Result<Self, BatchzipError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BatchzipError::NoRuntime)?;

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let worker = WorkerLoop::new(id, Arc::clone(&region), config.codec, done_tx).spawn()?;

        let (keep_alive, _) = watch::channel(false);
        let inner = Arc::new(HandleInner {
            id,
            config,
            region,
            runtime,
            state: Mutex::new(HandleState {
                worker: Some(worker),
                ..HandleState::default()
            }),
            keep_alive,
        });

        inner
            .runtime
            .spawn(listen_for_done(Arc::downgrade(&inner), done_rx));

        log::debug!(
            "handle {} created (region: {} control words, {} input bytes, {} output bytes)",
            id,
            inner.region.control().len(),
            inner.region.input().len(),
            inner.region.output().len()
        );
        Ok(Self { inner })
    }

    /// Queues `input` for compression and returns a future for its result.
    ///
    /// Oversized input, a destroyed handle, and a full queue are reported
    /// through an already-failed future without touching the region.
    pub fn submit(&self, input: impl AsRef<[u8]>) -> CompressionFuture {
        HandleInner::submit(&self.inner, input.as_ref())
    }

    /// Rejects all outstanding jobs and stops the worker. Idempotent.
    ///
    /// Blocks for at most the item the worker is currently compressing.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Resolves once no batch is queued or pending (or the handle is destroyed).
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.keep_alive.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot fail.
        let _ = rx.wait_for(|referenced| !*referenced).await;
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Jobs accumulated in queued batches, not yet sent to the worker.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().batches.iter().map(Vec::len).sum()
    }

    pub fn queued_batches(&self) -> usize {
        self.inner.state.lock().batches.len()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Whether the handle currently holds its liveness reference.
    pub fn is_referenced(&self) -> bool {
        *self.inner.keep_alive.borrow()
    }

    pub fn is_worker_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .worker
            .as_ref()
            .map_or(false, |worker| !worker.is_finished())
    }

    pub fn stats(&self) -> HandleStats {
        self.inner.state.lock().stats
    }

    #[cfg(test)]
    pub(crate) fn region(&self) -> &SharedRegion {
        &self.inner.region
    }
}

impl Drop for BatchingHandle {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

//==================================================================================
// 4. Protocol
//==================================================================================

impl HandleInner {
    fn submit(self: &Arc<Self>, input: &[u8]) -> CompressionFuture {
        let len = input.len();
        if len >= self.config.max_batch_bytes {
            return CompressionFuture::failed(BatchzipError::InputTooLarge {
                len,
                limit: self.config.max_batch_bytes,
            });
        }

        let mut state = self.state.lock();
        if state.destroyed {
            state.stats.jobs_rejected += 1;
            return CompressionFuture::failed(BatchzipError::Destroyed);
        }

        if state.free_space < len || state.free_entries == 0 {
            if let Some(limit) = self.config.max_queued_batches {
                if state.batches.len() >= limit {
                    state.stats.jobs_rejected += 1;
                    return CompressionFuture::failed(BatchzipError::QueueFull {
                        queued: state.batches.len(),
                        limit,
                    });
                }
            }
            state.free_entries = self.config.max_batch_count;
            state.free_space = self.config.max_batch_bytes;
            state.batches.push_back(Vec::new());
            self.acquire_keep_alive();
        }

        let (job, future) = Job::new(input.to_vec());
        // A batch was just ensured above, so the open batch always exists here.
        if let Some(open) = state.batches.back_mut() {
            open.push(job);
        }
        state.free_space -= len;
        state.free_entries -= 1;
        state.stats.jobs_submitted += 1;

        if !state.run_queued {
            state.run_queued = true;
            self.schedule_flush();
        }
        future
    }

    /// Flushes on the runtime's next turn, so the rest of the caller's burst
    /// lands in the same batch.
    fn schedule_flush(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::task::yield_now().await;
            inner.run();
        });
    }

    fn run(&self) {
        let mut state = self.state.lock();
        self.flush_locked(&mut state);
    }

    /// Moves the oldest queued batch into the region and wakes the worker.
    fn flush_locked(&self, state: &mut HandleState) {
        if state.destroyed || state.pending.is_some() {
            return;
        }
        let Some(mut batch) = state.batches.pop_front() else {
            state.run_queued = false;
            return;
        };

        // Force the next submit to open a fresh batch.
        state.free_space = 0;
        state.free_entries = 0;

        let control = self.region.control();
        let mut offset = 0usize;
        for (index, job) in batch.iter_mut().enumerate() {
            let len = job.input_len();
            // SAFETY: no batch is pending, so the opcode is idle and the worker
            // is parked; this side owns the region.
            unsafe { self.region.input().write_at(offset, job.input()) };
            control.set_item_len(index, len as u32);
            offset += len;
            job.release_input();
        }
        control.set_count(batch.len());

        state.stats.batches_dispatched += 1;
        state.stats.largest_batch = state.stats.largest_batch.max(batch.len());
        log::debug!(
            "handle {}: dispatching batch of {} items ({} bytes), {} batches still queued",
            self.id,
            batch.len(),
            offset,
            state.batches.len()
        );
        log_metric!(
            "event" = "batch_dispatched",
            "handle" = self.id,
            "items" = batch.len(),
            "bytes" = offset
        );

        state.pending = Some(batch);
        control.set_opcode(OPCODE_COMPRESS);
        if let Some(worker) = &state.worker {
            worker.thread().unpark();
        }
    }

    /// Runs when the worker reports the pending batch finished.
    fn on_batch_done(&self) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        let Some(batch) = state.pending.take() else {
            log::warn!("handle {}: done signal with no pending batch", self.id);
            return;
        };
        if !self.region.is_idle() {
            log::error!(
                "handle {}: done signal while the worker still owns the region",
                self.id
            );
            state.pending = Some(batch);
            return;
        }

        let control = self.region.control();
        let ranges = item_ranges((0..batch.len()).map(|index| control.item_len(index)));

        for (index, (job, range)) in batch.into_iter().zip(ranges).enumerate() {
            match range {
                Some(range) => {
                    // SAFETY: the opcode is idle again, so the worker has let go of the region.
                    let bytes = unsafe { self.region.output().slice(range) }.to_vec();
                    job.resolve(bytes);
                    state.stats.jobs_completed += 1;
                }
                None => {
                    job.reject(BatchzipError::ItemFailed { index });
                    state.stats.jobs_failed += 1;
                }
            }
        }

        state.run_queued = false;
        if !state.batches.is_empty() {
            state.run_queued = true;
            self.flush_locked(&mut state);
        } else {
            self.release_keep_alive();
        }
    }

    fn destroy(&self) {
        let (pending, batches, worker) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.run_queued = false;
            state.free_space = 0;
            state.free_entries = 0;
            (
                state.pending.take(),
                std::mem::take(&mut state.batches),
                state.worker.take(),
            )
        };

        self.region.request_shutdown();
        if let Some(worker) = worker {
            worker.thread().unpark();
            if worker.join().is_err() {
                log::error!("handle {}: worker thread panicked", self.id);
            }
        }

        let mut rejected = 0u64;
        for job in pending.into_iter().flatten().chain(batches.into_iter().flatten()) {
            job.reject(BatchzipError::Destroyed);
            rejected += 1;
        }
        self.state.lock().stats.jobs_rejected += rejected;
        self.release_keep_alive();

        log::info!("handle {} destroyed, {} jobs rejected", self.id, rejected);
    }

    fn acquire_keep_alive(&self) {
        if !self.keep_alive.send_replace(true) {
            log::trace!("handle {}: worker referenced", self.id);
        }
    }

    fn release_keep_alive(&self) {
        if self.keep_alive.send_replace(false) {
            log::trace!("handle {}: idle, worker unreferenced", self.id);
        }
    }
}

/// Demultiplexes every done signal the worker sends. Ends with the worker.
async fn listen_for_done(inner: Weak<HandleInner>, mut done: mpsc::UnboundedReceiver<()>) {
    while done.recv().await.is_some() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.on_batch_done();
    }
}
