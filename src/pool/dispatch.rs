// In: src/pool/dispatch.rs

//! `CompressionPool`: a fixed, ordered set of handles fed round robin.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{BatchConfig, PoolConfig};
use crate::error::BatchzipError;
use crate::pool::handle::{BatchingHandle, HandleStats};
use crate::pool::job::CompressionFuture;

/// Round-robin dispatcher over `size` batching handles.
///
/// Ordering holds per handle only: jobs routed to the same handle complete in
/// submission order, jobs on different handles in any order.
#[derive(Debug)]
pub struct CompressionPool {
    handles: Vec<BatchingHandle>,
    /// Index of the handle the next job goes to (modulo `handles.len()`).
    cursor: AtomicUsize,
}

impl CompressionPool {
    /// Builds `size` handles sharing `options`. Must be called inside a tokio runtime.
    pub fn create(size: usize, options: BatchConfig) -> Result<Self, BatchzipError> {
        Self::from_config(&PoolConfig::new(size, options))
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, BatchzipError> {
        config.validate()?;
        let options = Arc::new(config.batch.clone());

        let handles = (0..config.pool_size)
            .map(|id| BatchingHandle::create(id, Arc::clone(&options)))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "compression pool started: {} handles, max_batch_count={}, max_batch_bytes={}, codec={:?}",
            handles.len(),
            options.max_batch_count,
            options.max_batch_bytes,
            options.codec
        );
        Ok(Self {
            handles,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Routes `input` to the next handle in cyclic order.
    pub fn submit(&self, input: impl AsRef<[u8]>) -> CompressionFuture {
        self.next_handle().submit(input)
    }

    /// Advances the cursor and returns the handle it pointed at.
    pub fn next_handle(&self) -> &BatchingHandle {
        let tick = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.handles[tick % self.handles.len()]
    }

    /// Destroys every handle. Idempotent.
    pub fn destroy(&self) {
        for handle in &self.handles {
            handle.destroy();
        }
    }

    /// Resolves once every handle is idle.
    pub async fn wait_idle(&self) {
        for handle in &self.handles {
            handle.wait_idle().await;
        }
    }

    pub fn handles(&self) -> &[BatchingHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Jobs accumulated but not yet sent, across all handles.
    pub fn queued(&self) -> usize {
        self.handles.iter().map(BatchingHandle::queued).sum()
    }

    pub fn is_destroyed(&self) -> bool {
        self.handles.iter().all(BatchingHandle::is_destroyed)
    }

    pub fn stats(&self) -> HandleStats {
        let mut total = HandleStats::default();
        for handle in &self.handles {
            total.absorb(&handle.stats());
        }
        total
    }
}

impl Drop for CompressionPool {
    fn drop(&mut self) {
        self.destroy();
    }
}
