// In: src/config.rs

//! The single source of truth for all batchzip pool configuration.
//!
//! `PoolConfig` is created once at the application boundary (e.g. from a JSON
//! file) and the `BatchConfig` inside it is shared read-only by every
//! `BatchingHandle` of a pool through an `Arc<BatchConfig>`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BatchzipError;
use crate::kernels;
use crate::pool::region::{FAILED_ITEM, HEADER_SLOTS};

//==================================================================================
// I. Codec Selection
//==================================================================================

/// The single-item routine a worker runs for the "compress" opcode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "codec", rename_all = "snake_case")]
pub enum CodecKind {
    /// **Default:** gzip members, one per job.
    Gzip {
        #[serde(default = "default_gzip_level")]
        level: u32,
    },

    /// Zstandard frames prefixed with an 8-byte little-endian uncompressed length.
    Zstd {
        #[serde(default = "default_zstd_level")]
        level: i32,
    },
}

impl Default for CodecKind {
    fn default() -> Self {
        CodecKind::Gzip {
            level: default_gzip_level(),
        }
    }
}

fn default_gzip_level() -> u32 {
    6
}

fn default_zstd_level() -> i32 {
    3
}

//==================================================================================
// II. Per-Handle Batching Options
//==================================================================================

/// Options shared by every handle of a pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchConfig {
    /// Maximum number of jobs in one batch. Also fixes the control word array
    /// length at `max_batch_count + 2`.
    #[serde(default = "default_max_batch_count")]
    pub max_batch_count: usize,

    /// Maximum cumulative input bytes in one batch. A single input must be
    /// strictly smaller than this.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,

    /// Upper bound on batches waiting behind the pending one. `None` keeps the
    /// queue unbounded.
    #[serde(default)]
    pub max_queued_batches: Option<usize>,

    #[serde(default)]
    pub codec: CodecKind,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_count: default_max_batch_count(),
            max_batch_bytes: default_max_batch_bytes(),
            max_queued_batches: None,
            codec: CodecKind::default(),
        }
    }
}

fn default_max_batch_count() -> usize {
    512
}

fn default_max_batch_bytes() -> usize {
    1024 * 1024
}

impl BatchConfig {
    /// Builder-style helper to override the batch item bound.
    pub fn with_max_batch_count(mut self, max_batch_count: usize) -> Self {
        self.max_batch_count = max_batch_count;
        self
    }

    /// Builder-style helper to override the batch byte bound.
    pub fn with_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    pub fn with_max_queued_batches(mut self, limit: usize) -> Self {
        self.max_queued_batches = Some(limit);
        self
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Number of `u32` words in the control array.
    pub fn control_words(&self) -> usize {
        self.max_batch_count + HEADER_SLOTS
    }

    /// Size of the output payload, reserving worst-case per-item growth.
    pub fn output_capacity(&self) -> usize {
        kernels::output_capacity(&self.codec, self.max_batch_bytes, self.max_batch_count)
    }

    pub fn validate(&self) -> Result<(), BatchzipError> {
        if self.max_batch_count == 0 {
            return Err(BatchzipError::InvalidConfig(
                "max_batch_count must be greater than 0".to_string(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(BatchzipError::InvalidConfig(
                "max_batch_bytes must be greater than 0".to_string(),
            ));
        }
        if self.max_queued_batches == Some(0) {
            return Err(BatchzipError::InvalidConfig(
                "max_queued_batches must be greater than 0 when set".to_string(),
            ));
        }
        // Every length slot, and the item count, must fit below the failure sentinel.
        let limit = FAILED_ITEM as usize;
        if self.max_batch_count >= limit || self.output_capacity() >= limit {
            return Err(BatchzipError::InvalidConfig(format!(
                "batch bounds too large for 32-bit control words (count {}, bytes {})",
                self.max_batch_count, self.max_batch_bytes
            )));
        }
        kernels::validate_level(&self.codec)
    }
}

//==================================================================================
// III. The Unified PoolConfig
//==================================================================================

/// The unified configuration for a `CompressionPool`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    /// Number of handles (and therefore worker threads) in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(flatten)]
    pub batch: BatchConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            batch: BatchConfig::default(),
        }
    }
}

/// One handle per available core, falling back to a single handle.
fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl PoolConfig {
    pub fn new(pool_size: usize, batch: BatchConfig) -> Self {
        Self { pool_size, batch }
    }

    pub fn from_json_str(json: &str) -> Result<Self, BatchzipError> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BatchzipError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), BatchzipError> {
        if self.pool_size == 0 {
            return Err(BatchzipError::InvalidConfig(
                "pool size must be a positive integer".to_string(),
            ));
        }
        self.batch.validate()
    }
}

//==================================================================================
// IV. Unit Tests
//==================================================================================
