//! This file is the root of the `batchzip` Rust crate.
//!
//! `batchzip` offloads many small, CPU-bound compression jobs onto a fixed pool
//! of worker threads. Jobs submitted in the same burst are packed into one
//! batch, handed to a worker through a shared memory region in a single round
//! trip, and the results are split back out to each caller's future.
//!
//! ```no_run
//! use batchzip::{BatchConfig, CompressionPool};
//!
//! # async fn demo() -> Result<(), batchzip::BatchzipError> {
//! let pool = CompressionPool::create(3, BatchConfig::default())?;
//!
//! let a = pool.submit("a");
//! let b = pool.submit(b"b".to_vec());
//! let compressed = (a.await?, b.await?);
//!
//! pool.destroy();
//! # let _ = compressed;
//! # Ok(())
//! # }
//! ```

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod config;
pub mod error;
pub mod kernels;
pub mod pool;

//==================================================================================
// 2. Public API Re-exports
//==================================================================================
pub use config::{BatchConfig, CodecKind, PoolConfig};
pub use error::BatchzipError;
pub use observability::enable_verbose_logging;
pub use pool::{BatchingHandle, CompressionFuture, CompressionPool, HandleStats};

#[doc(hidden)]
pub use log;
