// In: src/error.rs

//! This module defines the single, unified error type for the entire batchzip library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchzipError {
    // =========================================================================
    // === Submission Errors (synchronous, never touch the shared region)
    // =========================================================================
    /// The input can never fit in a single batch. Raise `max_batch_bytes`.
    #[error("Input does not fit in buffer: {len} bytes, limit is below {limit}. Increase max_batch_bytes")]
    InputTooLarge { len: usize, limit: usize },

    /// The handle (or the pool owning it) was destroyed before the job completed.
    #[error("Worker is destroyed")]
    Destroyed,

    /// Opening another batch would exceed the configured queue bound.
    #[error("Batch queue is full: {queued} batches queued, limit is {limit}")]
    QueueFull { queued: usize, limit: usize },

    // =========================================================================
    // === Worker-Side Errors
    // =========================================================================
    /// The worker could not compress this item. The rest of its batch is unaffected.
    #[error("Compression failed for item {index} of its batch")]
    ItemFailed { index: usize },

    // =========================================================================
    // === Setup Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime is running; pools must be created inside one")]
    NoRuntime,

    // =========================================================================
    // === Kernel Errors
    // =========================================================================
    #[error("Gzip operation failed: {0}")]
    GzipError(String),

    #[error("Zstd operation failed: {0}")]
    ZstdError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the underlying I/O subsystem (e.g. spawning a worker thread).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while loading a `PoolConfig`.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),
}

impl BatchzipError {
    /// True for errors raised because a handle was torn down.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, BatchzipError::Destroyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_error_message_mentions_the_knob() {
        let err = BatchzipError::InputTooLarge {
            len: 2048,
            limit: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("max_batch_bytes"));
    }

    #[test]
    fn test_io_error_converts_with_question_mark() {
        fn fails() -> Result<(), BatchzipError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, BatchzipError::Io(_)));
        assert!(!err.is_destroyed());
    }
}
