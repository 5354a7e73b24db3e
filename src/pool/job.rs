// In: src/pool/job.rs

//! A single submitted job and the future its caller awaits.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::BatchzipError;

pub type JobResult = Result<Vec<u8>, BatchzipError>;

/// Input bytes plus the one-shot completion for their caller.
///
/// `resolve` and `reject` consume the job, so a completion can fire at most once.
#[derive(Debug)]
pub struct Job {
    input: Vec<u8>,
    completion: oneshot::Sender<JobResult>,
}

impl Job {
    /// Creates the job and the future that observes it.
    pub fn new(input: Vec<u8>) -> (Self, CompressionFuture) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                input,
                completion: tx,
            },
            CompressionFuture::waiting(rx),
        )
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    /// Drops the input once it has been copied into the shared region.
    pub fn release_input(&mut self) {
        self.input = Vec::new();
    }

    pub fn resolve(self, output: Vec<u8>) {
        // A dropped future means the caller stopped listening; nothing to do.
        let _ = self.completion.send(Ok(output));
    }

    pub fn reject(self, err: BatchzipError) {
        let _ = self.completion.send(Err(err));
    }
}

//==================================================================================
// The Caller-Facing Future
//==================================================================================

#[derive(Debug)]
enum FutureState {
    Ready(Option<JobResult>),
    Waiting(oneshot::Receiver<JobResult>),
}

/// Resolves with the compressed bytes of one job, or its error.
///
/// Validation failures are reported through an already-completed future so
/// that every `submit` has the same shape.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct CompressionFuture {
    state: FutureState,
}

impl CompressionFuture {
    fn waiting(rx: oneshot::Receiver<JobResult>) -> Self {
        Self {
            state: FutureState::Waiting(rx),
        }
    }

    pub fn failed(err: BatchzipError) -> Self {
        Self {
            state: FutureState::Ready(Some(Err(err))),
        }
    }
}

impl Future for CompressionFuture {
    type Output = JobResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            FutureState::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(BatchzipError::InternalError(
                    "CompressionFuture polled after completion".to_string(),
                ))
            })),
            // A sender dropped without a value only happens when the handle is torn down.
            FutureState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(BatchzipError::Destroyed))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_reaches_the_future() {
        let (job, fut) = Job::new(b"payload".to_vec());
        assert_eq!(job.input(), b"payload");
        job.resolve(vec![1, 2, 3]);
        assert_eq!(fut.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dropped_job_reads_as_destroyed() {
        let (job, fut) = Job::new(vec![0; 4]);
        drop(job);
        assert!(fut.await.unwrap_err().is_destroyed());
    }

    #[tokio::test]
    async fn test_failed_future_is_immediately_ready() {
        let fut = CompressionFuture::failed(BatchzipError::Destroyed);
        assert!(fut.await.unwrap_err().is_destroyed());
    }

    #[test]
    fn test_release_input_keeps_completion() {
        let (mut job, _fut) = Job::new(vec![9; 32]);
        assert_eq!(job.input_len(), 32);
        job.release_input();
        assert_eq!(job.input_len(), 0);
    }
}
