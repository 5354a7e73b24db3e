// In: src/pool/worker.rs

//! The loop each worker thread runs for the lifetime of its handle.
//!
//! 1. Park until the opcode becomes nonzero (or shutdown is requested).
//! 2. For items `0..count` in order: slice the input at the running input
//!    offset, compress it straight into the output payload at the running
//!    output offset, and overwrite the item's length slot with the output length.
//! 3. Reset the opcode to idle and send the done signal to the handle.
//! 4. Go back to 1.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::UnboundedSender;

use crate::config::CodecKind;
use crate::error::BatchzipError;
use crate::kernels;
use crate::pool::region::{SharedRegion, FAILED_ITEM, OPCODE_COMPRESS, OPCODE_IDLE};

pub struct WorkerLoop {
    handle_id: usize,
    region: Arc<SharedRegion>,
    codec: CodecKind,
    done: UnboundedSender<()>,
}

impl WorkerLoop {
    pub fn new(
        handle_id: usize,
        region: Arc<SharedRegion>,
        codec: CodecKind,
        done: UnboundedSender<()>,
    ) -> Self {
        Self {
            handle_id,
            region,
            codec,
            done,
        }
    }

    /// Starts the loop on its own named thread.
    pub fn spawn(self) -> Result<JoinHandle<()>, BatchzipError> {
        let name = format!("batchzip-worker-{}", self.handle_id);
        let join = thread::Builder::new().name(name).spawn(move || self.run())?;
        Ok(join)
    }

    pub fn run(self) {
        log::debug!("worker {} online", self.handle_id);

        while let Some(opcode) = self.wait_for_work() {
            let finished = match opcode {
                OPCODE_COMPRESS => self.compress_batch(),
                other => self.fail_batch(other),
            };
            if !finished {
                break;
            }

            self.region.control().set_opcode(OPCODE_IDLE);
            if self.done.send(()).is_err() {
                // The handle's listener is gone; nobody will hand us more work.
                break;
            }
        }

        log::debug!("worker {} exiting", self.handle_id);
    }

    /// Blocks the thread until work is requested. `None` means shut down.
    fn wait_for_work(&self) -> Option<u32> {
        loop {
            if self.region.is_shutdown() {
                return None;
            }
            let opcode = self.region.control().opcode();
            if opcode != OPCODE_IDLE {
                return Some(opcode);
            }
            // An unpark issued between the load and here leaves a token, so no wakeup is lost.
            thread::park();
        }
    }

    /// Returns `false` if the batch was abandoned because of shutdown.
    fn compress_batch(&self) -> bool {
        let control = self.region.control();
        let input = self.region.input();
        let output = self.region.output();
        let count = control.count();

        let mut in_offset = 0usize;
        let mut out_offset = 0usize;

        for index in 0..count {
            if self.region.is_shutdown() {
                return false;
            }

            let in_len = control.item_len(index) as usize;

            // SAFETY: the opcode is nonzero, so the handle does not touch the
            // region until we reset it. The two borrows are in different payloads.
            let (chunk, out) = unsafe {
                (
                    input.slice(in_offset..in_offset + in_len),
                    output.slice_mut(out_offset..output.len()),
                )
            };
            in_offset += in_len;

            match kernels::compress_into(&self.codec, chunk, out) {
                Ok(written) => {
                    control.set_item_len(index, written as u32);
                    out_offset += written;
                }
                Err(e) => {
                    log::warn!(
                        "worker {}: item {} of {} failed: {}",
                        self.handle_id,
                        index,
                        count,
                        e
                    );
                    control.set_item_len(index, FAILED_ITEM);
                }
            }
        }

        log_metric!(
            "event" = "batch_compressed",
            "handle" = self.handle_id,
            "items" = count,
            "in_bytes" = in_offset,
            "out_bytes" = out_offset
        );
        true
    }

    /// Reserved opcodes have no defined behavior; fail every item so the handle recovers.
    fn fail_batch(&self, opcode: u32) -> bool {
        let control = self.region.control();
        log::warn!(
            "worker {}: unknown opcode {}, failing {} items",
            self.handle_id,
            opcode,
            control.count()
        );
        for index in 0..control.count() {
            control.set_item_len(index, FAILED_ITEM);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::pool::region::item_ranges;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Drives one worker by hand, playing the role of the handle.
    fn load_batch(region: &SharedRegion, items: &[&[u8]], opcode: u32) {
        let mut offset = 0;
        for (i, item) in items.iter().enumerate() {
            unsafe { region.input().write_at(offset, item) };
            region.control().set_item_len(i, item.len() as u32);
            offset += item.len();
        }
        region.control().set_count(items.len());
        region.control().set_opcode(opcode);
    }

    fn start(config: &BatchConfig) -> (Arc<SharedRegion>, JoinHandle<()>, mpsc::UnboundedReceiver<()>) {
        let region = Arc::new(SharedRegion::new(config));
        let (tx, rx) = mpsc::unbounded_channel();
        let join = WorkerLoop::new(0, region.clone(), config.codec, tx)
            .spawn()
            .unwrap();
        (region, join, rx)
    }

    #[tokio::test]
    async fn test_worker_compresses_batch_in_order() {
        // 1. Arrange
        let config = BatchConfig::default()
            .with_max_batch_count(4)
            .with_max_batch_bytes(1024);
        let (region, join, mut done) = start(&config);
        let items: [&[u8]; 3] = [b"first item", b"", b"third item third item"];

        // 2. Act
        load_batch(&region, &items, OPCODE_COMPRESS);
        join.thread().unpark();
        tokio::time::timeout(Duration::from_secs(5), done.recv())
            .await
            .unwrap()
            .unwrap();

        // 3. Assert
        assert!(region.is_idle());
        let lens = (0..3).map(|i| region.control().item_len(i));
        for (range, original) in item_ranges(lens).into_iter().zip(items) {
            let bytes = unsafe { region.output().slice(range.unwrap()) };
            assert_eq!(kernels::decompress(&config.codec, bytes).unwrap(), original);
        }

        region.request_shutdown();
        join.thread().unpark();
        join.join().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_opcode_fails_every_item() {
        let config = BatchConfig::default().with_max_batch_count(2);
        let (region, join, mut done) = start(&config);

        load_batch(&region, &[b"a".as_slice(), b"b".as_slice()], 7);
        join.thread().unpark();
        done.recv().await.unwrap();

        assert_eq!(region.control().item_len(0), FAILED_ITEM);
        assert_eq!(region.control().item_len(1), FAILED_ITEM);
        assert!(region.is_idle());

        region.request_shutdown();
        join.thread().unpark();
        join.join().unwrap();
    }

    #[test]
    fn test_shutdown_stops_a_parked_worker() {
        let config = BatchConfig::default().with_max_batch_count(1);
        let (region, join, _done) = start(&config);

        region.request_shutdown();
        join.thread().unpark();
        join.join().unwrap();
    }
}
