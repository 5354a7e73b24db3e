// In: src/pool/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Batching Pool
// ====================================================================================
//
// Data flow for one job:
//
//   1. [CompressionPool::submit]        -> picks the next handle, round robin
//         |
//   2. [BatchingHandle::submit]         -> appends the job to the open batch and,
//         |                                if none is scheduled, schedules one flush
//         |                                for the runtime's next turn
//         |
//   3. [flush]                          -> copies the oldest batch into the input
//         |                                payload, writes lengths, opcode = 1, unpark
//         |
//   4. [WorkerLoop] (own thread)        -> compresses each item into the output
//         |                                payload, rewrites lengths, opcode = 0,
//         |                                sends the done signal
//         |
//   5. [done listener] (tokio task)     -> slices the output per item, resolves each
//                                          job's future in order, flushes the next batch
//
// Only one batch per handle is ever in the region, and the region belongs to
// exactly one handle and its worker, so no locks are shared across handles.
//
// ====================================================================================

pub mod dispatch;
pub mod handle;
pub mod job;
pub mod region;
pub mod worker;

pub use dispatch::CompressionPool;
pub use handle::{BatchingHandle, HandleStats};
pub use job::CompressionFuture;
