// In: src/pool/region.rs

//! The memory shared between one `BatchingHandle` and its worker thread.
//!
//! Layout (one region per handle, never shared with other handles):
//!
//! ```text
//!   control words  [opcode | count | len_0 | len_1 | ... | len_{max_batch_count-1}]
//!   input payload  [item_0 bytes][item_1 bytes]...        (max_batch_bytes)
//!   output payload [out_0 bytes][out_1 bytes]...          (max_batch_bytes + worst-case growth)
//! ```
//!
//! Items are packed back to back in submission order with no padding or
//! delimiters. Before dispatch slot `2 + i` holds the input length of item `i`;
//! after completion the worker has overwritten it with the output length.
//!
//! Access discipline: the handle touches the payloads and length slots only
//! while the opcode is `OPCODE_IDLE`; the worker touches them only while it is
//! not. The opcode is stored with `Release` and loaded with `Acquire`, which
//! publishes everything written before the flip to the other side.

use std::cell::UnsafeCell;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::BatchConfig;

//==================================================================================
// 0. Constants
//==================================================================================

/// Opcode: nothing requested, the handle owns the region.
pub const OPCODE_IDLE: u32 = 0;
/// Opcode: compress every item of the batch. Other values are reserved.
pub const OPCODE_COMPRESS: u32 = 1;

const SLOT_OPCODE: usize = 0;
const SLOT_COUNT: usize = 1;
/// Control words preceding the per-item length table.
pub const HEADER_SLOTS: usize = 2;

/// Length slot value written by the worker when an item could not be produced.
pub const FAILED_ITEM: u32 = u32::MAX;

//==================================================================================
// 1. Control Words
//==================================================================================

/// The `max_batch_count + 2` control words: command header plus length table.
#[derive(Debug)]
pub struct ControlWords {
    words: Box<[AtomicU32]>,
}

impl ControlWords {
    pub fn new(max_batch_count: usize) -> Self {
        let words = (0..max_batch_count + HEADER_SLOTS)
            .map(|_| AtomicU32::new(0))
            .collect();
        Self { words }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Maximum number of items the length table can describe.
    pub fn capacity(&self) -> usize {
        self.words.len() - HEADER_SLOTS
    }

    pub fn opcode(&self) -> u32 {
        self.words[SLOT_OPCODE].load(Ordering::Acquire)
    }

    /// Hands the region to the other side; everything written before is published.
    pub fn set_opcode(&self, opcode: u32) {
        self.words[SLOT_OPCODE].store(opcode, Ordering::Release);
    }

    pub fn count(&self) -> usize {
        self.words[SLOT_COUNT].load(Ordering::Relaxed) as usize
    }

    pub fn set_count(&self, count: usize) {
        debug_assert!(count <= self.capacity());
        self.words[SLOT_COUNT].store(count as u32, Ordering::Relaxed);
    }

    /// Raw length slot of item `index` (may be `FAILED_ITEM`).
    pub fn item_len(&self, index: usize) -> u32 {
        self.words[HEADER_SLOTS + index].load(Ordering::Relaxed)
    }

    pub fn set_item_len(&self, index: usize, len: u32) {
        self.words[HEADER_SLOTS + index].store(len, Ordering::Relaxed);
    }
}

//==================================================================================
// 2. Payload
//==================================================================================

/// A fixed-size byte area written by one side at a time.
pub struct Payload {
    cells: Box<[UnsafeCell<u8>]>,
}

// SAFETY: concurrent access is excluded by the opcode handoff described in the
// module docs; every accessor that hands out bytes is `unsafe` and states it.
unsafe impl Sync for Payload {}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload").field("len", &self.len()).finish()
    }
}

impl Payload {
    pub fn new(len: usize) -> Self {
        let cells = (0..len).map(|_| UnsafeCell::new(0u8)).collect();
        Self { cells }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn base(&self) -> *mut u8 {
        // `UnsafeCell<u8>` has the same layout as `u8`.
        self.cells.as_ptr() as *mut u8
    }

    fn check(&self, range: &Range<usize>) {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "payload access {:?} out of bounds (len {})",
            range,
            self.len()
        );
    }

    /// Copies `src` into the payload at `offset`.
    ///
    /// # Safety
    /// The caller must currently own the region (see the module docs).
    pub unsafe fn write_at(&self, offset: usize, src: &[u8]) {
        let range = offset..offset + src.len();
        self.check(&range);
        std::ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(offset), src.len());
    }

    /// Borrows `range` immutably.
    ///
    /// # Safety
    /// The caller must own the region for as long as the slice lives.
    pub unsafe fn slice(&self, range: Range<usize>) -> &[u8] {
        self.check(&range);
        std::slice::from_raw_parts(self.base().add(range.start), range.len())
    }

    /// Borrows `range` mutably.
    ///
    /// # Safety
    /// The caller must own the region for as long as the slice lives, and must
    /// not hold any other borrow overlapping `range`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, range: Range<usize>) -> &mut [u8] {
        self.check(&range);
        std::slice::from_raw_parts_mut(self.base().add(range.start), range.len())
    }
}

//==================================================================================
// 3. The Shared Region
//==================================================================================

/// Control words plus the input and output payloads of one handle.
#[derive(Debug)]
pub struct SharedRegion {
    control: ControlWords,
    input: Payload,
    output: Payload,
    shutdown: AtomicBool,
}

impl SharedRegion {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            control: ControlWords::new(config.max_batch_count),
            input: Payload::new(config.max_batch_bytes),
            output: Payload::new(config.output_capacity()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// A region whose output payload is `output_len` bytes instead of the codec bound.
    #[cfg(test)]
    pub(crate) fn with_output_len(config: &BatchConfig, output_len: usize) -> Self {
        Self {
            output: Payload::new(output_len),
            ..Self::new(config)
        }
    }

    pub fn control(&self) -> &ControlWords {
        &self.control
    }

    pub fn input(&self) -> &Payload {
        &self.input
    }

    pub fn output(&self) -> &Payload {
        &self.output
    }

    pub fn is_idle(&self) -> bool {
        self.control.opcode() == OPCODE_IDLE
    }

    /// Asks the worker to exit at its next check.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Turns a sequence of length slots into contiguous payload ranges.
///
/// Failed items occupy no bytes and yield `None`.
pub fn item_ranges(lens: impl IntoIterator<Item = u32>) -> Vec<Option<Range<usize>>> {
    let mut offset = 0usize;
    lens.into_iter()
        .map(|len| {
            if len == FAILED_ITEM {
                return None;
            }
            let start = offset;
            offset += len as usize;
            Some(start..offset)
        })
        .collect()
}
