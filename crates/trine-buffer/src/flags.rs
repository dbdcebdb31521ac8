//! Triple-buffer flag registers: slot rotation without locks.
//!
//! One [`TripleBufferFlags`] register governs one or more triple buffers
//! (a flag group). It hands out exactly one [`FlagWriter`] capability, for
//! the producer, and up to `max_readers` [`FlagReader`]s, one per consumer.
//!
//! # Protocol
//!
//! * `latest` packs the most recently published generation and slot.
//!   Generation 0 means nothing has been published.
//! * Each reader owns a cache-line padded pin cell. A read swap loads
//!   `latest`, pins its slot, and re-validates `latest`; if it moved, the
//!   reader retries. All three operations are `SeqCst`, as is the
//!   producer's publish and pin scan, so a pin is either seen by the
//!   producer or the reader observes the newer `latest` and retries.
//! * A write swap publishes the slot just written, then picks the next
//!   write target among the two other slots, preferring one no reader has
//!   pinned. With a single reader this always succeeds. When several
//!   readers pin both candidates the producer falls back to round-robin:
//!   producer liveness wins and a slow reader may miss one frame.
//! * Each slot carries a seqlock counter, odd while the slot is the write
//!   target. Readers record it at pin time; [`FlagReader::is_intact`]
//!   reports whether a fallback reclaimed the slot during the read.
//!
//! Consumers therefore observe non-decreasing generations, may skip
//! generations, and never observe a half-written frame without
//! `is_intact` reporting it.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use trine_core::Generation;

use crate::error::BufferError;

/// Pin value meaning "this reader holds no slot".
const UNPINNED: u8 = u8::MAX;

/// Upper bound on readers per register.
pub const MAX_READERS: usize = 64;

/// Counter for unique [`FlagsId`] allocation.
static FLAGS_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one flag register (one flag group).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlagsId(u64);

impl fmt::Display for FlagsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flags#{}", self.0)
    }
}

fn pack(generation: u64, slot: usize) -> u64 {
    (generation << 2) | slot as u64
}

fn unpack(latest: u64) -> (u64, usize) {
    (latest >> 2, (latest & 0b11) as usize)
}

/// Per-reader pin, padded to its own cache line.
///
/// 128-byte alignment covers both 64-byte (x86) and 128-byte (Apple
/// M-series) cache line sizes.
#[repr(align(128))]
struct PinCell {
    slot: AtomicU8,
    claimed: AtomicBool,
}

/// Shared control block behind every handle of one register.
pub(crate) struct SlotControl {
    id: FlagsId,
    latest: AtomicU64,
    write_index: AtomicU8,
    seq: [AtomicU64; 3],
    pins: Box<[PinCell]>,
    contended_swaps: AtomicU64,
}

impl SlotControl {
    fn is_pinned(&self, slot: usize) -> bool {
        self.pins
            .iter()
            .any(|p| p.slot.load(Ordering::SeqCst) == slot as u8)
    }

    pub(crate) fn id(&self) -> FlagsId {
        self.id
    }
}

/// Shareable handle to a flag register.
///
/// Cloning is cheap. Used to create triple buffers in the group and to
/// register readers.
#[derive(Clone)]
pub struct TripleBufferFlags {
    control: Arc<SlotControl>,
}

// Compile-time assertion: the register handle must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<TripleBufferFlags>();
};

impl TripleBufferFlags {
    /// Create a register and its single writer capability.
    ///
    /// `max_readers` is clamped to `[1, MAX_READERS]`.
    pub fn new(max_readers: usize) -> (Self, FlagWriter) {
        let readers = max_readers.clamp(1, MAX_READERS);
        let pins = (0..readers)
            .map(|_| PinCell {
                slot: AtomicU8::new(UNPINNED),
                claimed: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let control = Arc::new(SlotControl {
            id: FlagsId(FLAGS_COUNTER.fetch_add(1, Ordering::Relaxed)),
            latest: AtomicU64::new(0),
            write_index: AtomicU8::new(0),
            // Slot 0 starts as the write target, hence odd.
            seq: [AtomicU64::new(1), AtomicU64::new(0), AtomicU64::new(0)],
            pins,
            contended_swaps: AtomicU64::new(0),
        });
        let writer = FlagWriter {
            control: Arc::clone(&control),
            write_index: 0,
            generation: 0,
            _not_sync: PhantomData,
        };
        (Self { control }, writer)
    }

    /// Register id.
    pub fn id(&self) -> FlagsId {
        self.control.id
    }

    /// Claim a reader slot for one consumer.
    pub fn reader(&self) -> Result<FlagReader, BufferError> {
        let cell = self
            .control
            .pins
            .iter()
            .position(|p| {
                p.claimed
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            })
            .ok_or(BufferError::ReaderCapacity {
                max_readers: self.control.pins.len(),
            })?;
        Ok(FlagReader {
            control: Arc::clone(&self.control),
            cell,
            slot: None,
            seq_at_pin: 0,
            generation: 0,
            _not_sync: PhantomData,
        })
    }

    /// Configured reader capacity.
    pub fn max_readers(&self) -> usize {
        self.control.pins.len()
    }

    /// Most recently published generation (0 before the first publish).
    pub fn latest_generation(&self) -> Generation {
        Generation(unpack(self.control.latest.load(Ordering::Acquire)).0)
    }

    /// Current write target, as last published by the writer.
    pub fn write_index(&self) -> usize {
        self.control.write_index.load(Ordering::Relaxed) as usize
    }

    /// Number of write swaps that found both candidate slots pinned.
    pub fn contended_swaps(&self) -> u64 {
        self.control.contended_swaps.load(Ordering::Relaxed)
    }

    pub(crate) fn control(&self) -> &Arc<SlotControl> {
        &self.control
    }
}

impl fmt::Debug for TripleBufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TripleBufferFlags")
            .field("id", &self.control.id)
            .field("latest", &self.latest_generation())
            .field("max_readers", &self.max_readers())
            .finish()
    }
}

/// Result of a write swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Generation just published.
    pub published: Generation,
    /// Slot that now holds the published frame.
    pub slot: usize,
    /// Slot the producer writes next.
    pub next_write: usize,
    /// `true` if both candidates were pinned and round-robin was used.
    pub contended: bool,
}

/// Producer capability of a flag register.
///
/// There is exactly one per register. It is neither `Clone` nor `Sync`,
/// so no two threads can hold it or share a reference to it at once:
///
/// ```compile_fail
/// use trine_buffer::TripleBufferFlags;
/// let (_flags, writer) = TripleBufferFlags::new(1);
/// let second = writer.clone();
/// ```
///
/// ```compile_fail
/// use trine_buffer::TripleBufferFlags;
/// let (_flags, writer) = TripleBufferFlags::new(1);
/// let writer = &writer;
/// std::thread::scope(|s| {
///     s.spawn(move || writer.write_index());
///     s.spawn(move || writer.write_index());
/// });
/// ```
///
/// It is `Send`, so it can be moved to the producing thread:
///
/// ```
/// use trine_buffer::TripleBufferFlags;
/// let (_flags, mut writer) = TripleBufferFlags::new(1);
/// std::thread::spawn(move || writer.swap_write_buffer_flags())
///     .join()
///     .unwrap();
/// ```
pub struct FlagWriter {
    control: Arc<SlotControl>,
    write_index: usize,
    generation: u64,
    _not_sync: PhantomData<Cell<()>>,
}

impl FlagWriter {
    /// Register this writer belongs to.
    pub fn id(&self) -> FlagsId {
        self.control.id
    }

    /// Slot currently targeted by writes.
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Last published generation.
    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    /// Publish the current write slot and advance to the next write target.
    pub fn swap_write_buffer_flags(&mut self) -> SwapOutcome {
        let c = &*self.control;
        let written = self.write_index;

        // Seqlock even: slot content complete.
        c.seq[written].fetch_add(1, Ordering::Release);
        self.generation += 1;
        c.latest
            .store(pack(self.generation, written), Ordering::SeqCst);

        let first = (written + 1) % 3;
        let second = (written + 2) % 3;
        let (next, contended) = if !c.is_pinned(first) {
            (first, false)
        } else if !c.is_pinned(second) {
            (second, false)
        } else {
            (first, true)
        };
        if contended {
            c.contended_swaps.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                flags = %c.id,
                generation = self.generation,
                slot = next,
                "all candidate slots pinned, reclaiming round-robin"
            );
        }

        // Seqlock odd before any byte of the new frame is written.
        c.seq[next].fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);
        c.write_index.store(next as u8, Ordering::Relaxed);
        self.write_index = next;

        SwapOutcome {
            published: Generation(self.generation),
            slot: written,
            next_write: next,
            contended,
        }
    }

    pub(crate) fn control(&self) -> &Arc<SlotControl> {
        &self.control
    }
}

impl fmt::Debug for FlagWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagWriter")
            .field("id", &self.control.id)
            .field("write_index", &self.write_index)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Outcome of a read swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadSwap {
    /// The producer has not published anything yet.
    NothingPublished,
    /// No newer frame since this reader's last swap.
    Unchanged(Generation),
    /// A newer frame is now pinned.
    Advanced {
        /// Generation now visible.
        generation: Generation,
        /// Generations published since the last swap that this reader
        /// never observed.
        skipped: u64,
    },
}

impl ReadSwap {
    /// Generation visible after the swap, if any.
    pub fn generation(&self) -> Option<Generation> {
        match *self {
            Self::NothingPublished => None,
            Self::Unchanged(g) => Some(g),
            Self::Advanced { generation, .. } => Some(generation),
        }
    }

    /// `true` if the swap moved to a newer frame.
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Advanced { .. })
    }
}

/// Consumer handle of a flag register.
///
/// Each consumer owns one; it remembers the last generation this consumer
/// observed so consumers reading at different rates never interfere.
/// Dropping it releases the pin and frees the reader slot.
pub struct FlagReader {
    control: Arc<SlotControl>,
    cell: usize,
    slot: Option<usize>,
    seq_at_pin: u64,
    generation: u64,
    _not_sync: PhantomData<Cell<()>>,
}

impl FlagReader {
    /// Register this reader belongs to.
    pub fn id(&self) -> FlagsId {
        self.control.id
    }

    /// Pin the most recently published slot.
    pub fn swap_read_buffer_flags(&mut self) -> ReadSwap {
        let c = &*self.control;
        let pin = &c.pins[self.cell].slot;
        loop {
            let latest = c.latest.load(Ordering::SeqCst);
            let (generation, slot) = unpack(latest);
            if generation == 0 {
                return ReadSwap::NothingPublished;
            }
            pin.store(slot as u8, Ordering::SeqCst);
            if c.latest.load(Ordering::SeqCst) != latest {
                std::hint::spin_loop();
                continue;
            }
            let seq = c.seq[slot].load(Ordering::Acquire);
            if seq & 1 == 1 {
                // Reclaimed by a contended swap before we got here.
                std::hint::spin_loop();
                continue;
            }
            self.slot = Some(slot);
            self.seq_at_pin = seq;
            let previous = self.generation;
            self.generation = generation;
            return if generation == previous {
                ReadSwap::Unchanged(Generation(generation))
            } else {
                ReadSwap::Advanced {
                    generation: Generation(generation),
                    skipped: generation - previous - 1,
                }
            };
        }
    }

    /// Slot pinned by the last read swap.
    pub fn read_index(&self) -> Option<usize> {
        self.slot
    }

    /// Generation pinned by the last read swap.
    pub fn generation(&self) -> Option<Generation> {
        self.slot.map(|_| Generation(self.generation))
    }

    /// `true` if the pinned slot has not been reclaimed since the swap.
    ///
    /// Call after reading; a `true` result means every byte read since the
    /// swap belongs to the pinned generation.
    pub fn is_intact(&self) -> bool {
        let Some(slot) = self.slot else {
            return false;
        };
        fence(Ordering::Acquire);
        self.control.seq[slot].load(Ordering::Relaxed) == self.seq_at_pin
    }

    /// Drop the pin without releasing the reader slot.
    pub fn release(&mut self) {
        self.control.pins[self.cell]
            .slot
            .store(UNPINNED, Ordering::SeqCst);
        self.slot = None;
    }

    pub(crate) fn control(&self) -> &Arc<SlotControl> {
        &self.control
    }
}

impl Drop for FlagReader {
    fn drop(&mut self) {
        let cell = &self.control.pins[self.cell];
        cell.slot.store(UNPINNED, Ordering::SeqCst);
        cell.claimed.store(false, Ordering::Release);
    }
}

impl fmt::Debug for FlagReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlagReader")
            .field("id", &self.control.id)
            .field("cell", &self.cell)
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish()
    }
}
