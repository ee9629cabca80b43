//! Load and store queue entries and the slot allocator.
//!
//! Slots are handed out at the tail in program order, so a walk in index
//! order is a walk in age order within an allocation generation. Age
//! comparisons themselves never use slot positions; they use the
//! instruction's `unique_id`, which survives queue drains.

use crate::common::addr::{PhysAddr, VirtAddr};
use crate::common::constants::MBOX_QUEUE_LEN;
use crate::insn::InstrHandle;

/// Lifecycle state of a load queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LqState {
    /// Slot free.
    #[default]
    NotInUse,
    /// Slot reserved by the allocator, payload not yet published.
    Assigned,
    /// Published; the scheduler has not touched it yet.
    Initial,
    /// Translated and waiting on forwarding, a fill, or an I/O read.
    ReadPending,
    /// Result materialized; finalized in the same scheduler pass.
    Complete,
}

/// Lifecycle state of a store queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SqState {
    /// Slot free.
    #[default]
    NotInUse,
    /// Slot reserved by the allocator, payload not yet published.
    Assigned,
    /// Published; the scheduler has not touched it yet.
    Initial,
    /// Translated, waiting for the owning instruction to retire.
    WritePending,
    /// Retired; eligible to commit to the Dcache.
    Ready,
    /// Committed; finalized in the same scheduler pass.
    Complete,
}

/// A load queue entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct LqEntry {
    /// Lifecycle state.
    pub state: LqState,
    /// Virtual address of the load.
    pub virt: VirtAddr,
    /// Physical address, present from translation onwards.
    pub phys: Option<PhysAddr>,
    /// Access width in bytes.
    pub len: usize,
    /// Scratch: a forwarded value parked while a load-locked entry waits
    /// for its line so the lock can be registered.
    pub value: u64,
    /// Scratch valid bit for `value`.
    pub forwarded: bool,
    /// Owning instruction.
    pub instr: Option<InstrHandle>,
    /// Program-order tag of the owning instruction, cached at publish.
    pub unique_id: u64,
    /// Physical address falls in the MMIO region.
    pub io_flag: bool,
    /// Load-locked form.
    pub lock_cond: bool,
}

impl LqEntry {
    /// Returns the slot to its reset state.
    pub fn clear(&mut self) {
        *self = LqEntry::default();
    }
}

/// A store queue entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqEntry {
    /// Lifecycle state.
    pub state: SqState,
    /// Virtual address of the store.
    pub virt: VirtAddr,
    /// Physical address, present from translation onwards.
    pub phys: Option<PhysAddr>,
    /// Access width in bytes.
    pub len: usize,
    /// Store data.
    pub value: u64,
    /// Owning instruction.
    pub instr: Option<InstrHandle>,
    /// Program-order tag of the owning instruction, cached at publish.
    pub unique_id: u64,
    /// Physical address falls in the MMIO region.
    pub io_flag: bool,
    /// Store-conditional form.
    pub lock_cond: bool,
    /// Retirement arrived before translation finished; consumed by the
    /// scheduler when it brings the entry to the write-pending step.
    pub retired: bool,
}

impl SqEntry {
    /// Returns the slot to its reset state.
    pub fn clear(&mut self) {
        *self = SqEntry::default();
    }
}

/// Tail-pointer slot allocator for one queue.
///
/// The tail only ever moves forward; when every slot has drained back to
/// not-in-use the tail snaps to zero and a new allocation generation
/// begins. Exhaustion is reported to the caller, which stalls its own
/// issue rather than blocking here.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotAllocator {
    next: usize,
}

impl SlotAllocator {
    /// Creates an allocator at slot zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next slot.
    ///
    /// `queue_drained` is the caller's observation that every slot is free;
    /// it licenses the wholesale tail reset. Returns `None` when the queue
    /// is exhausted.
    pub fn allocate(&mut self, queue_drained: bool) -> Option<usize> {
        if self.next == MBOX_QUEUE_LEN && queue_drained {
            self.next = 0;
        }
        if self.next < MBOX_QUEUE_LEN {
            let slot = self.next;
            self.next += 1;
            Some(slot)
        } else {
            None
        }
    }

    /// Current tail position.
    pub fn next(&self) -> usize {
        self.next
    }

    /// Hard reset, used only by Mbox initialization.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}
