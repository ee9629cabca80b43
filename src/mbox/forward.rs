//! Store-to-load forwarding engine.
//!
//! A pending load may be satisfied by an older store still sitting in the
//! SQ instead of by the caches. The rules:
//! 1. Only stores older than the load qualify (`unique_id` comparison).
//! 2. The store must start at the load's exact virtual address and be at
//!    least as wide, so it covers every byte of the load.
//! 3. Among qualifying stores the youngest wins; it holds the value the
//!    load would observe from memory order.
//! 4. Any older store that overlaps the load without covering it poisons
//!    the whole lookup: the load must neither forward nor read the caches
//!    until that store has left the queue.

use crate::common::addr::VirtAddr;

use super::queue::{SqEntry, SqState};

/// Outcome of a forwarding scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwardResult {
    /// A qualifying store covers the load; its SQ slot and raw value.
    Hit {
        /// SQ slot of the selected store.
        slot: usize,
        /// The store's full 64-bit data; the caller takes the low bytes.
        value: u64,
    },
    /// An older store partially overlaps the load; stall, touch nothing.
    Conflict,
    /// No older store overlaps; probe the caches.
    Miss,
}

/// Whether an SQ entry is visible to forwarding.
///
/// Everything between publication and slot reclaim holds live data:
/// translated or not, retired or not, even already committed (the commit
/// wrote the same bytes the entry still carries).
fn visible(state: SqState) -> bool {
    matches!(
        state,
        SqState::Initial | SqState::WritePending | SqState::Ready | SqState::Complete
    )
}

/// Scans the store queue on behalf of a pending load.
///
/// # Arguments
///
/// * `sq` - The full store queue.
/// * `va` - Virtual address of the load.
/// * `len` - Access width of the load in bytes.
/// * `unique_id` - Program-order tag of the load.
pub fn forward_from_stores(
    sq: &[SqEntry],
    va: VirtAddr,
    len: usize,
    unique_id: u64,
) -> ForwardResult {
    let l_start = va.val();
    let l_end = l_start + len as u64;

    let mut best: Option<(usize, u64)> = None;
    let mut conflict = false;

    for (slot, store) in sq.iter().enumerate() {
        if !visible(store.state) {
            continue;
        }
        // Younger stores are invisible to this load.
        if store.unique_id >= unique_id {
            continue;
        }

        let s_start = store.virt.val();
        let s_end = s_start + store.len as u64;
        if l_start >= s_end || l_end <= s_start {
            continue;
        }

        if s_start == l_start && store.len >= len {
            match best {
                Some((_, best_uid)) if best_uid >= store.unique_id => {}
                _ => best = Some((slot, store.unique_id)),
            }
        } else {
            conflict = true;
        }
    }

    if conflict {
        ForwardResult::Conflict
    } else if let Some((slot, _)) = best {
        ForwardResult::Hit {
            slot,
            value: sq[slot].value,
        }
    } else {
        ForwardResult::Miss
    }
}
