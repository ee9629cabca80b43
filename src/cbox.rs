//! Miss address file and I/O write buffer.
//!
//! These are the Mbox's dispatch interface to the system side (the Cbox):
//! a cache miss parks in the MAF until the fill lands, an MMIO reference
//! parks in the IOWB until the system acknowledges it. This module provides:
//! 1. **Bounded arrays:** Fixed-capacity entry files; exhaustion stalls the
//!    queue entry, which retries on the next scheduler pass.
//! 2. **Dedup:** At most one live entry per originating queue slot, so a
//!    retried pass never double-allocates a miss (invariant on the slot
//!    back-reference).
//! 3. **Orphaning:** A revoked queue slot orphans its miss; the eventual
//!    completion is dropped instead of resurrecting a dead entry.

use crate::common::addr::PhysAddr;
use crate::common::constants::{IOWB_LEN, MAF_LEN};

/// Which queue a miss came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissKind {
    /// A load-queue miss (`LDx`).
    Ldx,
    /// A store-queue miss (`STx`).
    Stx,
}

/// System request command recorded in a MAF entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SysReq {
    /// Nothing outstanding.
    #[default]
    Nop,
    /// Read block (load miss).
    RdBlk,
    /// Read block with intent to modify (store miss).
    RdBlkMod,
}

/// System data response recorded in a MAF entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SysDc {
    /// No response yet.
    #[default]
    Nop,
    /// Fill data delivered.
    ReadData,
}

/// A miss address file entry.
#[derive(Clone, Copy, Debug)]
pub struct MafEntry {
    /// Originating queue.
    pub kind: MissKind,
    /// Physical address of the miss.
    pub pa: PhysAddr,
    /// Owning LQ/SQ slot index.
    pub slot: usize,
    /// Access width in bytes.
    pub len: usize,
    /// Store payload, if the miss came from the SQ.
    pub data: u64,
    /// Request command issued to the system.
    pub rq: SysReq,
    /// Response received from the system.
    pub rsp: SysDc,
    /// Fill has landed.
    pub complete: bool,
    /// Owning queue slot was revoked; drop the completion.
    pub orphaned: bool,
}

/// The miss address file.
#[derive(Default)]
pub struct MissAddressFile {
    entries: [Option<MafEntry>; MAF_LEN],
}

impl MissAddressFile {
    /// Creates an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the live entry owned by (kind, slot), if any.
    pub fn outstanding_for(&self, kind: MissKind, slot: usize) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.as_ref()
                .is_some_and(|e| !e.orphaned && e.kind == kind && e.slot == slot)
        })
    }

    /// Records a miss. Returns the MAF index, or `None` when the file is
    /// full; the caller leaves its queue entry pending and retries.
    pub fn add(
        &mut self,
        kind: MissKind,
        pa: PhysAddr,
        slot: usize,
        data: u64,
        len: usize,
    ) -> Option<usize> {
        let idx = self.entries.iter().position(|e| e.is_none())?;
        self.entries[idx] = Some(MafEntry {
            kind,
            pa,
            slot,
            len,
            data,
            rq: match kind {
                MissKind::Ldx => SysReq::RdBlk,
                MissKind::Stx => SysReq::RdBlkMod,
            },
            rsp: SysDc::Nop,
            complete: false,
            orphaned: false,
        });
        Some(idx)
    }

    /// Consumes a completion from the Cbox.
    ///
    /// Frees the entry and returns its owner, or `None` if the entry was
    /// orphaned or idle (the slot is freed either way).
    pub fn complete(&mut self, idx: usize) -> Option<(MissKind, usize)> {
        let entry = self.entries.get_mut(idx)?.take()?;
        if entry.orphaned {
            return None;
        }
        Some((entry.kind, entry.slot))
    }

    /// Orphans any live entry owned by (kind, slot).
    pub fn orphan_slot(&mut self, kind: MissKind, slot: usize) {
        for e in self.entries.iter_mut().flatten() {
            if e.kind == kind && e.slot == slot {
                e.orphaned = true;
            }
        }
    }

    /// Returns the entry at `idx`, for inspection.
    pub fn entry(&self, idx: usize) -> Option<&MafEntry> {
        self.entries.get(idx)?.as_ref()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }

    /// Clears every entry.
    pub fn reset(&mut self) {
        self.entries = [None; MAF_LEN];
    }
}

/// An I/O write buffer entry. Despite the name the IOWB carries MMIO loads
/// as well; a load entry's `data` field is filled by the acknowledgement.
#[derive(Clone, Copy, Debug)]
pub struct IowbEntry {
    /// Originating queue.
    pub kind: MissKind,
    /// MMIO physical address.
    pub pa: PhysAddr,
    /// Owning LQ/SQ slot index.
    pub slot: usize,
    /// Access width in bytes.
    pub len: usize,
    /// Store payload, or read data once acknowledged.
    pub data: u64,
    /// Acknowledged by the system.
    pub complete: bool,
    /// Owning queue slot was revoked; drop the completion.
    pub orphaned: bool,
}

/// The I/O write buffer.
#[derive(Default)]
pub struct IoWriteBuffer {
    entries: [Option<IowbEntry>; IOWB_LEN],
}

impl IoWriteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the live entry owned by (kind, slot), if any.
    pub fn outstanding_for(&self, kind: MissKind, slot: usize) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.as_ref()
                .is_some_and(|e| !e.orphaned && e.kind == kind && e.slot == slot)
        })
    }

    /// Records an MMIO reference. Returns the IOWB index, or `None` when
    /// the buffer is full.
    pub fn add(
        &mut self,
        kind: MissKind,
        pa: PhysAddr,
        slot: usize,
        data: u64,
        len: usize,
    ) -> Option<usize> {
        let idx = self.entries.iter().position(|e| e.is_none())?;
        self.entries[idx] = Some(IowbEntry {
            kind,
            pa,
            slot,
            len,
            data,
            complete: false,
            orphaned: false,
        });
        Some(idx)
    }

    /// Consumes an acknowledgement from the Cbox.
    ///
    /// `read_data` carries the device data for an MMIO load. Frees the
    /// entry and returns `(kind, slot, data)`, or `None` if orphaned.
    pub fn complete(&mut self, idx: usize, read_data: Option<u64>) -> Option<(MissKind, usize, u64)> {
        let mut entry = self.entries.get_mut(idx)?.take()?;
        if entry.orphaned {
            return None;
        }
        if let Some(data) = read_data {
            entry.data = data;
        }
        Some((entry.kind, entry.slot, entry.data))
    }

    /// Orphans any live entry owned by (kind, slot).
    pub fn orphan_slot(&mut self, kind: MissKind, slot: usize) {
        for e in self.entries.iter_mut().flatten() {
            if e.kind == kind && e.slot == slot {
                e.orphaned = true;
            }
        }
    }

    /// Returns the entry at `idx`, for inspection.
    pub fn entry(&self, idx: usize) -> Option<&IowbEntry> {
        self.entries.get(idx)?.as_ref()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }

    /// Clears every entry.
    pub fn reset(&mut self) {
        self.entries = [None; IOWB_LEN];
    }
}
