//! Fault and translation result definitions.
//!
//! This module defines the error handling surface of the memory pipeline. It provides:
//! 1. **Memory Faults:** The data-stream faults the DTB and alignment checks can raise.
//! 2. **Translation Results:** The outcome of a virtual-to-physical translation.
//! 3. **Initialization Errors:** The sole fatal error surface of the Mbox.

use std::fmt;

use super::addr::PhysAddr;

/// Data-stream memory faults.
///
/// Every variant carries the faulting virtual address. Faults are reported
/// upward to the Ibox as events; the queue entry that raised one is
/// discarded without architectural effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryFault {
    /// Translation not valid.
    ///
    /// Raised when no valid DTB entry matches the virtual address. PALcode
    /// is expected to fill the DTB and restart the reference.
    TranslationNotValid(u64),

    /// Access violation.
    ///
    /// Raised when the matching DTB entry does not grant the access in the
    /// current processor mode.
    AccessViolation(u64),

    /// Fault on read.
    ///
    /// Raised when the matching DTB entry has its fault-on-read bit set and
    /// the access is a load.
    FaultOnRead(u64),

    /// Fault on write.
    ///
    /// Raised when the matching DTB entry has its fault-on-write bit set and
    /// the access is a store.
    FaultOnWrite(u64),

    /// Alignment fault.
    ///
    /// Raised when the virtual address is not a multiple of the access width
    /// for an opcode that requires natural alignment.
    Alignment(u64),
}

impl MemoryFault {
    /// Returns the faulting virtual address.
    #[inline]
    pub fn addr(&self) -> u64 {
        match *self {
            MemoryFault::TranslationNotValid(va)
            | MemoryFault::AccessViolation(va)
            | MemoryFault::FaultOnRead(va)
            | MemoryFault::FaultOnWrite(va)
            | MemoryFault::Alignment(va) => va,
        }
    }
}

impl fmt::Display for MemoryFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryFault::TranslationNotValid(va) => write!(f, "TranslationNotValid({:#x})", va),
            MemoryFault::AccessViolation(va) => write!(f, "AccessViolation({:#x})", va),
            MemoryFault::FaultOnRead(va) => write!(f, "FaultOnRead({:#x})", va),
            MemoryFault::FaultOnWrite(va) => write!(f, "FaultOnWrite({:#x})", va),
            MemoryFault::Alignment(va) => write!(f, "Alignment({:#x})", va),
        }
    }
}

impl std::error::Error for MemoryFault {}

/// Direction of a data-stream access, for DTB permission checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// A load (read enable bits apply).
    Read,
    /// A store (write enable bits apply).
    Write,
}

/// Result of a successful virtual-to-physical translation.
///
/// A failed translation is a [`MemoryFault`]; there is no sentinel physical
/// address, so address zero remains a valid translation target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Translation {
    /// The translated physical address.
    pub paddr: PhysAddr,
    /// Address-space-match bit of the mapping entry.
    pub asm: bool,
}

/// Failure to bring up the Mbox.
///
/// Initialization failure is the only fatal error in the memory pipeline;
/// everything else is reported through Ibox events or queue-entry results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MboxInitError {
    /// A configured structure size is unusable (zero lines, line size not a
    /// power of two, and so on). Carries a description of the bad knob.
    BadGeometry(String),
}

impl fmt::Display for MboxInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MboxInitError::BadGeometry(what) => write!(f, "bad cache geometry: {}", what),
        }
    }
}

impl std::error::Error for MboxInitError {}
