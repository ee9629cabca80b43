//! Common utilities and types used throughout the memory pipeline.
//!
//! This module provides fundamental building blocks shared across all
//! components of the Mbox. It includes:
//! 1. **Address Types:** Strong types for virtual and physical addresses.
//! 2. **Constants:** Fixed hardware geometry (queues, caches, DTB, MAF).
//! 3. **Error Handling:** Memory faults and translation result types.

/// Address type definitions (physical and virtual addresses).
pub mod addr;

/// Hardware geometry constants.
pub mod constants;

/// Fault and translation result types.
pub mod error;

pub use addr::{PhysAddr, VirtAddr};
pub use constants::{CACHE_LINE_LEN, MBOX_QUEUE_LEN};
pub use error::{AccessKind, MboxInitError, MemoryFault, Translation};
