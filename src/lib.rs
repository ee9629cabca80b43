//! Alpha 21264 (EV68) memory pipeline library.
//!
//! This crate implements the Mbox of a 21264 emulator with the following:
//! 1. **Queues:** Load and store queues with program-order slot allocation
//!    and per-entry state machines.
//! 2. **Forwarding:** Store-to-load forwarding with youngest-older-store
//!    selection and partial-overlap stalls.
//! 3. **Memory hierarchy:** DTB translation, a two-way virtually-indexed
//!    Dcache, a direct-mapped Bcache, and the MAF/IOWB miss interface to
//!    the system side.
//! 4. **Scheduling:** A single cooperative worker driven by a condition
//!    variable, signalled by the Ebox, Ibox, and Cbox.
//! 5. **PAL surface:** The Mbox internal processor registers, including
//!    the DTB write ports and the Dcache control register.

/// Dcache and Bcache models.
pub mod cache;
/// Miss address file and I/O write buffer.
pub mod cbox;
/// Common types and constants (addresses, geometry, faults).
pub mod common;
/// Mbox configuration (defaults, byte order, Bcache geometry).
pub mod config;
/// Instruction descriptors and the in-flight window.
pub mod insn;
/// The memory pipeline itself (queues, forwarding, scheduler, IPRs).
pub mod mbox;
/// Behavioral statistics collection.
pub mod stats;

/// Root configuration type; use `MboxConfig::default()` or deserialize from JSON.
pub use crate::config::MboxConfig;
/// Main pipeline type; one per emulated CPU.
pub use crate::mbox::Mbox;
