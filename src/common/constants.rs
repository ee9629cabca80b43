//! Hardware geometry constants for the 21264 memory pipeline.
//!
//! These mirror the fixed structure sizes of the EV68 Mbox and its caches.
//! None of them are tunable at runtime; the configurable knobs live in
//! [`crate::config`].

/// Number of slots in each of the load queue and the store queue.
///
/// The allocator returns this value as a sentinel when the queue is full.
pub const MBOX_QUEUE_LEN: usize = 32;

/// Number of entries in the data translation buffer.
pub const TB_LEN: usize = 128;

/// Number of entries in the miss address file.
pub const MAF_LEN: usize = 8;

/// Number of entries in the I/O write buffer.
pub const IOWB_LEN: usize = 4;

/// Number of sets in the Dcache.
///
/// 512 sets of two 64-byte ways is the 64 KiB EV68 Dcache.
pub const CACHE_SETS: usize = 512;

/// Dcache associativity.
pub const CACHE_WAYS: usize = 2;

/// Bytes per cache line, Dcache and Bcache alike.
pub const CACHE_LINE_LEN: usize = 64;

/// Physical address bit selecting the noncacheable I/O region.
///
/// A physical address with this bit set is MMIO: it bypasses both caches and
/// is serviced through the I/O write buffer.
pub const IO_ADDR_BIT: u32 = 43;

/// Page offset width. Alpha pages are 8 KiB.
pub const PAGE_SHIFT: u32 = 13;
