//! Physical and Virtual Address types.
//!
//! This module defines strong types for physical and virtual addresses to prevent
//! accidental mixing of address spaces. It provides the following:
//! 1. **Type Safety:** Distinguishes between virtual and physical address spaces at compile time.
//! 2. **Address Manipulation:** Helper methods for cache line offsets and line-aligned bases.
//! 3. **Mbox Integration:** Acts as the primary currency of translation and probe operations.

use crate::common::constants::CACHE_LINE_LEN;

/// A virtual address in the Alpha address space.
///
/// Virtual addresses are produced by the Ebox effective-address computation
/// and must be translated through the DTB before touching physical memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(pub u64);

/// A physical address in the Alpha address space.
///
/// Physical addresses are produced by the DTB and index the Dcache tags, the
/// Bcache, and the system address space behind the Cbox.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl VirtAddr {
    /// Creates a new virtual address from a raw 64-bit value.
    ///
    /// # Arguments
    ///
    /// * `addr` - The raw 64-bit address value.
    ///
    /// # Returns
    ///
    /// A new `VirtAddr` instance wrapping the provided address.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(&self) -> u64 {
        self.0
    }

    /// Extracts the byte offset within a Dcache line.
    #[inline(always)]
    pub fn line_offset(&self) -> usize {
        (self.0 as usize) & (CACHE_LINE_LEN - 1)
    }
}

impl PhysAddr {
    /// Creates a new physical address from a raw 64-bit value.
    ///
    /// # Arguments
    ///
    /// * `addr` - The raw 64-bit address value.
    ///
    /// # Returns
    ///
    /// A new `PhysAddr` instance wrapping the provided address.
    #[inline(always)]
    pub fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub fn val(&self) -> u64 {
        self.0
    }

    /// Returns the address of the start of the containing cache line.
    #[inline(always)]
    pub fn line_base(&self) -> u64 {
        self.0 & !(CACHE_LINE_LEN as u64 - 1)
    }

    /// Extracts the byte offset within a cache line.
    #[inline(always)]
    pub fn line_offset(&self) -> usize {
        (self.0 as usize) & (CACHE_LINE_LEN - 1)
    }
}
