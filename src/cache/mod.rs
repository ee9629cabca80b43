//! Dcache and Bcache models.
//!
//! This module implements the two cache levels the Mbox talks to directly.
//! It provides:
//! 1. **Dcache:** 64 KiB, two-way set-associative, virtually indexed and
//!    physically tagged, with per-line status bits including the lock bit
//!    that backs load-locked / store-conditional.
//! 2. **Bcache:** The board-level backing cache, direct-mapped, physically
//!    indexed and tagged.
//! 3. **Probe Protocol:** Status queries, reads, writes, line fills with
//!    victim write-back, and the coherence-side invalidation used by the
//!    system interface.
//!
//! The probe entry points are non-blocking against the Mbox lock; the cache
//! pair carries its own mutex (see [`crate::mbox`]).

use crate::common::addr::{PhysAddr, VirtAddr};
use crate::common::constants::{CACHE_LINE_LEN, CACHE_SETS, CACHE_WAYS};
use crate::common::error::MboxInitError;
use crate::config::BcacheConfig;

/// Result of a cache status probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// The line is present and readable.
    Hit,
    /// The line is absent.
    Miss,
}

/// Coherence state of a Dcache line.
///
/// The EV68 Dcache distinguishes clean/dirty crossed with shared/exclusive;
/// `Invalid` doubles as the reset state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LineState {
    /// No data.
    #[default]
    Invalid,
    /// Exclusive, matches memory.
    Clean,
    /// Shared with another agent, matches memory.
    CleanShared,
    /// Exclusive, modified relative to memory.
    Dirty,
    /// Shared and modified; this cache owns the write-back.
    DirtyShared,
}

/// A single Dcache line with its status bits.
#[derive(Clone)]
pub struct DcacheLine {
    /// Line data.
    pub data: [u8; CACHE_LINE_LEN],
    /// Physical line address tag.
    pub phys_tag: u64,
    /// Line holds data.
    pub valid: bool,
    /// Line differs from memory.
    pub dirty: bool,
    /// Another agent may hold this line.
    pub shared: bool,
    /// Line has been written since the fill.
    pub modified: bool,
    /// Which way of the pair the line sits in.
    pub set_0_1: bool,
    /// A load-locked has registered this line; cleared by any coherence
    /// write, which is what makes the paired store-conditional fail.
    pub locked: bool,
    /// Coherence state.
    pub state: LineState,
}

impl Default for DcacheLine {
    fn default() -> Self {
        Self {
            data: [0; CACHE_LINE_LEN],
            phys_tag: 0,
            valid: false,
            dirty: false,
            shared: false,
            modified: false,
            set_0_1: false,
            locked: false,
            state: LineState::Invalid,
        }
    }
}

/// Duplicate-tag entry, the physically-indexed shadow of a Dcache way.
///
/// The system side probes by physical address only; the duplicate tag store
/// is what lets an invalidation find a virtually-indexed line.
#[derive(Clone, Copy, Default)]
struct DtagEntry {
    phys_tag: u64,
    valid: bool,
}

/// A victim line pushed out of the Dcache by a fill.
pub struct Victim {
    /// Physical line address of the victim.
    pub pa: PhysAddr,
    /// Victim data.
    pub data: [u8; CACHE_LINE_LEN],
    /// Whether the victim must be written back.
    pub dirty: bool,
}

/// The on-chip data cache.
pub struct Dcache {
    lines: Vec<DcacheLine>,
    dtag: Vec<DtagEntry>,
    /// Way-enable mask from `DC_CTL.SET_EN`; bit 0 gates way 0, bit 1 way 1.
    set_en: u8,
    /// Round-robin fill pointer per set, used when both ways are valid.
    fill_way: Vec<bool>,
}

impl Dcache {
    fn new() -> Self {
        Self {
            lines: vec![DcacheLine::default(); CACHE_SETS * CACHE_WAYS],
            dtag: vec![DtagEntry::default(); CACHE_SETS * CACHE_WAYS],
            set_en: 0x3,
            fill_way: vec![false; CACHE_SETS],
        }
    }

    /// Virtual index of the set holding `va`.
    #[inline]
    fn index(va: VirtAddr) -> usize {
        ((va.val() as usize) >> 6) & (CACHE_SETS - 1)
    }

    /// Physical tag for `pa`: the full line address.
    #[inline]
    fn tag(pa: PhysAddr) -> u64 {
        pa.val() >> 6
    }

    /// Updates the way-enable mask from a `DC_CTL` write.
    pub fn set_way_enable(&mut self, set_en: u8) {
        self.set_en = set_en & 0x3;
    }

    /// Finds the way holding (va, pa), honoring the way-enable mask.
    fn find(&self, va: VirtAddr, pa: PhysAddr) -> Option<usize> {
        let base = Self::index(va) * CACHE_WAYS;
        let tag = Self::tag(pa);
        for way in 0..CACHE_WAYS {
            if self.set_en & (1 << way) == 0 {
                continue;
            }
            let line = &self.lines[base + way];
            if line.valid && line.phys_tag == tag {
                return Some(base + way);
            }
        }
        None
    }

    /// Status probe by virtual/physical pair.
    pub fn status(&self, va: VirtAddr, pa: PhysAddr) -> CacheStatus {
        if self.find(va, pa).is_some() {
            CacheStatus::Hit
        } else {
            CacheStatus::Miss
        }
    }

    /// Reads `len` bytes at the line offset of `va`. Returns `None` on miss.
    pub fn read(&self, va: VirtAddr, pa: PhysAddr, len: usize) -> Option<u64> {
        let idx = self.find(va, pa)?;
        Some(read_bytes(&self.lines[idx].data, va.line_offset(), len))
    }

    /// Writes the low `len` bytes of `value` at the line offset of `va`,
    /// marking the line dirty. Returns false on miss.
    pub fn write(&mut self, va: VirtAddr, pa: PhysAddr, len: usize, value: u64) -> bool {
        let Some(idx) = self.find(va, pa) else {
            return false;
        };
        let offset = va.line_offset();
        write_bytes(&mut self.lines[idx].data, offset, len, value);
        let line = &mut self.lines[idx];
        line.dirty = true;
        line.modified = true;
        line.state = if line.shared {
            LineState::DirtyShared
        } else {
            LineState::Dirty
        };
        true
    }

    /// Registers a load-locked on the line. Returns false on miss.
    pub fn lock_line(&mut self, va: VirtAddr, pa: PhysAddr) -> bool {
        match self.find(va, pa) {
            Some(idx) => {
                self.lines[idx].locked = true;
                true
            }
            None => false,
        }
    }

    /// Whether the line is present with its lock bit still standing.
    pub fn line_locked(&self, va: VirtAddr, pa: PhysAddr) -> bool {
        self.find(va, pa).is_some_and(|idx| self.lines[idx].locked)
    }

    /// Installs a line, evicting a victim if both enabled ways are valid.
    pub fn fill(
        &mut self,
        va: VirtAddr,
        pa: PhysAddr,
        data: [u8; CACHE_LINE_LEN],
    ) -> Option<Victim> {
        let set = Self::index(va);
        let base = set * CACHE_WAYS;

        // Prefer an invalid enabled way.
        let mut way = None;
        for w in 0..CACHE_WAYS {
            if self.set_en & (1 << w) != 0 && !self.lines[base + w].valid {
                way = Some(w);
                break;
            }
        }
        // Otherwise round-robin among the enabled ways.
        let way = way.unwrap_or_else(|| match self.set_en {
            0x1 => 0,
            0x2 => 1,
            _ => {
                let w = self.fill_way[set] as usize;
                self.fill_way[set] = !self.fill_way[set];
                w
            }
        });

        let idx = base + way;
        let victim = if self.lines[idx].valid {
            Some(Victim {
                pa: PhysAddr::new(self.lines[idx].phys_tag << 6),
                data: self.lines[idx].data,
                dirty: self.lines[idx].dirty,
            })
        } else {
            None
        };

        self.lines[idx] = DcacheLine {
            data,
            phys_tag: Self::tag(pa),
            valid: true,
            dirty: false,
            shared: false,
            modified: false,
            set_0_1: way == 1,
            locked: false,
            state: LineState::Clean,
        };
        self.dtag[idx] = DtagEntry {
            phys_tag: Self::tag(pa),
            valid: true,
        };
        victim
    }

    /// Coherence-side invalidation by physical address.
    ///
    /// Walks the duplicate tag store, since the system side has no virtual
    /// index. Any registered lock on the line dies with it.
    pub fn system_invalidate(&mut self, pa: PhysAddr) -> bool {
        let tag = Self::tag(pa);
        let mut hit = false;
        for idx in 0..self.dtag.len() {
            if self.dtag[idx].valid && self.dtag[idx].phys_tag == tag {
                self.dtag[idx].valid = false;
                self.lines[idx].valid = false;
                self.lines[idx].locked = false;
                self.lines[idx].state = LineState::Invalid;
                hit = true;
            }
        }
        hit
    }

    /// Resets every line, duplicate tag, and the way-enable mask.
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            *line = DcacheLine::default();
        }
        for entry in &mut self.dtag {
            *entry = DtagEntry::default();
        }
        for bit in &mut self.fill_way {
            *bit = false;
        }
        self.set_en = 0x3;
    }
}

#[derive(Clone)]
struct BcacheLine {
    data: [u8; CACHE_LINE_LEN],
    tag: u64,
    valid: bool,
    dirty: bool,
}

impl Default for BcacheLine {
    fn default() -> Self {
        Self {
            data: [0; CACHE_LINE_LEN],
            tag: 0,
            valid: false,
            dirty: false,
        }
    }
}

/// The board-level backing cache, physically indexed and tagged.
pub struct Bcache {
    lines: Vec<BcacheLine>,
    mask: usize,
    enabled: bool,
}

impl Bcache {
    fn new(config: &BcacheConfig) -> Result<Self, MboxInitError> {
        if config.enabled && !config.lines.is_power_of_two() {
            return Err(MboxInitError::BadGeometry(format!(
                "bcache lines {} is not a power of two",
                config.lines
            )));
        }
        let lines = if config.enabled { config.lines } else { 1 };
        Ok(Self {
            lines: vec![BcacheLine::default(); lines],
            mask: lines - 1,
            enabled: config.enabled,
        })
    }

    #[inline]
    fn index(&self, pa: PhysAddr) -> usize {
        ((pa.val() as usize) >> 6) & self.mask
    }

    #[inline]
    fn tag(pa: PhysAddr) -> u64 {
        pa.val() >> 6
    }

    /// Status probe by physical address.
    pub fn status(&self, pa: PhysAddr) -> CacheStatus {
        if !self.enabled {
            return CacheStatus::Miss;
        }
        let line = &self.lines[self.index(pa)];
        if line.valid && line.tag == Self::tag(pa) {
            CacheStatus::Hit
        } else {
            CacheStatus::Miss
        }
    }

    /// Returns a copy of the line holding `pa`, if present.
    pub fn read_line(&self, pa: PhysAddr) -> Option<[u8; CACHE_LINE_LEN]> {
        if !self.enabled {
            return None;
        }
        let line = &self.lines[self.index(pa)];
        if line.valid && line.tag == Self::tag(pa) {
            Some(line.data)
        } else {
            None
        }
    }

    /// Installs a line, as the Cbox does when a system fill arrives.
    pub fn fill(&mut self, pa: PhysAddr, data: [u8; CACHE_LINE_LEN]) {
        if !self.enabled {
            return;
        }
        let idx = self.index(pa);
        self.lines[idx] = BcacheLine {
            data,
            tag: Self::tag(pa),
            valid: true,
            dirty: false,
        };
    }

    /// Accepts a dirty victim pushed out of the Dcache.
    pub fn accept_victim(&mut self, pa: PhysAddr, data: [u8; CACHE_LINE_LEN]) {
        if !self.enabled {
            return;
        }
        let idx = self.index(pa);
        self.lines[idx] = BcacheLine {
            data,
            tag: Self::tag(pa),
            valid: true,
            dirty: true,
        };
    }

    /// Updates `len` bytes within a resident line. Returns false on miss.
    pub fn write(&mut self, pa: PhysAddr, len: usize, value: u64) -> bool {
        if !self.enabled {
            return false;
        }
        let idx = self.index(pa);
        if !self.lines[idx].valid || self.lines[idx].tag != Self::tag(pa) {
            return false;
        }
        let offset = pa.line_offset();
        write_bytes(&mut self.lines[idx].data, offset, len, value);
        self.lines[idx].dirty = true;
        true
    }

    /// Coherence-side invalidation by physical address.
    pub fn invalidate(&mut self, pa: PhysAddr) {
        let idx = self.index(pa);
        if self.lines[idx].valid && self.lines[idx].tag == Self::tag(pa) {
            self.lines[idx].valid = false;
        }
    }

    /// Resets every line.
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            *line = BcacheLine::default();
        }
    }
}

/// The cache pair the Mbox probes.
///
/// Held behind one mutex in the Mbox so the probe protocol and the system
/// interface (fills, coherence probes, the test harness standing in for the
/// Cbox) serialize against each other without touching the Mbox lock.
pub struct Caches {
    /// On-chip data cache.
    pub dcache: Dcache,
    /// Board-level backing cache.
    pub bcache: Bcache,
}

impl Caches {
    /// Builds the pair from configuration.
    pub fn new(bcache: &BcacheConfig) -> Result<Self, MboxInitError> {
        Ok(Self {
            dcache: Dcache::new(),
            bcache: Bcache::new(bcache)?,
        })
    }

    /// Moves a line from the Bcache into the Dcache, writing any dirty
    /// victim back into the Bcache.
    ///
    /// Returns `None` if the Bcache misses, otherwise whether a victim was
    /// pushed out of the Dcache.
    pub fn copy_bcache_to_dcache(&mut self, va: VirtAddr, pa: PhysAddr) -> Option<bool> {
        let data = self.bcache.read_line(pa)?;
        let evicted = match self.dcache.fill(va, pa, data) {
            Some(victim) => {
                if victim.dirty {
                    self.bcache.accept_victim(victim.pa, victim.data);
                }
                true
            }
            None => false,
        };
        Some(evicted)
    }

    /// Coherence write observed from another agent: the line leaves both
    /// caches and any registered lock dies.
    pub fn system_write(&mut self, pa: PhysAddr) {
        self.dcache.system_invalidate(pa);
        self.bcache.invalidate(pa);
    }
}

/// Reads `len` little-endian bytes at `offset`.
fn read_bytes(data: &[u8; CACHE_LINE_LEN], offset: usize, len: usize) -> u64 {
    debug_assert!(offset + len <= CACHE_LINE_LEN);
    let mut value = 0u64;
    for i in (0..len).rev() {
        value = (value << 8) | data[offset + i] as u64;
    }
    value
}

/// Writes the low `len` bytes of `value` at `offset`, little-endian.
fn write_bytes(data: &mut [u8; CACHE_LINE_LEN], offset: usize, len: usize, value: u64) {
    debug_assert!(offset + len <= CACHE_LINE_LEN);
    for i in 0..len {
        data[offset + i] = (value >> (i * 8)) as u8;
    }
}
