//! Memory pipeline statistics collection.
//!
//! This module tracks behavioral counters for the Mbox. It provides:
//! 1. **Forwarding:** Store-to-load forward hits and partial-overlap stalls.
//! 2. **Cache hierarchy:** Dcache and Bcache hit/miss counts, fills, evictions.
//! 3. **Miss traffic:** MAF and IOWB allocations and completions.
//! 4. **Faults:** Translation and alignment faults reported to the Ibox.
//! 5. **Lock discipline:** Store-conditional successes and failures.

/// Behavioral counters for a single Mbox instance.
///
/// All counters live behind the Mbox state lock, so plain integers suffice.
#[derive(Clone, Copy, Debug, Default)]
pub struct MboxStats {
    /// Loads satisfied from an older store in the SQ.
    pub forward_hits: u64,
    /// Loads stalled on a partial overlap with an older store.
    pub forward_conflicts: u64,

    /// Dcache probe hits.
    pub dcache_hits: u64,
    /// Dcache probe misses.
    pub dcache_misses: u64,
    /// Bcache probe hits.
    pub bcache_hits: u64,
    /// Bcache probe misses.
    pub bcache_misses: u64,
    /// Lines copied from the Bcache into the Dcache.
    pub dcache_fills: u64,
    /// Dcache victims pushed out by a fill.
    pub dcache_evictions: u64,

    /// Miss address file entries allocated.
    pub maf_allocated: u64,
    /// Miss address file completions consumed.
    pub maf_completed: u64,
    /// I/O write buffer entries allocated.
    pub iowb_allocated: u64,
    /// I/O write buffer completions consumed.
    pub iowb_completed: u64,

    /// Memory faults reported to the Ibox.
    pub faults: u64,

    /// Store-conditional instructions that committed.
    pub sc_success: u64,
    /// Store-conditional instructions that failed.
    pub sc_failure: u64,

    /// Queue entries revoked by the Ibox.
    pub revoked: u64,
    /// Scheduler passes executed.
    pub scheduler_passes: u64,
}

impl MboxStats {
    /// Resets every counter to zero.
    pub fn reset(&mut self) {
        *self = MboxStats::default();
    }

    /// Dcache hit rate over all probes, or 0.0 with no traffic.
    pub fn dcache_hit_rate(&self) -> f64 {
        let total = self.dcache_hits + self.dcache_misses;
        if total == 0 {
            return 0.0;
        }
        self.dcache_hits as f64 / total as f64
    }
}
