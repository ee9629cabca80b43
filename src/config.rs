//! Configuration for the memory pipeline.
//!
//! This module defines the configuration structures used to parameterize the
//! Mbox. It provides:
//! 1. **Defaults:** Baseline hardware constants (Bcache geometry, I/O region, endianness).
//! 2. **Structures:** Config for the byte-order fixup and the backing cache.
//!
//! Configuration is deserialized from JSON by an embedding emulator, or use
//! `MboxConfig::default()` for the architectural EV68 arrangement.

use serde::Deserialize;

/// Default configuration constants for the memory pipeline.
///
/// These values reproduce the architectural EV68 arrangement when not
/// explicitly overridden.
mod defaults {
    /// Number of lines in the backing cache (2 MiB of 64-byte lines).
    ///
    /// EV68 systems shipped with 2 to 16 MiB of Bcache; 2 MiB keeps the
    /// direct-mapped array small while exercising the same index math.
    pub const BCACHE_LINES: usize = 32 * 1024;

    /// Physical address bit selecting the noncacheable I/O region.
    pub const IO_ADDR_BIT: u32 = crate::common::constants::IO_ADDR_BIT;
}

/// Root configuration for the Mbox and its cache hierarchy.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use axp_core::config::MboxConfig;
///
/// let config = MboxConfig::default();
/// assert!(!config.big_endian);
/// assert_eq!(config.bcache.lines, 32 * 1024);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MboxConfig {
    /// Big-endian byte-order fixup for sub-quadword loads and stores.
    ///
    /// Mirrors `VA_CTL.B_ENDIAN`: when set, forwarded and cached data are
    /// byte-reversed within the access width before extension.
    #[serde(default)]
    pub big_endian: bool,

    /// Physical address bit that marks the MMIO region.
    #[serde(default = "MboxConfig::default_io_addr_bit")]
    pub io_addr_bit: u32,

    /// Backing cache geometry.
    #[serde(default)]
    pub bcache: BcacheConfig,
}

impl MboxConfig {
    fn default_io_addr_bit() -> u32 {
        defaults::IO_ADDR_BIT
    }
}

impl Default for MboxConfig {
    fn default() -> Self {
        Self {
            big_endian: false,
            io_addr_bit: defaults::IO_ADDR_BIT,
            bcache: BcacheConfig::default(),
        }
    }
}

/// Backing (board-level) cache configuration.
///
/// The Bcache is physically indexed and tagged and direct-mapped; only its
/// size is a board option.
#[derive(Debug, Clone, Deserialize)]
pub struct BcacheConfig {
    /// Whether the board has a Bcache at all. When disabled, every Dcache
    /// miss goes straight to the miss address file.
    #[serde(default = "BcacheConfig::default_enabled")]
    pub enabled: bool,

    /// Number of lines. Must be a power of two.
    #[serde(default = "BcacheConfig::default_lines")]
    pub lines: usize,
}

impl BcacheConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_lines() -> usize {
        defaults::BCACHE_LINES
    }
}

impl Default for BcacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lines: defaults::BCACHE_LINES,
        }
    }
}
