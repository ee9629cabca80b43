//! Data translation buffer.
//!
//! A 128-entry, fully associative translation buffer for the data stream.
//! PALcode fills it through the DTB tag/PTE write ports; the Mbox only ever
//! reads it. Translation honors the granularity hint (entries can map 8 KiB
//! through 4 MiB regions), per-mode read/write enables, fault-on-read/write
//! bits, address-space numbers with the address-space-match override, and
//! the kernel superpage window enabled through `M_CTL.SPE`.

use crate::common::addr::{PhysAddr, VirtAddr};
use crate::common::constants::{PAGE_SHIFT, TB_LEN};
use crate::common::error::{AccessKind, MemoryFault, Translation};

use super::ipr::{DtbPte, ProcessorMode};

/// A single translation buffer entry.
#[derive(Clone, Copy, Default)]
struct DtbEntry {
    /// Virtual page number the entry maps.
    virt_tag: u64,
    /// Page-number bits ignored when matching, from the granularity hint.
    match_mask: u64,
    /// Physical page frame number.
    pfn: u64,
    /// Address space number the entry belongs to.
    asn: u8,
    /// Matches in every address space.
    asm_bit: bool,
    /// Read enables, kernel/executive/supervisor/user.
    re: [bool; 4],
    /// Write enables, kernel/executive/supervisor/user.
    we: [bool; 4],
    /// Fault on read.
    for_: bool,
    /// Fault on write.
    fow: bool,
    /// Entry valid.
    valid: bool,
}

impl DtbEntry {
    /// Whether this entry translates `vpn` in address space `asn`.
    fn matches(&self, vpn: u64, asn: u8) -> bool {
        self.valid
            && (vpn & !self.match_mask) == (self.virt_tag & !self.match_mask)
            && (self.asm_bit || self.asn == asn)
    }
}

/// The data translation buffer.
pub struct Dtb {
    entries: [DtbEntry; TB_LEN],
    /// Round-robin fill pointer.
    next: usize,
    /// Current address space number (from `DTB_ASN` writes).
    asn: u8,
    /// Superpage enables (from `M_CTL.SPE`).
    spe: u8,
}

impl Dtb {
    /// Creates an empty, all-invalid buffer.
    pub fn new() -> Self {
        Self {
            entries: [DtbEntry::default(); TB_LEN],
            next: 0,
            asn: 0,
            spe: 0,
        }
    }

    /// Updates the current address space number.
    pub fn set_asn(&mut self, asn: u8) {
        self.asn = asn;
    }

    /// Updates the superpage enables.
    pub fn set_spe(&mut self, spe: u8) {
        self.spe = spe & 0x7;
    }

    /// Fills the next entry from a latched tag and a raw PTE write.
    ///
    /// Entries are consumed round-robin, which is also what the hardware's
    /// not-last-used replacement degrades to under PAL fill bursts.
    pub fn fill(&mut self, tag: u64, pte_raw: u64, asn: u8) {
        let mut pte = DtbPte::default();
        pte.write(pte_raw);

        // A granularity hint of n widens the page by a factor of 8^n.
        let gh_bits = 3 * pte.gh as u32;
        let match_mask = (1u64 << gh_bits) - 1;

        self.entries[self.next] = DtbEntry {
            virt_tag: tag >> PAGE_SHIFT,
            match_mask,
            pfn: pte.pfn,
            asn,
            asm_bit: pte.asm_bit,
            re: [pte.kre, pte.ere, pte.sre, pte.ure],
            we: [pte.kwe, pte.ewe, pte.swe, pte.uwe],
            for_: pte.for_,
            fow: pte.fow,
            valid: pte.valid,
        };
        self.next = (self.next + 1) % TB_LEN;
    }

    /// Invalidates every entry mapping `va` in the current address space.
    pub fn invalidate_single(&mut self, va: VirtAddr) {
        let vpn = va.val() >> PAGE_SHIFT;
        for entry in &mut self.entries {
            if entry.matches(vpn, self.asn) {
                entry.valid = false;
            }
        }
    }

    /// Invalidates every entry.
    pub fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
        self.next = 0;
    }

    /// Invalidates every entry without the address-space-match bit, the
    /// process-switch invalidate.
    pub fn invalidate_process(&mut self) {
        for entry in &mut self.entries {
            if !entry.asm_bit {
                entry.valid = false;
            }
        }
    }

    /// Translates a data-stream virtual address.
    ///
    /// # Arguments
    ///
    /// * `va` - The virtual address to translate.
    /// * `kind` - Load or store, selecting which enable bits apply.
    /// * `mode` - The processor mode the access executes in.
    ///
    /// # Returns
    ///
    /// The translation, or the memory fault to raise to the Ibox. A failed
    /// translation never produces a physical address; address zero is a
    /// valid translation target like any other.
    pub fn translate(
        &self,
        va: VirtAddr,
        kind: AccessKind,
        mode: ProcessorMode,
    ) -> Result<Translation, MemoryFault> {
        // Kernel superpage window: SPE<2> maps the 2^43-byte region at
        // VA<47:46> = 2 one-to-one, kernel mode only.
        if self.spe & 0x4 != 0 && (va.val() >> 46) & 0x3 == 0x2 {
            if mode != ProcessorMode::Kernel {
                return Err(MemoryFault::AccessViolation(va.val()));
            }
            return Ok(Translation {
                paddr: PhysAddr::new(va.val() & ((1u64 << 44) - 1)),
                asm: false,
            });
        }

        let vpn = va.val() >> PAGE_SHIFT;
        let entry = self
            .entries
            .iter()
            .find(|e| e.matches(vpn, self.asn))
            .ok_or(MemoryFault::TranslationNotValid(va.val()))?;

        let enabled = match kind {
            AccessKind::Read => entry.re[mode as usize],
            AccessKind::Write => entry.we[mode as usize],
        };
        if !enabled {
            return Err(MemoryFault::AccessViolation(va.val()));
        }

        match kind {
            AccessKind::Read if entry.for_ => return Err(MemoryFault::FaultOnRead(va.val())),
            AccessKind::Write if entry.fow => return Err(MemoryFault::FaultOnWrite(va.val())),
            _ => {}
        }

        // Within a granularity-hint region the low page-number bits of the
        // virtual address carry through to the physical side.
        let offset_mask = (1u64 << (PAGE_SHIFT + 3 * mask_bits(entry.match_mask))) - 1;
        let paddr = ((entry.pfn << PAGE_SHIFT) & !offset_mask) | (va.val() & offset_mask);

        Ok(Translation {
            paddr: PhysAddr::new(paddr),
            asm: entry.asm_bit,
        })
    }
}

impl Default for Dtb {
    fn default() -> Self {
        Self::new()
    }
}

/// Recovers the granularity hint from a match mask.
fn mask_bits(match_mask: u64) -> u32 {
    (match_mask.count_ones() / 3) as u32
}
