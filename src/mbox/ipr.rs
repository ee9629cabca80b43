//! Mbox internal processor registers.
//!
//! The PAL-visible register surface of the memory pipeline: the DTB write
//! ports, the memory-management status register, and the Dcache control and
//! status registers. Bit layouts follow the 21264 hardware reference.
//!
//! Writes with architectural side effects (a PTE write pairing with the
//! latched tag, a single-entry invalidate, a way-enable change) are
//! reported to the caller as an [`IprEffect`]; the register file itself
//! stays a passive latch, the way the hardware tag/PTE write ports do.

/// Processor privilege modes, in increasing privilege order as encoded in
/// the PTE enable bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProcessorMode {
    /// Kernel mode.
    #[default]
    Kernel = 0,
    /// Executive mode.
    Executive = 1,
    /// Supervisor mode.
    Supervisor = 2,
    /// User mode.
    User = 3,
}

impl ProcessorMode {
    /// Decodes the two-bit mode field of `DTB_ALTMODE`.
    pub fn from_bits(bits: u64) -> Self {
        match bits & 0x3 {
            0 => ProcessorMode::Kernel,
            1 => ProcessorMode::Executive,
            2 => ProcessorMode::Supervisor,
            _ => ProcessorMode::User,
        }
    }
}

/// `DTB_TAG0/1`: latched virtual tag for the next PTE write.
#[derive(Clone, Copy, Debug, Default)]
pub struct DtbTag {
    /// Virtual address bits 47:13.
    pub va: u64,
}

impl DtbTag {
    /// Latches a tag write. Only the page-number bits are kept.
    pub fn write(&mut self, value: u64) {
        self.va = value & 0x0000_FFFF_FFFF_E000;
    }
}

/// `DTB_PTE0/1`: page table entry write port.
///
/// Field positions follow the Alpha memory-management PTE: fault bits low,
/// mode enables in bits 8 through 15, the PFN from bit 32.
#[derive(Clone, Copy, Debug, Default)]
pub struct DtbPte {
    /// Page frame number.
    pub pfn: u64,
    /// Read enables, kernel through user.
    pub kre: bool,
    /// Executive read enable.
    pub ere: bool,
    /// Supervisor read enable.
    pub sre: bool,
    /// User read enable.
    pub ure: bool,
    /// Write enables, kernel through user.
    pub kwe: bool,
    /// Executive write enable.
    pub ewe: bool,
    /// Supervisor write enable.
    pub swe: bool,
    /// User write enable.
    pub uwe: bool,
    /// Granularity hint (page size multiplier, 8^gh).
    pub gh: u8,
    /// Address space match: translation valid in every ASN.
    pub asm_bit: bool,
    /// Fault on write.
    pub fow: bool,
    /// Fault on read.
    pub for_: bool,
    /// Entry valid.
    pub valid: bool,
}

impl DtbPte {
    const V: u64 = 1 << 0;
    const FOR: u64 = 1 << 1;
    const FOW: u64 = 1 << 2;
    const ASM: u64 = 1 << 4;
    const GH_SHIFT: u64 = 5;
    const KRE: u64 = 1 << 8;
    const ERE: u64 = 1 << 9;
    const SRE: u64 = 1 << 10;
    const URE: u64 = 1 << 11;
    const KWE: u64 = 1 << 12;
    const EWE: u64 = 1 << 13;
    const SWE: u64 = 1 << 14;
    const UWE: u64 = 1 << 15;
    const PFN_SHIFT: u64 = 32;

    /// Decodes a PTE write.
    pub fn write(&mut self, value: u64) {
        self.valid = value & Self::V != 0;
        self.for_ = value & Self::FOR != 0;
        self.fow = value & Self::FOW != 0;
        self.asm_bit = value & Self::ASM != 0;
        self.gh = ((value >> Self::GH_SHIFT) & 0x3) as u8;
        self.kre = value & Self::KRE != 0;
        self.ere = value & Self::ERE != 0;
        self.sre = value & Self::SRE != 0;
        self.ure = value & Self::URE != 0;
        self.kwe = value & Self::KWE != 0;
        self.ewe = value & Self::EWE != 0;
        self.swe = value & Self::SWE != 0;
        self.uwe = value & Self::UWE != 0;
        self.pfn = value >> Self::PFN_SHIFT;
    }

    /// Re-encodes the register for a PAL read.
    pub fn read(&self) -> u64 {
        let mut v = (self.pfn << Self::PFN_SHIFT) | ((self.gh as u64) << Self::GH_SHIFT);
        if self.valid {
            v |= Self::V;
        }
        if self.for_ {
            v |= Self::FOR;
        }
        if self.fow {
            v |= Self::FOW;
        }
        if self.asm_bit {
            v |= Self::ASM;
        }
        if self.kre {
            v |= Self::KRE;
        }
        if self.ere {
            v |= Self::ERE;
        }
        if self.sre {
            v |= Self::SRE;
        }
        if self.ure {
            v |= Self::URE;
        }
        if self.kwe {
            v |= Self::KWE;
        }
        if self.ewe {
            v |= Self::EWE;
        }
        if self.swe {
            v |= Self::SWE;
        }
        if self.uwe {
            v |= Self::UWE;
        }
        v
    }
}

/// `MM_STAT`: memory-management fault status, updated by the Mbox on every
/// data-stream fault and read-only to PALcode.
#[derive(Clone, Copy, Debug, Default)]
pub struct MmStat {
    /// Faulting access was a write.
    pub wr: bool,
    /// Access violation.
    pub acv: bool,
    /// Fault-on-read.
    pub for_: bool,
    /// Fault-on-write.
    pub fow: bool,
    /// Opcode of the faulting instruction.
    pub opcode: u8,
    /// Dcache tag parity error (diagnostics only).
    pub dc_tag_perr: bool,
}

impl MmStat {
    /// Encodes the register for a PAL read.
    pub fn read(&self) -> u64 {
        let mut v = 0u64;
        if self.wr {
            v |= 1 << 0;
        }
        if self.acv {
            v |= 1 << 1;
        }
        if self.for_ {
            v |= 1 << 2;
        }
        if self.fow {
            v |= 1 << 3;
        }
        v |= (self.opcode as u64 & 0x3F) << 4;
        if self.dc_tag_perr {
            v |= 1 << 10;
        }
        v
    }
}

/// `M_CTL`: Mbox control. Only the superpage enables are architectural.
#[derive(Clone, Copy, Debug, Default)]
pub struct MCtl {
    /// Superpage enables, bits 0..2. Bit 2 maps the 43-bit kernel
    /// superpage region one-to-one.
    pub spe: u8,
}

impl MCtl {
    /// Decodes an `M_CTL` write; `SPE` sits at bits 3:1.
    pub fn write(&mut self, value: u64) {
        self.spe = ((value >> 1) & 0x7) as u8;
    }

    /// Encodes the register for a PAL read.
    pub fn read(&self) -> u64 {
        (self.spe as u64) << 1
    }
}

/// `DC_CTL`: Dcache control.
#[derive(Clone, Copy, Debug)]
pub struct DcCtl {
    /// Way enables; 3 turns both ways on, the architectural reset value.
    pub set_en: u8,
    /// Force hit (diagnostics).
    pub f_hit: bool,
    /// Force bad tag parity (diagnostics).
    pub f_bad_tpar: bool,
    /// Force bad data ECC (diagnostics).
    pub f_bad_decc: bool,
    /// Tag parity check enable.
    pub dctag_par_en: bool,
    /// Data ECC check enable.
    pub dcdat_err_en: bool,
}

impl Default for DcCtl {
    fn default() -> Self {
        Self {
            set_en: 0x3,
            f_hit: false,
            f_bad_tpar: false,
            f_bad_decc: false,
            dctag_par_en: false,
            dcdat_err_en: false,
        }
    }
}

impl DcCtl {
    /// Decodes a `DC_CTL` write.
    pub fn write(&mut self, value: u64) {
        self.set_en = (value & 0x3) as u8;
        self.f_hit = value & (1 << 2) != 0;
        self.f_bad_tpar = value & (1 << 3) != 0;
        self.f_bad_decc = value & (1 << 4) != 0;
        self.dctag_par_en = value & (1 << 5) != 0;
        self.dcdat_err_en = value & (1 << 6) != 0;
    }

    /// Encodes the register for a PAL read.
    pub fn read(&self) -> u64 {
        let mut v = self.set_en as u64;
        if self.f_hit {
            v |= 1 << 2;
        }
        if self.f_bad_tpar {
            v |= 1 << 3;
        }
        if self.f_bad_decc {
            v |= 1 << 4;
        }
        if self.dctag_par_en {
            v |= 1 << 5;
        }
        if self.dcdat_err_en {
            v |= 1 << 6;
        }
        v
    }
}

/// `DC_STAT`: Dcache error status (diagnostics).
#[derive(Clone, Copy, Debug, Default)]
pub struct DcStat {
    /// Tag parity error, way 0.
    pub tperr_p0: bool,
    /// Tag parity error, way 1.
    pub tperr_p1: bool,
    /// ECC error on a store.
    pub ecc_err_st: bool,
    /// ECC error on a load.
    pub ecc_err_ld: bool,
    /// Second error occurred.
    pub seo: bool,
}

impl DcStat {
    /// Encodes the register for a PAL read.
    pub fn read(&self) -> u64 {
        let mut v = 0u64;
        if self.tperr_p0 {
            v |= 1 << 0;
        }
        if self.tperr_p1 {
            v |= 1 << 1;
        }
        if self.ecc_err_st {
            v |= 1 << 2;
        }
        if self.ecc_err_ld {
            v |= 1 << 3;
        }
        if self.seo {
            v |= 1 << 4;
        }
        v
    }
}

/// Names of the PAL-addressable Mbox registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MboxIpr {
    /// DTB tag write port 0.
    DtbTag0,
    /// DTB tag write port 1.
    DtbTag1,
    /// DTB PTE write port 0.
    DtbPte0,
    /// DTB PTE write port 1.
    DtbPte1,
    /// Alternate-mode register for PALmode loads and stores.
    DtbAltMode,
    /// DTB invalidate single, port 0.
    DtbIs0,
    /// DTB invalidate single, port 1.
    DtbIs1,
    /// Address space number, port 0.
    DtbAsn0,
    /// Address space number, port 1.
    DtbAsn1,
    /// Memory-management fault status.
    MmStat,
    /// Mbox control.
    MCtl,
    /// Dcache control.
    DcCtl,
    /// Dcache status.
    DcStat,
}

/// Architectural side effect of an IPR write, to be applied by the Mbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IprEffect {
    /// No side effect beyond the latch.
    None,
    /// A PTE write paired with the latched tag: fill a DTB entry.
    FillDtb {
        /// Latched virtual tag.
        tag: u64,
        /// Raw PTE value.
        pte: u64,
        /// ASN the fill belongs to.
        asn: u8,
    },
    /// Invalidate the DTB entries matching a virtual address.
    InvalidateSingle {
        /// Virtual address to invalidate.
        va: u64,
    },
    /// Way-enable mask changed; the Dcache must be told.
    WayEnable {
        /// New mask.
        set_en: u8,
    },
}

/// The Mbox IPR file.
///
/// Reset values follow the architecture: both Dcache ways enabled, the
/// alternate mode kernel, everything else clear.
#[derive(Clone, Copy, Debug, Default)]
pub struct IprFile {
    /// DTB tag latch 0.
    pub dtb_tag0: DtbTag,
    /// DTB tag latch 1.
    pub dtb_tag1: DtbTag,
    /// DTB PTE port 0.
    pub dtb_pte0: DtbPte,
    /// DTB PTE port 1.
    pub dtb_pte1: DtbPte,
    /// Alternate processor mode for PALmode accesses.
    pub dtb_alt_mode: ProcessorMode,
    /// Address space number, port 0.
    pub dtb_asn0: u8,
    /// Address space number, port 1.
    pub dtb_asn1: u8,
    /// Memory-management fault status.
    pub mm_stat: MmStat,
    /// Mbox control.
    pub m_ctl: MCtl,
    /// Dcache control.
    pub dc_ctl: DcCtl,
    /// Dcache status.
    pub dc_stat: DcStat,
}

impl IprFile {
    /// Returns the file at architectural reset.
    pub fn new() -> Self {
        Self::default()
    }

    /// PAL read of a register.
    pub fn read(&self, reg: MboxIpr) -> u64 {
        match reg {
            MboxIpr::DtbTag0 => self.dtb_tag0.va,
            MboxIpr::DtbTag1 => self.dtb_tag1.va,
            MboxIpr::DtbPte0 => self.dtb_pte0.read(),
            MboxIpr::DtbPte1 => self.dtb_pte1.read(),
            MboxIpr::DtbAltMode => self.dtb_alt_mode as u64,
            MboxIpr::DtbIs0 | MboxIpr::DtbIs1 => 0,
            MboxIpr::DtbAsn0 => self.dtb_asn0 as u64,
            MboxIpr::DtbAsn1 => self.dtb_asn1 as u64,
            MboxIpr::MmStat => self.mm_stat.read(),
            MboxIpr::MCtl => self.m_ctl.read(),
            MboxIpr::DcCtl => self.dc_ctl.read(),
            MboxIpr::DcStat => self.dc_stat.read(),
        }
    }

    /// PAL write of a register, returning the architectural side effect.
    ///
    /// A PTE write consumes the tag latched by the paired tag port, which
    /// is how PALcode fills the DTB two registers at a time.
    pub fn write(&mut self, reg: MboxIpr, value: u64) -> IprEffect {
        match reg {
            MboxIpr::DtbTag0 => {
                self.dtb_tag0.write(value);
                IprEffect::None
            }
            MboxIpr::DtbTag1 => {
                self.dtb_tag1.write(value);
                IprEffect::None
            }
            MboxIpr::DtbPte0 => {
                self.dtb_pte0.write(value);
                IprEffect::FillDtb {
                    tag: self.dtb_tag0.va,
                    pte: value,
                    asn: self.dtb_asn0,
                }
            }
            MboxIpr::DtbPte1 => {
                self.dtb_pte1.write(value);
                IprEffect::FillDtb {
                    tag: self.dtb_tag1.va,
                    pte: value,
                    asn: self.dtb_asn1,
                }
            }
            MboxIpr::DtbAltMode => {
                self.dtb_alt_mode = ProcessorMode::from_bits(value);
                IprEffect::None
            }
            MboxIpr::DtbIs0 | MboxIpr::DtbIs1 => IprEffect::InvalidateSingle { va: value },
            MboxIpr::DtbAsn0 => {
                self.dtb_asn0 = (value & 0xFF) as u8;
                IprEffect::None
            }
            MboxIpr::DtbAsn1 => {
                self.dtb_asn1 = (value & 0xFF) as u8;
                IprEffect::None
            }
            MboxIpr::MmStat => IprEffect::None,
            MboxIpr::MCtl => {
                self.m_ctl.write(value);
                IprEffect::None
            }
            MboxIpr::DcCtl => {
                self.dc_ctl.write(value);
                IprEffect::WayEnable {
                    set_en: self.dc_ctl.set_en,
                }
            }
            MboxIpr::DcStat => IprEffect::None,
        }
    }
}
