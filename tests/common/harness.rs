use std::sync::Arc;

use axp_core::common::addr::{PhysAddr, VirtAddr};
use axp_core::common::constants::{CACHE_LINE_LEN, MBOX_QUEUE_LEN, PAGE_SHIFT};
use axp_core::config::MboxConfig;
use axp_core::insn::{InflightWindow, InstrHandle, InstrState, Instruction, Opcode};
use axp_core::mbox::ipr::MboxIpr;
use axp_core::mbox::Mbox;

use super::mocks::ibox::RecordingIbox;

/// PTE bit positions, as the DTB write port decodes them.
const PTE_VALID: u64 = 1 << 0;
const PTE_FOR: u64 = 1 << 1;
const PTE_FOW: u64 = 1 << 2;
const PTE_ASM: u64 = 1 << 4;
const PTE_KRE: u64 = 1 << 8;
const PTE_KWE: u64 = 1 << 12;

pub struct TestContext {
    pub mbox: Arc<Mbox>,
    pub window: Arc<InflightWindow>,
    pub ibox: Arc<RecordingIbox>,
    next_uid: u64,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(MboxConfig::default())
    }

    pub fn with_config(config: MboxConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let window = Arc::new(InflightWindow::new(64));
        let ibox = Arc::new(RecordingIbox::new());
        let mbox = Mbox::new(
            config,
            Arc::clone(&window),
            Arc::clone(&ibox) as Arc<dyn axp_core::mbox::IboxSink>,
        )
        .expect("mbox init");

        Self {
            mbox,
            window,
            ibox,
            next_uid: 1,
        }
    }

    /// Runs one scheduler pass.
    pub fn process(&self) {
        self.mbox.process_once();
    }

    // ─── PAL helpers ─────────────────────────────────────────

    /// Maps one page kernel read/write through the DTB write ports.
    pub fn map_page(&self, va: u64, pfn: u64) {
        self.map_page_raw(va, (pfn << 32) | PTE_VALID | PTE_KRE | PTE_KWE);
    }

    /// Maps one page with an explicit raw PTE.
    pub fn map_page_raw(&self, va: u64, pte: u64) {
        self.mbox.write_ipr(MboxIpr::DtbTag0, va);
        self.mbox.write_ipr(MboxIpr::DtbPte0, pte);
    }

    /// Identity-maps the page holding `va`.
    pub fn map_identity(&self, va: u64) {
        self.map_page(va, va >> PAGE_SHIFT);
    }

    /// Maps the page holding `va` into the MMIO region and returns the
    /// physical address `va` translates to.
    pub fn map_io(&self, va: u64) -> u64 {
        let pfn = (1u64 << (43 - PAGE_SHIFT)) | (va >> PAGE_SHIFT);
        self.map_page(va, pfn);
        (pfn << PAGE_SHIFT) | (va & ((1 << PAGE_SHIFT) - 1))
    }

    /// Raw PTE value for a readable page with fault-on-write set.
    pub fn pte_fow(pfn: u64) -> u64 {
        (pfn << 32) | PTE_VALID | PTE_KRE | PTE_KWE | PTE_FOW
    }

    /// Raw PTE value for a readable page with fault-on-read set.
    pub fn pte_for(pfn: u64) -> u64 {
        (pfn << 32) | PTE_VALID | PTE_KRE | PTE_KWE | PTE_FOR
    }

    /// Raw PTE value carrying the address-space-match bit.
    pub fn pte_asm(pfn: u64) -> u64 {
        (pfn << 32) | PTE_VALID | PTE_KRE | PTE_KWE | PTE_ASM
    }

    // ─── Memory seeding (standing in for the Cbox/system) ────

    /// Installs `value` at `pa` in the Bcache, merging into the existing
    /// line if one is resident.
    pub fn seed_bcache(&self, pa: u64, len: usize, value: u64) {
        let caches = self.mbox.caches();
        let mut caches = caches.lock();
        let paddr = PhysAddr::new(pa);
        let base = PhysAddr::new(paddr.line_base());
        let mut line = caches.bcache.read_line(base).unwrap_or([0; CACHE_LINE_LEN]);
        let offset = paddr.line_offset();
        for i in 0..len {
            line[offset + i] = (value >> (i * 8)) as u8;
        }
        caches.bcache.fill(base, line);
    }

    /// Reads `len` bytes at `pa` out of the Bcache, or `None` if the line
    /// is absent.
    pub fn read_bcache(&self, pa: u64, len: usize) -> Option<u64> {
        let caches = self.mbox.caches();
        let caches = caches.lock();
        let paddr = PhysAddr::new(pa);
        let line = caches.bcache.read_line(PhysAddr::new(paddr.line_base()))?;
        let offset = paddr.line_offset();
        let mut v = 0u64;
        for i in (0..len).rev() {
            v = (v << 8) | line[offset + i] as u64;
        }
        Some(v)
    }

    /// A coherence write from another agent: the line leaves both caches.
    pub fn coherence_write(&self, pa: u64) {
        let caches = self.mbox.caches();
        let mut caches = caches.lock();
        caches.system_write(PhysAddr::new(pa));
    }

    // ─── Issue helpers (standing in for the Ebox) ────────────

    fn take_uid(&mut self) -> u64 {
        let uid = self.next_uid;
        self.next_uid = uid + 1;
        uid
    }

    /// Issues a load: window insert, slot reservation, publication.
    pub fn issue_load(&mut self, opcode: Opcode, va: u64) -> (InstrHandle, u32) {
        let uid = self.take_uid();
        self.issue_load_uid(opcode, va, uid)
    }

    /// Issues a load with an explicit program-order tag.
    pub fn issue_load_uid(&mut self, opcode: Opcode, va: u64, uid: u64) -> (InstrHandle, u32) {
        self.next_uid = self.next_uid.max(uid + 1);
        let mut instr = Instruction::new(opcode, 0x1_0000 + uid * 4, uid);
        instr.state = InstrState::WaitingForCompletion;
        let handle = self.window.insert(instr).expect("window full");
        let slot = self.mbox.get_lq_slot();
        assert_ne!(slot, MBOX_QUEUE_LEN as u32, "load queue exhausted");
        self.mbox.read_mem(handle, slot, VirtAddr::new(va));
        (handle, slot)
    }

    /// Issues a store: window insert, slot reservation, publication.
    pub fn issue_store(&mut self, opcode: Opcode, va: u64, value: u64) -> (InstrHandle, u32) {
        let uid = self.take_uid();
        self.issue_store_uid(opcode, va, value, uid)
    }

    /// Issues a store with an explicit program-order tag.
    pub fn issue_store_uid(
        &mut self,
        opcode: Opcode,
        va: u64,
        value: u64,
        uid: u64,
    ) -> (InstrHandle, u32) {
        self.next_uid = self.next_uid.max(uid + 1);
        let mut instr = Instruction::new(opcode, 0x2_0000 + uid * 4, uid);
        instr.src2v = value;
        instr.state = InstrState::WaitingForCompletion;
        let handle = self.window.insert(instr).expect("window full");
        let slot = self.mbox.get_sq_slot();
        assert_ne!(slot, MBOX_QUEUE_LEN as u32, "store queue exhausted");
        self.mbox.write_mem(handle, slot, VirtAddr::new(va), value);
        (handle, slot)
    }

    /// Publishes, translates, retires, and commits a store in one step.
    /// The line must already be reachable (seeded Bcache or resident).
    pub fn complete_store(&mut self, opcode: Opcode, va: u64, value: u64) {
        let (handle, slot) = self.issue_store(opcode, va, value);
        self.process();
        self.mbox.retire_store(slot);
        self.mbox.apply_retirement(handle);
        self.process();
    }

    // ─── Inspection ──────────────────────────────────────────

    pub fn destv(&self, handle: InstrHandle) -> u64 {
        self.window.with(handle, |i| i.destv).expect("instr gone")
    }

    pub fn instr_state(&self, handle: InstrHandle) -> InstrState {
        self.window.with(handle, |i| i.state).expect("instr gone")
    }
}
