//! The memory pipeline (Mbox).
//!
//! The Mbox owns the load and store queues and drives every in-flight
//! memory reference from publication to retirement readiness. It provides:
//! 1. **Slot allocation:** Program-order LQ/SQ slots with a full-queue sentinel.
//! 2. **State machines:** Per-entry progressions covering translation,
//!    forwarding, cache probes, miss dispatch, and commit.
//! 3. **Scheduling:** A single cooperative worker parked on a condition
//!    variable; producers signal after every queue mutation.
//! 4. **External interface:** Retirement and revocation from the Ibox,
//!    fill and I/O completions from the Cbox, and the PAL IPR surface.
//!
//! Locking: the `lq`/`sq` allocator mutexes only serialize slot handout;
//! everything else lives under the state mutex paired with the condition
//! variable. Allocation takes an allocator mutex before the state mutex;
//! the cache mutex is always innermost. Callers must never invoke Mbox
//! operations while holding the cache lock.

use std::sync::Arc;
use std::thread;

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::cache::{CacheStatus, Caches};
use crate::cbox::{IoWriteBuffer, MissAddressFile, MissKind};
use crate::common::addr::{PhysAddr, VirtAddr};
use crate::common::constants::MBOX_QUEUE_LEN;
use crate::common::error::{AccessKind, MboxInitError, MemoryFault};
use crate::config::MboxConfig;
use crate::insn::{Extension, InflightWindow, InstrHandle, InstrState, Opcode};
use crate::stats::MboxStats;

pub mod dtb;
pub mod forward;
pub mod ipr;
pub mod queue;

use dtb::Dtb;
use forward::{forward_from_stores, ForwardResult};
use ipr::{IprEffect, IprFile, MboxIpr, ProcessorMode};
use queue::{LqEntry, LqState, SlotAllocator, SqEntry, SqState};

/// A memory-management event reported up to the Ibox.
///
/// The Ibox turns these into DTB-miss or DFAULT PAL entries; the queue
/// entry that raised one has already been discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IboxEvent {
    /// The fault being reported.
    pub fault: MemoryFault,
    /// Program counter of the faulting instruction.
    pub pc: u64,
    /// Faulting virtual address.
    pub va: u64,
    /// Opcode of the faulting instruction.
    pub opcode: Opcode,
    /// Destination register of the faulting instruction.
    pub a_dest: u8,
    /// The access was a load.
    pub read: bool,
    /// The access was a store.
    pub write: bool,
}

/// The Ibox side of the fault interface.
pub trait IboxSink: Send + Sync {
    /// Delivers a memory-management event.
    fn memory_event(&self, event: IboxEvent);
}

/// CPU lock-flag state backing load-locked / store-conditional.
#[derive(Clone, Copy, Debug, Default)]
struct LockState {
    flag: bool,
    phys: PhysAddr,
    virt: VirtAddr,
}

/// Everything guarded by the Mbox state mutex.
struct MboxState {
    lq: [LqEntry; MBOX_QUEUE_LEN],
    sq: [SqEntry; MBOX_QUEUE_LEN],
    dtb: Dtb,
    iprs: IprFile,
    maf: MissAddressFile,
    iowb: IoWriteBuffer,
    lock: LockState,
    mode: ProcessorMode,
    stats: MboxStats,
    work_pending: bool,
    shutdown: bool,
}

impl MboxState {
    fn new() -> Self {
        Self {
            lq: [LqEntry::default(); MBOX_QUEUE_LEN],
            sq: [SqEntry::default(); MBOX_QUEUE_LEN],
            dtb: Dtb::new(),
            iprs: IprFile::new(),
            maf: MissAddressFile::new(),
            iowb: IoWriteBuffer::new(),
            lock: LockState::default(),
            mode: ProcessorMode::Kernel,
            stats: MboxStats::default(),
            work_pending: false,
            shutdown: false,
        }
    }
}

/// The memory pipeline of one CPU.
pub struct Mbox {
    config: MboxConfig,
    window: Arc<InflightWindow>,
    ibox: Arc<dyn IboxSink>,
    caches: Arc<Mutex<Caches>>,
    lq_alloc: Mutex<SlotAllocator>,
    sq_alloc: Mutex<SlotAllocator>,
    state: Mutex<MboxState>,
    cond: Condvar,
}

impl Mbox {
    /// Brings up the Mbox for one CPU: caches invalid, queues empty, DTB
    /// clear, MAF and IOWB free, IPRs at architectural reset.
    ///
    /// This is the sole fatal-error surface of the memory pipeline; once it
    /// returns `Ok`, every later problem is reported through Ibox events or
    /// instruction results.
    pub fn new(
        config: MboxConfig,
        window: Arc<InflightWindow>,
        ibox: Arc<dyn IboxSink>,
    ) -> Result<Arc<Self>, MboxInitError> {
        let caches = Caches::new(&config.bcache)?;
        Ok(Arc::new(Self {
            config,
            window,
            ibox,
            caches: Arc::new(Mutex::new(caches)),
            lq_alloc: Mutex::new(SlotAllocator::new()),
            sq_alloc: Mutex::new(SlotAllocator::new()),
            state: Mutex::new(MboxState::new()),
            cond: Condvar::new(),
        }))
    }

    /// Shared handle to the cache pair, for the system side (Cbox fills,
    /// coherence probes).
    pub fn caches(&self) -> Arc<Mutex<Caches>> {
        Arc::clone(&self.caches)
    }

    /// Sets the processor mode data-stream accesses execute in.
    pub fn set_mode(&self, mode: ProcessorMode) {
        self.state.lock().mode = mode;
    }

    /// Snapshot of the behavioral counters.
    pub fn stats(&self) -> MboxStats {
        self.state.lock().stats
    }

    /// Whether the CPU lock flag is currently set.
    pub fn lock_flag(&self) -> bool {
        self.state.lock().lock.flag
    }

    // ─── Slot allocation ─────────────────────────────────────

    /// Reserves the next load queue slot in program order.
    ///
    /// Returns `MBOX_QUEUE_LEN` when the queue is full; the caller stalls
    /// its own issue and retries.
    pub fn get_lq_slot(&self) -> u32 {
        let mut alloc = self.lq_alloc.lock();
        let mut st = self.state.lock();
        let drained = st.lq.iter().all(|e| e.state == LqState::NotInUse);
        match alloc.allocate(drained) {
            Some(slot) => {
                st.lq[slot].state = LqState::Assigned;
                slot as u32
            }
            None => MBOX_QUEUE_LEN as u32,
        }
    }

    /// Reserves the next store queue slot in program order.
    ///
    /// Returns `MBOX_QUEUE_LEN` when the queue is full.
    pub fn get_sq_slot(&self) -> u32 {
        let mut alloc = self.sq_alloc.lock();
        let mut st = self.state.lock();
        let drained = st.sq.iter().all(|e| e.state == SqState::NotInUse);
        match alloc.allocate(drained) {
            Some(slot) => {
                st.sq[slot].state = SqState::Assigned;
                slot as u32
            }
            None => MBOX_QUEUE_LEN as u32,
        }
    }

    // ─── Publication ─────────────────────────────────────────

    /// Publishes a load into its reserved LQ slot and wakes the scheduler.
    pub fn read_mem(&self, instr: InstrHandle, slot: u32, virt: VirtAddr) {
        let mut st = self.state.lock();
        let unique_id = self.window.with(instr, |i| i.unique_id).unwrap_or(0);
        let entry = &mut st.lq[slot as usize];
        entry.virt = virt;
        entry.instr = Some(instr);
        entry.unique_id = unique_id;
        entry.state = LqState::Initial;
        trace!("lq[{}] published va={:#x} uid={}", slot, virt.val(), unique_id);
        self.signal(&mut st);
    }

    /// Publishes a store into its reserved SQ slot and wakes the scheduler.
    pub fn write_mem(&self, instr: InstrHandle, slot: u32, virt: VirtAddr, value: u64) {
        let mut st = self.state.lock();
        let unique_id = self.window.with(instr, |i| i.unique_id).unwrap_or(0);
        let entry = &mut st.sq[slot as usize];
        entry.value = value;
        entry.virt = virt;
        entry.instr = Some(instr);
        entry.unique_id = unique_id;
        entry.state = SqState::Initial;
        trace!("sq[{}] published va={:#x} uid={}", slot, virt.val(), unique_id);
        self.signal(&mut st);
    }

    // ─── Ibox interface ──────────────────────────────────────

    /// The owning store instruction has retired; the store may now become
    /// globally visible.
    pub fn retire_store(&self, slot: u32) {
        let mut st = self.state.lock();
        let entry = &mut st.sq[slot as usize];
        match entry.state {
            SqState::WritePending => {
                entry.state = SqState::Ready;
                trace!("sq[{}] ready to commit", slot);
                self.signal(&mut st);
            }
            // Retirement raced ahead of translation; latch it for the
            // scheduler to consume.
            SqState::Assigned | SqState::Initial => {
                entry.retired = true;
                self.signal(&mut st);
            }
            _ => {}
        }
    }

    /// Squashes a queue entry with no architectural effect.
    ///
    /// Any outstanding MAF or IOWB reference to the slot is orphaned and
    /// its eventual completion dropped.
    pub fn revoke_slot(&self, kind: MissKind, slot: u32) {
        let mut st = self.state.lock();
        let slot = slot as usize;
        match kind {
            MissKind::Ldx => st.lq[slot].clear(),
            MissKind::Stx => st.sq[slot].clear(),
        }
        st.maf.orphan_slot(kind, slot);
        st.iowb.orphan_slot(kind, slot);
        st.stats.revoked += 1;
        debug!("{:?} slot {} revoked", kind, slot);
        self.signal(&mut st);
    }

    /// Applies pending lock-flag effects as the Ibox retires `instr`.
    ///
    /// A load-locked establishes the lock flag here; a store-conditional
    /// consumed it at commit, so only bookkeeping remains.
    pub fn apply_retirement(&self, instr: InstrHandle) {
        let mut st = self.state.lock();
        let pending = self.window.with_mut(instr, |i| {
            i.state = InstrState::Retired;
            let p = (
                i.lock_flag_pending,
                i.lock_phys_addr_pending,
                i.lock_virt_addr_pending,
                i.clear_lock_pending,
            );
            i.lock_flag_pending = false;
            i.clear_lock_pending = false;
            p
        });
        if let Some((lock_pending, pa, va, clear_pending)) = pending {
            if lock_pending {
                st.lock = LockState {
                    flag: true,
                    phys: PhysAddr::new(pa),
                    virt: VirtAddr::new(va),
                };
                trace!("lock flag established at pa={:#x}", pa);
            }
            if clear_pending {
                st.lock.flag = false;
            }
        }
    }

    // ─── Cbox interface ──────────────────────────────────────

    /// A MAF fill has landed in the cache hierarchy; the waiting queue
    /// entry re-probes on the next scheduler pass.
    pub fn maf_complete(&self, index: usize) {
        let mut st = self.state.lock();
        if let Some((kind, slot)) = st.maf.complete(index) {
            st.stats.maf_completed += 1;
            trace!("maf[{}] complete for {:?} slot {}", index, kind, slot);
            self.signal(&mut st);
        }
    }

    /// The system has acknowledged an IOWB entry.
    ///
    /// `read_data` carries the device data for an MMIO load and is ignored
    /// for stores.
    pub fn iowb_complete(&self, index: usize, read_data: Option<u64>) {
        let mut st = self.state.lock();
        let Some((kind, slot, data)) = st.iowb.complete(index, read_data) else {
            return;
        };
        st.stats.iowb_completed += 1;
        match kind {
            MissKind::Ldx => {
                let entry = &mut st.lq[slot];
                if entry.state == LqState::ReadPending && entry.io_flag {
                    entry.value = data;
                    entry.forwarded = true;
                }
            }
            MissKind::Stx => {
                let entry = &mut st.sq[slot];
                if entry.state == SqState::Ready && entry.io_flag {
                    entry.state = SqState::Complete;
                }
            }
        }
        trace!("iowb[{}] complete for {:?} slot {}", index, kind, slot);
        self.signal(&mut st);
    }

    /// Live MAF entries, as the Cbox sees them when picking up work.
    pub fn maf_pending(&self) -> Vec<(usize, crate::cbox::MafEntry)> {
        let st = self.state.lock();
        (0..crate::common::constants::MAF_LEN)
            .filter_map(|i| st.maf.entry(i).map(|e| (i, *e)))
            .collect()
    }

    /// Live IOWB entries, as the Cbox sees them.
    pub fn iowb_pending(&self) -> Vec<(usize, crate::cbox::IowbEntry)> {
        let st = self.state.lock();
        let mut out = Vec::new();
        for i in 0..crate::common::constants::IOWB_LEN {
            if let Some(e) = st.iowb.entry(i) {
                out.push((i, *e));
            }
        }
        out
    }

    /// State of a load queue slot.
    pub fn lq_state(&self, slot: u32) -> LqState {
        self.state.lock().lq[slot as usize].state
    }

    /// State of a store queue slot.
    pub fn sq_state(&self, slot: u32) -> SqState {
        self.state.lock().sq[slot as usize].state
    }

    // ─── PAL IPR surface ─────────────────────────────────────

    /// PAL read of an Mbox register.
    pub fn read_ipr(&self, reg: MboxIpr) -> u64 {
        self.state.lock().iprs.read(reg)
    }

    /// PAL write of an Mbox register, applying its side effect.
    pub fn write_ipr(&self, reg: MboxIpr, value: u64) {
        let mut st = self.state.lock();
        let effect = st.iprs.write(reg, value);
        match effect {
            IprEffect::FillDtb { tag, pte, asn } => st.dtb.fill(tag, pte, asn),
            IprEffect::InvalidateSingle { va } => st.dtb.invalidate_single(VirtAddr::new(va)),
            IprEffect::WayEnable { set_en } => self.caches.lock().dcache.set_way_enable(set_en),
            IprEffect::None => {}
        }
        // The DTB shadows the ASN and superpage enables.
        let asn = st.iprs.dtb_asn0;
        let spe = st.iprs.m_ctl.spe;
        st.dtb.set_asn(asn);
        st.dtb.set_spe(spe);
    }

    // ─── Scheduler ───────────────────────────────────────────

    /// Runs one full scheduler pass synchronously.
    pub fn process_once(&self) {
        let mut st = self.state.lock();
        st.work_pending = false;
        self.process_queues(&mut st);
    }

    /// Spawns the cooperative worker thread.
    ///
    /// The worker parks on the condition variable and runs one full pass
    /// per wakeup; it never spins.
    pub fn spawn_worker(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let mbox = Arc::clone(self);
        thread::spawn(move || mbox.run())
    }

    /// Stops the worker thread.
    pub fn shutdown(&self) {
        let mut st = self.state.lock();
        st.shutdown = true;
        self.cond.notify_all();
    }

    fn run(&self) {
        let mut st = self.state.lock();
        loop {
            while !st.work_pending && !st.shutdown {
                self.cond.wait(&mut st);
            }
            if st.shutdown {
                break;
            }
            st.work_pending = false;
            self.process_queues(&mut st);
        }
        debug!("mbox worker stopped");
    }

    /// Wakes the worker. Called with the state lock held.
    fn signal(&self, st: &mut MboxState) {
        st.work_pending = true;
        self.cond.notify_one();
    }

    /// One full pass: walk the LQ, then the SQ, finalizing any entry that
    /// completes within the pass.
    fn process_queues(&self, st: &mut MboxState) {
        st.stats.scheduler_passes += 1;

        for slot in 0..MBOX_QUEUE_LEN {
            match st.lq[slot].state {
                LqState::Initial => self.lq_init(st, slot),
                LqState::ReadPending => self.lq_pending(st, slot),
                _ => {}
            }
            if st.lq[slot].state == LqState::Complete {
                self.lq_complete(st, slot);
            }
        }

        for slot in 0..MBOX_QUEUE_LEN {
            match st.sq[slot].state {
                SqState::Initial => self.sq_init(st, slot),
                SqState::Ready => self.sq_commit(st, slot),
                _ => {}
            }
            if st.sq[slot].state == SqState::Complete {
                self.sq_complete(st, slot);
            }
        }
    }

    // ─── LQ state machine ────────────────────────────────────

    /// First touch of a published load: width, alignment, translation,
    /// MMIO classification, then straight into the pending work.
    fn lq_init(&self, st: &mut MboxState, slot: usize) {
        let Some(handle) = st.lq[slot].instr else {
            st.lq[slot].clear();
            return;
        };
        let Some((opcode, pc, a_dest)) =
            self.window.with(handle, |i| (i.opcode, i.pc, i.a_dest))
        else {
            // The instruction died under us; the entry dies with it.
            st.lq[slot].clear();
            return;
        };

        let len = opcode.width();
        let va = st.lq[slot].virt;
        st.lq[slot].len = len;
        st.lq[slot].lock_cond = opcode.is_load_locked();

        if opcode.requires_alignment() && va.val() % len as u64 != 0 {
            self.raise_fault(st, MemoryFault::Alignment(va.val()), pc, opcode, a_dest, false);
            st.lq[slot].clear();
            return;
        }

        // PALmode loads translate in the alternate mode, everything else in
        // the current mode.
        let mode = match opcode {
            Opcode::HwLd { .. } => st.iprs.dtb_alt_mode,
            _ => st.mode,
        };

        match st.dtb.translate(va, AccessKind::Read, mode) {
            Ok(t) => {
                st.lq[slot].phys = Some(t.paddr);
                st.lq[slot].io_flag = self.is_io(t.paddr);
                st.lq[slot].state = LqState::ReadPending;
                trace!("lq[{}] translated {:#x} -> {:#x}", slot, va.val(), t.paddr.val());
                self.lq_pending(st, slot);
            }
            Err(fault) => {
                self.raise_fault(st, fault, pc, opcode, a_dest, false);
                st.lq[slot].clear();
            }
        }
    }

    /// Drives a translated load toward completion: I/O dispatch, store
    /// forwarding, then the cache probe protocol.
    fn lq_pending(&self, st: &mut MboxState, slot: usize) {
        if st.lq[slot].io_flag {
            self.lq_pending_io(st, slot);
            return;
        }

        let (va, len, unique_id, lock_cond) = {
            let e = &st.lq[slot];
            (e.virt, e.len, e.unique_id, e.lock_cond)
        };

        match forward_from_stores(&st.sq, va, len, unique_id) {
            ForwardResult::Conflict => {
                // An older store overlaps without covering. Touch nothing.
                st.stats.forward_conflicts += 1;
            }
            ForwardResult::Hit { slot: sq_slot, value } => {
                st.stats.forward_hits += 1;
                trace!("lq[{}] forwarded from sq[{}]", slot, sq_slot);
                if lock_cond {
                    // The forwarded value stands, but the line lock must
                    // still be registered against the cache.
                    st.lq[slot].value = value;
                    st.lq[slot].forwarded = true;
                    self.try_caches(st, slot);
                } else {
                    self.finish_load(st, slot, value);
                }
            }
            ForwardResult::Miss => self.try_caches(st, slot),
        }
    }

    /// MMIO load: park in the IOWB and complete when the data comes back.
    fn lq_pending_io(&self, st: &mut MboxState, slot: usize) {
        if st.lq[slot].forwarded {
            // The acknowledgement already delivered the device data.
            let value = st.lq[slot].value;
            self.finish_load(st, slot, value);
            return;
        }
        if st.iowb.outstanding_for(MissKind::Ldx, slot).is_none() {
            let (pa, len) = (st.lq[slot].phys.unwrap_or_default(), st.lq[slot].len);
            if st.iowb.add(MissKind::Ldx, pa, slot, 0, len).is_some() {
                st.stats.iowb_allocated += 1;
                trace!("lq[{}] waiting on iowb read {:#x}", slot, pa.val());
            }
            // A full IOWB leaves the entry pending; retried next pass.
        }
    }

    /// The cache probe protocol for a pending memory load.
    ///
    /// Dcache hit reads straight out; a Bcache hit fills the Dcache first;
    /// a double miss parks the entry in the MAF.
    fn try_caches(&self, st: &mut MboxState, slot: usize) {
        let (va, len, lock_cond, forwarded, scratch) = {
            let e = &st.lq[slot];
            (e.virt, e.len, e.lock_cond, e.forwarded, e.value)
        };
        let Some(pa) = st.lq[slot].phys else {
            st.lq[slot].clear();
            return;
        };

        let mut caches = self.caches.lock();

        if caches.dcache.status(va, pa) == CacheStatus::Miss {
            st.stats.dcache_misses += 1;
            if caches.bcache.status(pa) == CacheStatus::Miss {
                st.stats.bcache_misses += 1;
                drop(caches);
                // Double miss: hand the line to the Cbox, once.
                if st.maf.outstanding_for(MissKind::Ldx, slot).is_none()
                    && st.maf.add(MissKind::Ldx, pa, slot, 0, len).is_some()
                {
                    st.stats.maf_allocated += 1;
                    trace!("lq[{}] miss parked in maf, pa={:#x}", slot, pa.val());
                }
                return;
            }
            st.stats.bcache_hits += 1;
            match caches.copy_bcache_to_dcache(va, pa) {
                Some(evicted) => {
                    st.stats.dcache_fills += 1;
                    if evicted {
                        st.stats.dcache_evictions += 1;
                    }
                }
                None => {
                    drop(caches);
                    return;
                }
            }
        } else {
            st.stats.dcache_hits += 1;
        }

        let Some(read) = caches.dcache.read(va, pa, len) else {
            return;
        };
        if lock_cond {
            caches.dcache.lock_line(va, pa);
        }
        drop(caches);

        // A forwarded value is younger than the line just read.
        let raw = if forwarded { scratch } else { read };
        self.finish_load(st, slot, raw);
    }

    /// Materializes the load result and marks the entry complete.
    fn finish_load(&self, st: &mut MboxState, slot: usize, raw: u64) {
        let Some(handle) = st.lq[slot].instr else {
            st.lq[slot].clear();
            return;
        };
        let (va, len, lock_cond) = {
            let e = &st.lq[slot];
            (e.virt, e.len, e.lock_cond)
        };
        let pa = st.lq[slot].phys.unwrap_or_default();

        let big_endian = self.config.big_endian;
        self.window.with_mut(handle, |i| {
            i.destv = extract_value(raw, len, i.opcode.extension(), big_endian);
            if lock_cond {
                i.lock_flag_pending = true;
                i.lock_phys_addr_pending = pa.val();
                i.lock_virt_addr_pending = va.val();
            }
        });
        st.lq[slot].state = LqState::Complete;
    }

    /// Finalizes a completed load: hand the instruction back to the Ibox
    /// and reclaim the slot.
    fn lq_complete(&self, st: &mut MboxState, slot: usize) {
        if let Some(handle) = st.lq[slot].instr {
            self.window.with_mut(handle, |i| {
                i.state = InstrState::WaitingRetirement;
            });
        }
        trace!("lq[{}] complete", slot);
        st.lq[slot].clear();
    }

    // ─── SQ state machine ────────────────────────────────────

    /// First touch of a published store: width, alignment, translation.
    /// The entry then waits for its instruction to retire.
    fn sq_init(&self, st: &mut MboxState, slot: usize) {
        let Some(handle) = st.sq[slot].instr else {
            st.sq[slot].clear();
            return;
        };
        let Some((opcode, pc, a_dest)) =
            self.window.with(handle, |i| (i.opcode, i.pc, i.a_dest))
        else {
            st.sq[slot].clear();
            return;
        };

        let len = opcode.width();
        let va = st.sq[slot].virt;
        st.sq[slot].len = len;
        st.sq[slot].lock_cond = opcode.is_store_conditional();

        if opcode.requires_alignment() && va.val() % len as u64 != 0 {
            self.raise_fault(st, MemoryFault::Alignment(va.val()), pc, opcode, a_dest, true);
            st.sq[slot].clear();
            return;
        }

        match st.dtb.translate(va, AccessKind::Write, st.mode) {
            Ok(t) => {
                st.sq[slot].phys = Some(t.paddr);
                st.sq[slot].io_flag = self.is_io(t.paddr);
                st.sq[slot].state = if st.sq[slot].retired {
                    SqState::Ready
                } else {
                    SqState::WritePending
                };
                trace!("sq[{}] translated {:#x} -> {:#x}", slot, va.val(), t.paddr.val());
                if st.sq[slot].state == SqState::Ready {
                    self.sq_commit(st, slot);
                }
            }
            Err(fault) => {
                self.raise_fault(st, fault, pc, opcode, a_dest, true);
                st.sq[slot].clear();
            }
        }
    }

    /// Commits a retired store to the memory system.
    ///
    /// Store-conditionals are evaluated here, where the coherence state of
    /// the locked line can actually be observed.
    fn sq_commit(&self, st: &mut MboxState, slot: usize) {
        let (va, len, value, lock_cond, io_flag) = {
            let e = &st.sq[slot];
            (e.virt, e.len, e.value, e.lock_cond, e.io_flag)
        };
        let Some(pa) = st.sq[slot].phys else {
            st.sq[slot].clear();
            return;
        };

        if lock_cond && !self.sc_succeeds(st, va, pa) {
            // Failed store-conditional: result 0, no memory effect, lock
            // flag consumed.
            if let Some(handle) = st.sq[slot].instr {
                self.window.with_mut(handle, |i| {
                    i.destv = 0;
                    i.clear_lock_pending = true;
                });
            }
            st.lock.flag = false;
            st.stats.sc_failure += 1;
            st.sq[slot].state = SqState::Complete;
            debug!("sq[{}] store-conditional failed", slot);
            return;
        }

        if io_flag {
            // MMIO store: hand to the IOWB and wait for the acknowledgement.
            if st.iowb.outstanding_for(MissKind::Stx, slot).is_none()
                && st.iowb.add(MissKind::Stx, pa, slot, value, len).is_some()
            {
                st.stats.iowb_allocated += 1;
                trace!("sq[{}] waiting on iowb write {:#x}", slot, pa.val());
            }
            return;
        }

        let mut caches = self.caches.lock();
        if caches.dcache.status(va, pa) == CacheStatus::Miss {
            st.stats.dcache_misses += 1;
            if caches.bcache.status(pa) == CacheStatus::Miss {
                st.stats.bcache_misses += 1;
                drop(caches);
                // Write-allocate through the MAF; the commit retries once
                // the fill lands.
                if st.maf.outstanding_for(MissKind::Stx, slot).is_none()
                    && st.maf.add(MissKind::Stx, pa, slot, value, len).is_some()
                {
                    st.stats.maf_allocated += 1;
                    trace!("sq[{}] store miss parked in maf, pa={:#x}", slot, pa.val());
                }
                return;
            }
            st.stats.bcache_hits += 1;
            match caches.copy_bcache_to_dcache(va, pa) {
                Some(evicted) => {
                    st.stats.dcache_fills += 1;
                    if evicted {
                        st.stats.dcache_evictions += 1;
                    }
                }
                None => return,
            }
        } else {
            st.stats.dcache_hits += 1;
        }

        caches.dcache.write(va, pa, len, value);
        drop(caches);

        if lock_cond {
            if let Some(handle) = st.sq[slot].instr {
                self.window.with_mut(handle, |i| {
                    i.destv = 1;
                    i.clear_lock_pending = true;
                });
            }
            st.lock.flag = false;
            st.stats.sc_success += 1;
            debug!("sq[{}] store-conditional succeeded", slot);
        }
        st.sq[slot].state = SqState::Complete;
    }

    /// Store-conditional success test: the lock flag stands and no
    /// coherence write has knocked the lock bit off the line since the
    /// paired load-locked registered it.
    fn sc_succeeds(&self, st: &MboxState, _va: VirtAddr, pa: PhysAddr) -> bool {
        if !st.lock.flag {
            return false;
        }
        if pa.line_base() != st.lock.phys.line_base() {
            // Conditional to a different line than the lock; the
            // architecture leaves this unpredictable, treat as failure.
            return false;
        }
        let caches = self.caches.lock();
        caches.dcache.line_locked(st.lock.virt, st.lock.phys)
    }

    /// Finalizes a committed store and reclaims the slot.
    fn sq_complete(&self, st: &mut MboxState, slot: usize) {
        if let Some(handle) = st.sq[slot].instr {
            self.window.with_mut(handle, |i| {
                if i.state == InstrState::WaitingForCompletion {
                    i.state = InstrState::WaitingRetirement;
                }
            });
        }
        trace!("sq[{}] complete", slot);
        st.sq[slot].clear();
    }

    // ─── Shared helpers ──────────────────────────────────────

    fn is_io(&self, pa: PhysAddr) -> bool {
        pa.val() & (1u64 << self.config.io_addr_bit) != 0
    }

    /// Records the fault in `MM_STAT` and reports it up to the Ibox.
    fn raise_fault(
        &self,
        st: &mut MboxState,
        fault: MemoryFault,
        pc: u64,
        opcode: Opcode,
        a_dest: u8,
        write: bool,
    ) {
        let mm = &mut st.iprs.mm_stat;
        mm.wr = write;
        mm.acv = matches!(fault, MemoryFault::AccessViolation(_));
        mm.for_ = matches!(fault, MemoryFault::FaultOnRead(_));
        mm.fow = matches!(fault, MemoryFault::FaultOnWrite(_));
        mm.opcode = opcode.number();
        st.stats.faults += 1;

        debug!("fault {} at pc={:#x}", fault, pc);
        self.ibox.memory_event(IboxEvent {
            fault,
            pc,
            va: fault.addr(),
            opcode,
            a_dest,
            read: !write,
            write,
        });
    }
}

/// Takes the low `len` bytes of `raw`, applies the big-endian fixup, and
/// widens per the load opcode.
fn extract_value(raw: u64, len: usize, extension: Extension, big_endian: bool) -> u64 {
    let value = if len >= 8 {
        raw
    } else {
        raw & ((1u64 << (len * 8)) - 1)
    };
    let value = if big_endian && len > 1 {
        value.swap_bytes() >> (64 - len * 8)
    } else {
        value
    };
    match extension {
        Extension::Sign if len < 8 => {
            let shift = 64 - len as u32 * 8;
            (((value << shift) as i64) >> shift) as u64
        }
        _ => value,
    }
}
