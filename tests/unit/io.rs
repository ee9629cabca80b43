//! MMIO references: the I/O write buffer path.

use axp_core::cbox::MissKind;
use axp_core::insn::{InstrState, Opcode};
use axp_core::mbox::queue::{LqState, SqState};

use crate::common::harness::TestContext;

#[test]
fn io_load_bypasses_the_caches() {
    let mut ctx = TestContext::new();
    let pa = ctx.map_io(0x4_0000);

    let (load, slot) = ctx.issue_load(Opcode::Ldl, 0x4_0000);
    ctx.process();

    // Parked in the IOWB, no cache traffic at all.
    assert_eq!(ctx.mbox.lq_state(slot), LqState::ReadPending);
    let pending = ctx.mbox.iowb_pending();
    assert_eq!(pending.len(), 1);
    let (idx, entry) = pending[0];
    assert_eq!(entry.kind, MissKind::Ldx);
    assert_eq!(entry.pa.val(), pa);
    let stats = ctx.mbox.stats();
    assert_eq!(stats.dcache_hits + stats.dcache_misses, 0);

    // The system acknowledges with the device data.
    ctx.mbox.iowb_complete(idx, Some(0x4443_2211));
    ctx.process();

    assert_eq!(ctx.destv(load), 0x4443_2211);
    assert_eq!(ctx.instr_state(load), InstrState::WaitingRetirement);
}

#[test]
fn io_load_data_is_width_extended() {
    let mut ctx = TestContext::new();
    ctx.map_io(0x4_1000);

    let (load, _) = ctx.issue_load(Opcode::Ldl, 0x4_1000);
    ctx.process();
    let (idx, _) = ctx.mbox.iowb_pending()[0];

    // Device returns a value with the sign bit of the longword set.
    ctx.mbox.iowb_complete(idx, Some(0x8000_0000));
    ctx.process();

    assert_eq!(ctx.destv(load), 0xFFFF_FFFF_8000_0000);
}

#[test]
fn io_store_waits_for_the_acknowledgement() {
    let mut ctx = TestContext::new();
    let pa = ctx.map_io(0x4_2000);

    let (handle, slot) = ctx.issue_store(Opcode::Stl, 0x4_2000, 0xBEEF);
    ctx.process();
    ctx.mbox.retire_store(slot);
    ctx.mbox.apply_retirement(handle);
    ctx.process();

    // The commit enqueued the write and is waiting on the ack.
    assert_eq!(ctx.mbox.sq_state(slot), SqState::Ready);
    let pending = ctx.mbox.iowb_pending();
    assert_eq!(pending.len(), 1);
    let (idx, entry) = pending[0];
    assert_eq!(entry.kind, MissKind::Stx);
    assert_eq!(entry.pa.val(), pa);
    assert_eq!(entry.data, 0xBEEF);

    ctx.mbox.iowb_complete(idx, None);
    ctx.process();

    assert_eq!(ctx.mbox.sq_state(slot), SqState::NotInUse);
    let stats = ctx.mbox.stats();
    assert_eq!(stats.iowb_allocated, 1);
    assert_eq!(stats.iowb_completed, 1);
    assert_eq!(stats.dcache_hits + stats.dcache_misses, 0);
}

#[test]
fn io_retries_do_not_duplicate_the_request() {
    let mut ctx = TestContext::new();
    ctx.map_io(0x4_3000);

    ctx.issue_load(Opcode::Ldq, 0x4_3000);
    ctx.process();
    ctx.process();
    ctx.process();

    assert_eq!(ctx.mbox.iowb_pending().len(), 1);
    assert_eq!(ctx.mbox.stats().iowb_allocated, 1);
}
