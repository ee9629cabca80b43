//! Translation faults, the PAL IPR surface, and their interplay.

use std::sync::Arc;

use axp_core::common::addr::VirtAddr;
use axp_core::common::error::MemoryFault;
use axp_core::config::MboxConfig;
use axp_core::insn::{InflightWindow, Instruction, Opcode};
use axp_core::mbox::ipr::MboxIpr;
use axp_core::mbox::queue::{LqState, SqState};
use axp_core::mbox::Mbox;

use crate::common::harness::TestContext;
use crate::common::mocks::ibox::MockEventSink;

#[test]
fn unmapped_load_raises_a_translation_event() {
    let mut ctx = TestContext::new();

    let (_, slot) = ctx.issue_load(Opcode::Ldq, 0x9000);
    ctx.process();

    assert_eq!(ctx.mbox.lq_state(slot), LqState::NotInUse);
    let events = ctx.ibox.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fault, MemoryFault::TranslationNotValid(0x9000));
    assert_eq!(events[0].va, 0x9000);
    assert!(events[0].read && !events[0].write);
    assert_eq!(events[0].opcode, Opcode::Ldq);
}

#[test]
fn misaligned_load_raises_an_alignment_event() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x9100);

    let (_, _) = ctx.issue_load(Opcode::Ldq, 0x9103);
    ctx.process();

    let events = ctx.ibox.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fault, MemoryFault::Alignment(0x9103));
}

#[test]
fn unaligned_quadword_form_is_exempt() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x9200);
    // The Ebox masks the low bits of an LDQ_U before publication.
    ctx.seed_bcache(0x9200, 8, 0x1234);

    let (load, _) = ctx.issue_load(Opcode::LdqU, 0x9200);
    ctx.process();

    assert_eq!(ctx.ibox.count(), 0);
    assert_eq!(ctx.destv(load), 0x1234);
}

#[test]
fn fault_on_write_reports_and_updates_mm_stat() {
    let mut ctx = TestContext::new();
    ctx.map_page_raw(0x9300, TestContext::pte_fow(0x9300 >> 13));

    let (_, slot) = ctx.issue_store(Opcode::Stq, 0x9300, 0xAA);
    ctx.process();

    assert_eq!(ctx.mbox.sq_state(slot), SqState::NotInUse);
    let events = ctx.ibox.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].fault, MemoryFault::FaultOnWrite(0x9300));
    assert!(events[0].write);

    let mm_stat = ctx.mbox.read_ipr(MboxIpr::MmStat);
    assert_ne!(mm_stat & (1 << 0), 0, "WR set");
    assert_ne!(mm_stat & (1 << 3), 0, "FOW set");
    assert_eq!((mm_stat >> 4) & 0x3F, Opcode::Stq.number() as u64);
}

#[test]
fn fault_on_read_is_a_load_side_fault() {
    let mut ctx = TestContext::new();
    ctx.map_page_raw(0x9400, TestContext::pte_for(0x9400 >> 13));

    ctx.issue_load(Opcode::Ldq, 0x9400);
    ctx.process();

    let events = ctx.ibox.events();
    assert_eq!(events[0].fault, MemoryFault::FaultOnRead(0x9400));
    let mm_stat = ctx.mbox.read_ipr(MboxIpr::MmStat);
    assert_eq!(mm_stat & (1 << 0), 0, "WR clear");
    assert_ne!(mm_stat & (1 << 2), 0, "FOR set");
}

#[test]
fn asn_switch_hides_non_global_mappings() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x9500);

    // Flip the address space; the non-ASM mapping no longer matches.
    ctx.mbox.write_ipr(MboxIpr::DtbAsn0, 7);
    ctx.issue_load(Opcode::Ldq, 0x9500);
    ctx.process();
    assert_eq!(
        ctx.ibox.events()[0].fault,
        MemoryFault::TranslationNotValid(0x9500)
    );
}

#[test]
fn asm_mappings_survive_asn_switches() {
    let mut ctx = TestContext::new();
    ctx.map_page_raw(0x9600, TestContext::pte_asm(0x9600 >> 13));
    ctx.seed_bcache(0x9600, 8, 0x66);

    ctx.mbox.write_ipr(MboxIpr::DtbAsn0, 9);
    let (load, _) = ctx.issue_load(Opcode::Ldq, 0x9600);
    ctx.process();

    assert_eq!(ctx.ibox.count(), 0);
    assert_eq!(ctx.destv(load), 0x66);
}

#[test]
fn dtb_invalidate_single_drops_the_mapping() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x9700);
    ctx.seed_bcache(0x9700, 8, 0x11);

    let (first, _) = ctx.issue_load(Opcode::Ldq, 0x9700);
    ctx.process();
    assert_eq!(ctx.destv(first), 0x11);

    ctx.mbox.write_ipr(MboxIpr::DtbIs0, 0x9700);
    ctx.issue_load(Opcode::Ldq, 0x9700);
    ctx.process();

    assert_eq!(
        ctx.ibox.events()[0].fault,
        MemoryFault::TranslationNotValid(0x9700)
    );
}

#[test]
fn dc_ctl_way_disable_turns_hits_into_misses() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x9800);
    ctx.seed_bcache(0x9800, 8, 0x88);

    // First load pulls the line into the Dcache.
    let (first, _) = ctx.issue_load(Opcode::Ldq, 0x9800);
    ctx.process();
    assert_eq!(ctx.destv(first), 0x88);

    // Both ways off: the resident line is invisible and the load goes to
    // the Bcache path again.
    let misses_before = ctx.mbox.stats().dcache_misses;
    ctx.mbox.write_ipr(MboxIpr::DcCtl, 0x0);
    let (_, _) = ctx.issue_load(Opcode::Ldq, 0x9800);
    ctx.process();
    assert!(ctx.mbox.stats().dcache_misses > misses_before);
}

#[test]
fn fault_is_reported_exactly_once_per_entry() {
    let mut sink = MockEventSink::new();
    sink.expect_memory_event()
        .withf(|ev| ev.fault == MemoryFault::TranslationNotValid(0xB000))
        .times(1)
        .return_const(());

    let window = Arc::new(InflightWindow::new(8));
    let mbox = Mbox::new(MboxConfig::default(), Arc::clone(&window), Arc::new(sink)).unwrap();

    let handle = window
        .insert(Instruction::new(Opcode::Ldq, 0x100, 1))
        .unwrap();
    let slot = mbox.get_lq_slot();
    mbox.read_mem(handle, slot, VirtAddr::new(0xB000));

    // The entry is discarded with the first report; further passes see an
    // empty slot and must not report again.
    mbox.process_once();
    mbox.process_once();
}

#[test]
fn mm_stat_reads_back_through_the_ipr_surface() {
    let ctx = TestContext::new();
    assert_eq!(ctx.mbox.read_ipr(MboxIpr::MmStat), 0);
    assert_eq!(ctx.mbox.read_ipr(MboxIpr::DcCtl) & 0x3, 0x3, "both ways on");
}
