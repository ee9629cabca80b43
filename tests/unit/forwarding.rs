//! Store-to-load forwarding through the full pipeline.
//!
//! Drives loads and stores through the public Mbox interface and checks
//! the forwarding decisions end to end: exact-match hits, youngest-older
//! selection, partial-overlap stalls, and the retired-store round trip.

use axp_core::config::MboxConfig;
use axp_core::insn::{InstrState, Opcode};
use axp_core::mbox::queue::LqState;

use crate::common::harness::TestContext;

#[test]
fn exact_match_forwards_without_cache_access() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x1000);

    let (_, _) = ctx.issue_store_uid(Opcode::Stb, 0x1000, 0xAB, 10);
    let (load, _) = ctx.issue_load_uid(Opcode::Ldbu, 0x1000, 11);
    ctx.process();

    assert_eq!(ctx.destv(load), 0xAB);
    assert_eq!(ctx.instr_state(load), InstrState::WaitingRetirement);

    let stats = ctx.mbox.stats();
    assert_eq!(stats.forward_hits, 1);
    assert_eq!(stats.dcache_hits + stats.dcache_misses, 0, "no cache probe");
}

#[test]
fn youngest_older_store_is_selected() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x2000);

    ctx.issue_store_uid(Opcode::Stb, 0x2000, 0x01, 5);
    ctx.issue_store_uid(Opcode::Stb, 0x2000, 0x02, 7);
    ctx.issue_store_uid(Opcode::Stb, 0x2000, 0x03, 9);
    let (load, _) = ctx.issue_load_uid(Opcode::Ldbu, 0x2000, 10);
    ctx.process();

    assert_eq!(ctx.destv(load), 0x03);
    assert_eq!(ctx.instr_state(load), InstrState::WaitingRetirement);
}

#[test]
fn wider_store_covers_narrower_load() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x2100);

    ctx.issue_store_uid(Opcode::Stq, 0x2100, 0x1122_3344_5566_7788, 4);
    let (load, _) = ctx.issue_load_uid(Opcode::Ldbu, 0x2100, 5);
    ctx.process();

    assert_eq!(ctx.destv(load), 0x88);
}

#[test]
fn forwarded_longword_sign_extends() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x2200);

    ctx.issue_store_uid(Opcode::Stl, 0x2200, 0x8000_0001, 4);
    let (load, _) = ctx.issue_load_uid(Opcode::Ldl, 0x2200, 5);
    ctx.process();

    assert_eq!(ctx.destv(load), 0xFFFF_FFFF_8000_0001);
}

#[test]
fn partial_overlap_stalls_the_load() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x3000);

    let (_, store_slot) = ctx.issue_store_uid(Opcode::Stb, 0x3000, 0xAB, 5);
    let (load, load_slot) = ctx.issue_load_uid(Opcode::Ldq, 0x3000, 6);
    ctx.process();

    // Neither forwarded nor read from the cache: still pending, untouched.
    assert_eq!(ctx.mbox.lq_state(load_slot), LqState::ReadPending);
    assert_eq!(ctx.destv(load), 0);
    let stats = ctx.mbox.stats();
    assert_eq!(stats.forward_conflicts, 1);
    assert_eq!(stats.dcache_hits + stats.dcache_misses, 0, "no cache probe");

    // Drain the store (line seeded so the commit can hit), then the load
    // proceeds through the cache and observes the store's byte.
    ctx.seed_bcache(0x3000, 8, 0);
    ctx.mbox.retire_store(store_slot);
    ctx.process();
    ctx.process();

    assert_eq!(ctx.instr_state(load), InstrState::WaitingRetirement);
    assert_eq!(ctx.destv(load), 0xAB);
}

#[test]
fn younger_store_does_not_forward() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x4000);
    ctx.seed_bcache(0x4000, 8, 0x5555);

    // The store is younger than the load; the load must read memory.
    ctx.issue_store_uid(Opcode::Stq, 0x4000, 0xDEAD, 20);
    let (load, _) = ctx.issue_load_uid(Opcode::Ldq, 0x4000, 10);
    ctx.process();

    assert_eq!(ctx.destv(load), 0x5555);
    assert_eq!(ctx.mbox.stats().forward_hits, 0);
}

#[test]
fn retired_store_is_visible_to_younger_load() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x5000);
    ctx.seed_bcache(0x5000, 8, 0);

    ctx.complete_store(Opcode::Stq, 0x5000, 0xFEED_FACE_CAFE_F00D);

    // The SQ slot has been reclaimed; only the memory system can answer.
    let (load, _) = ctx.issue_load(Opcode::Ldq, 0x5000);
    ctx.process();

    assert_eq!(ctx.destv(load), 0xFEED_FACE_CAFE_F00D);
    assert_eq!(ctx.mbox.stats().forward_hits, 0);
}

#[test]
fn big_endian_fixup_applies_to_forwarded_data() {
    let mut ctx = TestContext::with_config(MboxConfig {
        big_endian: true,
        ..MboxConfig::default()
    });
    ctx.map_identity(0x2300);

    ctx.issue_store_uid(Opcode::Stl, 0x2300, 0x1122_3344, 4);
    let (load, _) = ctx.issue_load_uid(Opcode::Ldwu, 0x2300, 5);
    ctx.process();

    // The low word 0x3344 is byte-reversed within the access width.
    assert_eq!(ctx.destv(load), 0x4433);
}

#[test]
fn forwarding_is_per_address() {
    let mut ctx = TestContext::new();
    ctx.map_identity(0x6000);
    ctx.seed_bcache(0x6040, 8, 0x1111);

    ctx.issue_store_uid(Opcode::Stq, 0x6000, 0x2222, 5);
    let (load, _) = ctx.issue_load_uid(Opcode::Ldq, 0x6040, 6);
    ctx.process();

    assert_eq!(ctx.destv(load), 0x1111);
}
