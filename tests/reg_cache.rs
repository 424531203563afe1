//! Register cache behaviour observed through the recorded host code.

mod common;

use allegrex_jit::core::reg_cache::{vfpu_index, VTEMP_BASE};
use allegrex_jit::core::{CacheKind, CompileError, HostLayout, JitOptions, MapFlags, RegCache, RegLoc};
use allegrex_jit::host::{HostInst, HostMachine, RecordingEmitter};
use allegrex_jit::jit::Jit;
use allegrex_jit::mips::{
    CpuState, CtxSlot, GuestMemory, Interpreter, MipsInterpreter, MipsOpcode, VectorSize,
};
use common::{enc, init_logging};

fn stores(em: &RecordingEmitter) -> Vec<CtxSlot> {
    em.insts()
        .iter()
        .filter_map(|inst| match *inst {
            HostInst::StoreCtx { slot, .. } => Some(slot),
            _ => None,
        })
        .collect()
}

#[test]
fn test_flush_writes_back_only_dirty_registers() {
    init_logging();

    let layout = HostLayout::x64();
    let mut em = RecordingEmitter::new();
    let mut fpr = RegCache::new(CacheKind::Fpr, &layout);

    fpr.map_reg(&mut em, 1, MapFlags::NONE).unwrap();
    fpr.map_reg(&mut em, 2, MapFlags::DIRTY | MapFlags::NOINIT).unwrap();
    assert_eq!(em.insts().len(), 1, "NOINIT skips the load");

    fpr.flush_r(&mut em, 2).unwrap();
    assert!(fpr.is_mapped(2));
    assert!(!fpr.is_dirty(2));

    fpr.map_reg(&mut em, 2, MapFlags::DIRTY).unwrap();
    fpr.flush_all(&mut em).unwrap();
    assert_eq!(stores(&em), vec![CtxSlot::Fpr(2), CtxSlot::Fpr(2)]);
    assert_eq!(fpr.mapped_count(), 0);
}

#[test]
fn test_immediates_materialise_and_write_back() {
    let layout = HostLayout::x64();
    let mut em = RecordingEmitter::new();
    let mut gpr = RegCache::new(CacheKind::Gpr, &layout);

    gpr.set_imm(4, 0x0880_0000);
    assert_eq!(gpr.get_imm(4), Some(0x0880_0000));
    assert!(em.insts().is_empty());

    let host = gpr.map_reg(&mut em, 4, MapFlags::NONE).unwrap();
    assert_eq!(em.insts(), &[HostInst::MovImm { dst: host, imm: 0x0880_0000 }]);
    assert!(!gpr.is_imm(4));

    gpr.set_imm(5, 7);
    gpr.flush_all(&mut em).unwrap();
    let slots = stores(&em);
    assert!(slots.contains(&CtxSlot::Gpr(4)));
    assert!(slots.contains(&CtxSlot::Gpr(5)));
    assert!(em
        .insts()
        .contains(&HostInst::MovImm { dst: layout.addr_scratch, imm: 7 }));
}

#[test]
fn test_zero_register_stays_zero() {
    let layout = HostLayout::x64();
    let mut em = RecordingEmitter::new();
    let mut gpr = RegCache::new(CacheKind::Gpr, &layout);

    gpr.set_imm(0, 5);
    assert_eq!(gpr.get_imm(0), Some(0));

    let host = gpr.map_reg(&mut em, 0, MapFlags::DIRTY).unwrap();
    assert_eq!(em.insts(), &[HostInst::MovImm { dst: host, imm: 0 }]);
    assert!(!gpr.is_dirty(0));

    gpr.flush_all(&mut em).unwrap();
    assert!(stores(&em).is_empty());
    assert_eq!(gpr.loc(0), RegLoc::Imm(0));
}

#[test]
fn test_temps_are_never_written_to_guest_state() {
    let layout = HostLayout::x64();
    let mut em = RecordingEmitter::new();
    let mut fpr = RegCache::new(CacheKind::Fpr, &layout);

    let temp = fpr.get_temp_v(&mut em).unwrap();
    assert!(temp >= VTEMP_BASE);
    let index = vfpu_index(temp);
    assert!(fpr.is_temp(index));
    assert!(fpr.is_spill_locked(index));

    // A second temp is distinct.
    let other = fpr.get_temp_v(&mut em).unwrap();
    assert_ne!(temp, other);

    fpr.release_spill_locks_and_discard_temps();
    assert!(!fpr.is_mapped(index));
    assert!(!fpr.is_temp(index));

    fpr.get_temp_v(&mut em).unwrap();
    fpr.flush_all(&mut em).unwrap();
    assert!(stores(&em).is_empty());
}

#[test]
fn test_eviction_flushes_dirty_victim() {
    init_logging();

    let layout = HostLayout::constrained(9, 2);
    let mut em = RecordingEmitter::new();
    let mut fpr = RegCache::new(CacheKind::Fpr, &layout);

    fpr.map_reg(&mut em, 1, MapFlags::DIRTY | MapFlags::NOINIT).unwrap();
    fpr.map_reg(&mut em, 2, MapFlags::DIRTY | MapFlags::NOINIT).unwrap();
    fpr.release_spill_locks_and_discard_temps();

    fpr.map_reg(&mut em, 3, MapFlags::NONE).unwrap();
    assert_eq!(fpr.evictions(), 1);
    assert_eq!(fpr.mapped_count(), 2);

    let evicted = if fpr.is_mapped(1) { 2 } else { 1 };
    assert_eq!(stores(&em), vec![CtxSlot::Fpr(evicted)]);
    assert_eq!(fpr.loc(evicted as u16), RegLoc::Mem);
}

#[test]
fn test_spill_locked_and_in_use_registers_are_not_victims() {
    let layout = HostLayout::constrained(9, 2);
    let mut em = RecordingEmitter::new();
    let mut fpr = RegCache::new(CacheKind::Fpr, &layout);

    fpr.spill_lock(1);
    fpr.map_reg(&mut em, 1, MapFlags::NONE).unwrap();
    fpr.map_reg(&mut em, 2, MapFlags::NONE).unwrap();

    // f2 is unlocked but was mapped for the current instruction.
    let err = fpr.map_reg(&mut em, 3, MapFlags::NONE).unwrap_err();
    assert!(matches!(err, CompileError::RegistersExhausted { file: "fpr", .. }));

    fpr.release_spill_lock(2);
    fpr.map_reg(&mut em, 3, MapFlags::NONE).unwrap();
    assert!(fpr.is_mapped(1));
    assert!(!fpr.is_mapped(2));
}

#[test]
fn test_vector_mapping_is_all_or_nothing() {
    let layout = HostLayout::constrained(9, 3);
    let mut em = RecordingEmitter::new();
    let mut fpr = RegCache::new(CacheKind::Fpr, &layout);

    let err = fpr
        .map_regs_and_spill_lock_v(&mut em, &[0, 32, 64, 96], MapFlags::NONE)
        .unwrap_err();
    assert!(matches!(err, CompileError::RegistersExhausted { .. }));
    assert_eq!(fpr.mapped_count(), 0);
    assert!(em.insts().is_empty());

    fpr.map_regs_and_spill_lock_v(&mut em, &[0, 32, 64], MapFlags::NONE)
        .unwrap();
    for vreg in [0, 32, 64] {
        assert!(fpr.is_spill_locked(vfpu_index(vreg)));
    }
}

#[test]
fn test_block_compiler_reports_exhaustion() {
    init_logging();

    // A staged quad vadd needs more than four FP registers.
    let words = [enc::vadd(VectorSize::Quad, 32, 0, 1)];
    let mut jit = Jit::new(RecordingEmitter::new(), HostLayout::constrained(9, 4), JitOptions::new());
    let err = jit.compile_block(0x0880_0000, &words).unwrap_err();
    assert!(matches!(err, CompileError::RegistersExhausted { .. }));

    // The compiler is usable again after an aborted block.
    let block = jit
        .compile_block(0x0880_0000, &[enc::vzero(VectorSize::Quad, 0)])
        .unwrap();
    assert_eq!(block.native_count(), 1);
    // Nothing from the aborted block leaks into the next one.
    assert!(!block.code.iter().any(|inst| matches!(inst, HostInst::FpBin { .. })));
}

#[test]
fn test_eviction_under_pressure_matches_interpreter() {
    init_logging();

    let mut cpu = CpuState::new();
    for i in 0..32 {
        cpu.set_f(i, i as f32 + 1.0);
    }
    let words: Vec<u32> = (0..8).map(|i| enc::add_s(i, i + 8, i + 16)).collect();

    let layout = HostLayout::constrained(9, 3);
    let mut jit = Jit::new(RecordingEmitter::new(), layout.clone(), JitOptions::new());
    let block = jit.compile_block(0x0880_0000, &words).unwrap();
    assert!(block.evictions > 0);

    let mut jit_cpu = cpu.clone();
    let mut jit_mem = GuestMemory::new();
    HostMachine::new(layout)
        .run(&block.code, &mut jit_cpu, &mut jit_mem, &mut MipsInterpreter::new())
        .unwrap();

    let mut interp = MipsInterpreter::new();
    let mut interp_cpu = cpu;
    interp_cpu.pc = 0x0880_0000;
    for &word in &words {
        interp.interpret(&mut interp_cpu, &mut GuestMemory::new(), MipsOpcode(word));
    }
    assert_eq!(jit_cpu.fpr, interp_cpu.fpr);
}
