//! Integer immediate instructions: constant tracking and register moves.

mod common;

use allegrex_jit::core::JitOptions;
use allegrex_jit::host::HostInst;
use allegrex_jit::mips::{CpuState, GuestMemory};
use common::{compile, enc, init_logging, run_both};

#[test]
fn test_constant_chain_emits_only_writeback() {
    init_logging();

    let words = [enc::lui(4, 0x0880), enc::ori(4, 4, 0x1234), enc::addiu(5, 4, -4)];
    let block = compile(&words, JitOptions::new());

    assert!(block
        .code
        .iter()
        .all(|inst| matches!(inst, HostInst::MovImm { .. } | HostInst::StoreCtx { .. })));

    let run = run_both(&words, JitOptions::new(), &CpuState::new(), &GuestMemory::new());
    run.assert_same_state();
    assert_eq!(run.jit_cpu.gpr[4], 0x0880_1234);
    assert_eq!(run.jit_cpu.gpr[5], 0x0880_1230);
}

#[test]
fn test_zero_immediate_is_a_register_move() {
    init_logging();

    let mut cpu = CpuState::new();
    cpu.gpr[4] = 0x1234_5678;
    cpu.gpr[5] = 0x0880_0000;
    let words = [enc::addiu(8, 4, 0), enc::ori(9, 5, 0), enc::addiu(10, 4, -4)];

    let block = compile(&words, JitOptions::new());
    let moves = block.code.iter().filter(|inst| matches!(inst, HostInst::Mov { .. })).count();
    let adds = block.code.iter().filter(|inst| matches!(inst, HostInst::AddImm { .. })).count();
    assert_eq!(moves, 2);
    assert_eq!(adds, 1);
    assert!(!block.code.iter().any(|inst| matches!(inst, HostInst::OrImm { .. })));

    let run = run_both(&words, JitOptions::new(), &cpu, &GuestMemory::new());
    run.assert_same_state();
    assert_eq!(run.jit_cpu.gpr[8], 0x1234_5678);
    assert_eq!(run.jit_cpu.gpr[9], 0x0880_0000);
    assert_eq!(run.jit_cpu.gpr[10], 0x1234_5674);
}
