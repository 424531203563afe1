//! Shared helpers for the integration tests: guest instruction encoders and
//! a harness that runs a block both translated and interpreted.

#![allow(dead_code)]

use allegrex_jit::core::{HostLayout, JitOptions};
use allegrex_jit::host::{HostInst, HostMachine, RecordingEmitter};
use allegrex_jit::jit::{CompiledBlock, Jit};
use allegrex_jit::mips::{CpuState, GuestMemory, Interpreter, MipsInterpreter, MipsOpcode};

pub const BLOCK_PC: u32 = 0x0880_4000;

pub mod enc {
    use allegrex_jit::mips::VectorSize;

    pub fn lui(rt: u32, imm: u16) -> u32 {
        (15 << 26) | (rt << 16) | imm as u32
    }

    pub fn ori(rt: u32, rs: u32, imm: u16) -> u32 {
        (13 << 26) | (rs << 21) | (rt << 16) | imm as u32
    }

    pub fn addiu(rt: u32, rs: u32, imm: i16) -> u32 {
        (9 << 26) | (rs << 21) | (rt << 16) | imm as u16 as u32
    }

    fn fpu_s(funct: u32, fd: u32, fs: u32, ft: u32) -> u32 {
        (17 << 26) | (16 << 21) | (ft << 16) | (fs << 11) | (fd << 6) | funct
    }

    pub fn add_s(fd: u32, fs: u32, ft: u32) -> u32 {
        fpu_s(0, fd, fs, ft)
    }

    pub fn sub_s(fd: u32, fs: u32, ft: u32) -> u32 {
        fpu_s(1, fd, fs, ft)
    }

    pub fn mul_s(fd: u32, fs: u32, ft: u32) -> u32 {
        fpu_s(2, fd, fs, ft)
    }

    pub fn div_s(fd: u32, fs: u32, ft: u32) -> u32 {
        fpu_s(3, fd, fs, ft)
    }

    pub fn sqrt_s(fd: u32, fs: u32) -> u32 {
        fpu_s(4, fd, fs, 0)
    }

    pub fn abs_s(fd: u32, fs: u32) -> u32 {
        fpu_s(5, fd, fs, 0)
    }

    pub fn mov_s(fd: u32, fs: u32) -> u32 {
        fpu_s(6, fd, fs, 0)
    }

    pub fn neg_s(fd: u32, fs: u32) -> u32 {
        fpu_s(7, fd, fs, 0)
    }

    /// c.lt.s
    pub fn c_lt_s(fs: u32, ft: u32) -> u32 {
        fpu_s(60, 0, fs, ft)
    }

    pub fn mfc1(rt: u32, fs: u32) -> u32 {
        (17 << 26) | (rt << 16) | (fs << 11)
    }

    pub fn mtc1(rt: u32, fs: u32) -> u32 {
        (17 << 26) | (4 << 21) | (rt << 16) | (fs << 11)
    }

    pub fn lwc1(ft: u32, rs: u32, offset: i16) -> u32 {
        (49 << 26) | (rs << 21) | (ft << 16) | offset as u16 as u32
    }

    pub fn swc1(ft: u32, rs: u32, offset: i16) -> u32 {
        (57 << 26) | (rs << 21) | (ft << 16) | offset as u16 as u32
    }

    fn vmem(major: u32, low_bits: u32, vt: u32, rs: u32, offset: i16) -> u32 {
        (major << 26) | (rs << 21) | ((vt & 0x1F) << 16) | (offset as u16 as u32 & 0xFFFC) | low_bits
    }

    pub fn lv_s(vt: u32, rs: u32, offset: i16) -> u32 {
        vmem(50, vt >> 5, vt, rs, offset)
    }

    pub fn sv_s(vt: u32, rs: u32, offset: i16) -> u32 {
        vmem(58, vt >> 5, vt, rs, offset)
    }

    pub fn lv_q(vt: u32, rs: u32, offset: i16) -> u32 {
        vmem(54, (vt >> 5) & 1, vt, rs, offset)
    }

    pub fn sv_q(vt: u32, rs: u32, offset: i16) -> u32 {
        vmem(62, (vt >> 5) & 1, vt, rs, offset)
    }

    pub fn size_bits(size: VectorSize) -> u32 {
        match size {
            VectorSize::Single => 0,
            VectorSize::Pair => 1 << 7,
            VectorSize::Triple => 1 << 15,
            VectorSize::Quad => (1 << 7) | (1 << 15),
        }
    }

    fn vfpu3(major: u32, subop: u32, size: VectorSize, vd: u32, vs: u32, vt: u32) -> u32 {
        (major << 26) | (subop << 23) | (vt << 16) | (vs << 8) | vd | size_bits(size)
    }

    pub fn vadd(size: VectorSize, vd: u32, vs: u32, vt: u32) -> u32 {
        vfpu3(24, 0, size, vd, vs, vt)
    }

    pub fn vsub(size: VectorSize, vd: u32, vs: u32, vt: u32) -> u32 {
        vfpu3(24, 1, size, vd, vs, vt)
    }

    pub fn vdiv(size: VectorSize, vd: u32, vs: u32, vt: u32) -> u32 {
        vfpu3(24, 7, size, vd, vs, vt)
    }

    pub fn vmul(size: VectorSize, vd: u32, vs: u32, vt: u32) -> u32 {
        vfpu3(25, 0, size, vd, vs, vt)
    }

    pub fn vdot(size: VectorSize, vd: u32, vs: u32, vt: u32) -> u32 {
        vfpu3(25, 1, size, vd, vs, vt)
    }

    fn vfpu4(subop: u32, size: VectorSize, vd: u32, vs: u32) -> u32 {
        (52 << 26) | (subop << 16) | (vs << 8) | vd | size_bits(size)
    }

    pub fn vmov(size: VectorSize, vd: u32, vs: u32) -> u32 {
        vfpu4(0, size, vd, vs)
    }

    pub fn vabs(size: VectorSize, vd: u32, vs: u32) -> u32 {
        vfpu4(1, size, vd, vs)
    }

    pub fn vneg(size: VectorSize, vd: u32, vs: u32) -> u32 {
        vfpu4(2, size, vd, vs)
    }

    pub fn vzero(size: VectorSize, vd: u32) -> u32 {
        vfpu4(6, size, vd, 0)
    }

    pub fn vone(size: VectorSize, vd: u32) -> u32 {
        vfpu4(7, size, vd, 0)
    }

    /// vpfxs / vpfxt / vpfxd for `which` = 0 / 1 / 2.
    pub fn vpfx(which: u32, value: u32) -> u32 {
        (55 << 26) | (which << 24) | (value & 0xF_FFFF)
    }
}

/// Outcome of running one block both ways.
pub struct DualRun {
    pub block: CompiledBlock<Vec<HostInst>>,
    pub jit_cpu: CpuState,
    pub jit_mem: GuestMemory,
    pub interp_cpu: CpuState,
    pub interp_mem: GuestMemory,
}

impl DualRun {
    pub fn assert_same_state(&self) {
        assert_eq!(self.jit_cpu.gpr, self.interp_cpu.gpr, "GPRs differ");
        assert_eq!(self.jit_cpu.fpr, self.interp_cpu.fpr, "FPRs differ");
        assert_eq!(self.jit_cpu.vpr.to_vec(), self.interp_cpu.vpr.to_vec(), "VFPU registers differ");
        assert_eq!(self.jit_cpu.vfpu_ctrl, self.interp_cpu.vfpu_ctrl, "VFPU control differs");
        assert_eq!(self.jit_cpu.fcr31, self.interp_cpu.fcr31, "FCR31 differs");
        assert_eq!(self.jit_cpu.pc, self.interp_cpu.pc, "exit PC differs");
        assert_eq!(self.jit_mem, self.interp_mem, "memory differs");
    }
}

pub fn compile(words: &[u32], options: JitOptions) -> CompiledBlock<Vec<HostInst>> {
    let mut jit = Jit::new(RecordingEmitter::new(), HostLayout::x64(), options);
    jit.compile_block(BLOCK_PC, words).expect("block should compile")
}

/// Translate and run `words`, and interpret the same words from the same start state.
pub fn run_both(words: &[u32], options: JitOptions, cpu: &CpuState, mem: &GuestMemory) -> DualRun {
    let layout = HostLayout::x64();
    let block = compile(words, options);

    let mut jit_cpu = cpu.clone();
    let mut jit_mem = mem.clone();
    jit_cpu.pc = BLOCK_PC;
    let mut machine = HostMachine::new(layout);
    machine
        .run(&block.code, &mut jit_cpu, &mut jit_mem, &mut MipsInterpreter::new())
        .expect("translated block should run");

    let mut interp_cpu = cpu.clone();
    let mut interp_mem = mem.clone();
    interp_cpu.pc = BLOCK_PC;
    let mut interp = MipsInterpreter::new();
    for &word in words {
        interp.interpret(&mut interp_cpu, &mut interp_mem, MipsOpcode(word));
    }

    DualRun {
        block,
        jit_cpu,
        jit_mem,
        interp_cpu,
        interp_mem,
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
