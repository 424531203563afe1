//! Host code emission interface.
//!
//! Compilation handlers never talk to an encoder directly; they call the
//! primitives of [`Emitter`], which every backend implements. Emission is
//! strictly in call order. Three-operand primitives must behave as if both
//! sources are read before the destination is written, whatever the
//! destination aliases.

use super::error::CompileResult;
use super::register_file::{AsmReg, RegBitSet};
use crate::mips::CtxSlot;

/// Floating-point binary operations with IEEE-754 binary32 semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpBinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl FpBinOp {
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            FpBinOp::Add => a + b,
            FpBinOp::Sub => a - b,
            FpBinOp::Mul => a * b,
            FpBinOp::Div => a / b,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            FpBinOp::Add => "fadd",
            FpBinOp::Sub => "fsub",
            FpBinOp::Mul => "fmul",
            FpBinOp::Div => "fdiv",
        }
    }
}

/// Floating-point unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpUnOp {
    Mov,
    Abs,
    Neg,
    Sqrt,
}

impl FpUnOp {
    /// Apply to a raw binary32 bit pattern.
    pub fn apply_bits(self, bits: u32) -> u32 {
        match self {
            FpUnOp::Mov => bits,
            FpUnOp::Abs => bits & 0x7FFF_FFFF,
            FpUnOp::Neg => bits ^ 0x8000_0000,
            FpUnOp::Sqrt => f32::from_bits(bits).sqrt().to_bits(),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            FpUnOp::Mov => "fmov",
            FpUnOp::Abs => "fabs",
            FpUnOp::Neg => "fneg",
            FpUnOp::Sqrt => "fsqrt",
        }
    }
}

/// Primitive host-code emission service.
pub trait Emitter {
    /// Finished code for one block.
    type Output;

    /// `dst = imm` (32-bit).
    fn mov_imm(&mut self, dst: AsmReg, imm: u32) -> CompileResult<()>;
    /// `dst = src` (32-bit GP).
    fn mov(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()>;
    /// `dst = src + imm` (32-bit, wrapping).
    fn add_imm(&mut self, dst: AsmReg, src: AsmReg, imm: i32) -> CompileResult<()>;
    /// `dst = src & imm` (32-bit).
    fn and_imm(&mut self, dst: AsmReg, src: AsmReg, imm: u32) -> CompileResult<()>;
    /// `dst = src | imm` (32-bit).
    fn or_imm(&mut self, dst: AsmReg, src: AsmReg, imm: u32) -> CompileResult<()>;
    /// `dst = a + b` on full host pointer width; `b` is a zero-extended 32-bit offset.
    fn add_ptr(&mut self, dst: AsmReg, a: AsmReg, b: AsmReg) -> CompileResult<()>;

    /// Load a guest register slot from the CPU context.
    fn load_ctx(&mut self, dst: AsmReg, slot: CtxSlot) -> CompileResult<()>;
    /// Store to a guest register slot in the CPU context.
    fn store_ctx(&mut self, src: AsmReg, slot: CtxSlot) -> CompileResult<()>;

    /// Load a binary32 from host memory at `base + offset`, normalising guest byte order.
    fn load_float_swap(&mut self, dst: AsmReg, base: AsmReg, offset: AsmReg) -> CompileResult<()>;
    /// Store a binary32 to host memory at `base + offset` in guest byte order.
    fn save_float_swap(&mut self, src: AsmReg, base: AsmReg, offset: AsmReg) -> CompileResult<()>;

    fn fp_binop(&mut self, op: FpBinOp, dst: AsmReg, a: AsmReg, b: AsmReg) -> CompileResult<()>;
    fn fp_unop(&mut self, op: FpUnOp, dst: AsmReg, src: AsmReg) -> CompileResult<()>;
    /// Raw bit move GP -> FP.
    fn mov_to_fp(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()>;
    /// Raw bit move FP -> GP.
    fn mov_from_fp(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()>;

    /// Execute one instruction through the interpreter. All guest state must
    /// be in the context when this runs.
    fn call_interpreter(&mut self, op: u32, pc: u32) -> CompileResult<()>;

    /// Close the block and hand out its code.
    fn finish(&mut self) -> CompileResult<Self::Output>;

    /// Drop everything emitted since the last `finish`.
    fn discard(&mut self);
}

/// Reserved and allocatable host registers.
#[derive(Debug, Clone)]
pub struct HostLayout {
    /// Holds the address of the guest `CpuState`.
    pub ctx: AsmReg,
    /// Holds the host address of guest physical address 0.
    pub membase: AsmReg,
    /// Effective-address scratch.
    pub addr_scratch: AsmReg,
    /// Lane-offset scratch for multi-word transfers.
    pub lane_scratch: AsmReg,
    pub gp_allocatable: RegBitSet,
    pub fp_allocatable: RegBitSet,
}

impl HostLayout {
    /// Register assignment used on x86-64.
    ///
    /// rbx = membase, r15 = context, rax/rdx = scratch; rcx and xmm15 are
    /// reserved for the encoder's own sequences; rsp/rbp are never touched.
    /// r12-r14 are callee-saved and preserved by the block frame.
    pub fn x64() -> Self {
        let gp: Vec<_> = [6, 7, 8, 9, 10, 11, 12, 13, 14].into_iter().map(AsmReg::gp).collect();
        let fp: Vec<_> = (0..15).map(AsmReg::fp).collect();
        Self {
            ctx: AsmReg::gp(15),
            membase: AsmReg::gp(3),
            addr_scratch: AsmReg::gp(0),
            lane_scratch: AsmReg::gp(2),
            gp_allocatable: RegBitSet::from_regs(&gp),
            fp_allocatable: RegBitSet::from_regs(&fp),
        }
    }

    /// Same reserved registers with only the first `gp`/`fp` allocatable
    /// registers of each bank; used to exercise eviction.
    pub fn constrained(gp: usize, fp: usize) -> Self {
        let full = Self::x64();
        let none = RegBitSet::new();
        let gp_regs: Vec<_> = full.gp_allocatable.iter_bank(0, &none).take(gp).collect();
        let fp_regs: Vec<_> = full.fp_allocatable.iter_bank(1, &none).take(fp).collect();
        Self {
            gp_allocatable: RegBitSet::from_regs(&gp_regs),
            fp_allocatable: RegBitSet::from_regs(&fp_regs),
            ..full
        }
    }
}

impl Default for HostLayout {
    fn default() -> Self {
        Self::x64()
    }
}
