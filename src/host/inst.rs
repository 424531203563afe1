//! Recorded host operations.

use crate::core::register_file::AsmReg;
use crate::core::{FpBinOp, FpUnOp};
use crate::mips::{CtxSlot, MipsOpcode};
use std::fmt;

/// One emitter primitive, as recorded by [`super::RecordingEmitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostInst {
    MovImm { dst: AsmReg, imm: u32 },
    Mov { dst: AsmReg, src: AsmReg },
    AddImm { dst: AsmReg, src: AsmReg, imm: i32 },
    AndImm { dst: AsmReg, src: AsmReg, imm: u32 },
    OrImm { dst: AsmReg, src: AsmReg, imm: u32 },
    AddPtr { dst: AsmReg, a: AsmReg, b: AsmReg },
    LoadCtx { dst: AsmReg, slot: CtxSlot },
    StoreCtx { src: AsmReg, slot: CtxSlot },
    LoadFloatSwap { dst: AsmReg, base: AsmReg, offset: AsmReg },
    SaveFloatSwap { src: AsmReg, base: AsmReg, offset: AsmReg },
    FpBin { op: FpBinOp, dst: AsmReg, a: AsmReg, b: AsmReg },
    FpUn { op: FpUnOp, dst: AsmReg, src: AsmReg },
    MovToFp { dst: AsmReg, src: AsmReg },
    MovFromFp { dst: AsmReg, src: AsmReg },
    CallInterpreter { op: u32, pc: u32 },
}

impl HostInst {
    pub fn is_interpreter_call(&self) -> bool {
        matches!(self, HostInst::CallInterpreter { .. })
    }

    /// Whether the instruction touches guest memory.
    pub fn is_memory_access(&self) -> bool {
        matches!(self, HostInst::LoadFloatSwap { .. } | HostInst::SaveFloatSwap { .. })
    }
}

impl fmt::Display for HostInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HostInst::MovImm { dst, imm } => write!(f, "mov_imm  {dst}, {imm:#x}"),
            HostInst::Mov { dst, src } => write!(f, "mov      {dst}, {src}"),
            HostInst::AddImm { dst, src, imm } => write!(f, "add_imm  {dst}, {src}, {imm}"),
            HostInst::AndImm { dst, src, imm } => write!(f, "and_imm  {dst}, {src}, {imm:#x}"),
            HostInst::OrImm { dst, src, imm } => write!(f, "or_imm   {dst}, {src}, {imm:#x}"),
            HostInst::AddPtr { dst, a, b } => write!(f, "add_ptr  {dst}, {a}, {b}"),
            HostInst::LoadCtx { dst, slot } => write!(f, "ld_ctx   {dst}, {slot:?}"),
            HostInst::StoreCtx { src, slot } => write!(f, "st_ctx   {slot:?}, {src}"),
            HostInst::LoadFloatSwap { dst, base, offset } => {
                write!(f, "ldswap   {dst}, [{base} + {offset}]")
            }
            HostInst::SaveFloatSwap { src, base, offset } => {
                write!(f, "stswap   [{base} + {offset}], {src}")
            }
            HostInst::FpBin { op, dst, a, b } => write!(f, "{:<8} {dst}, {a}, {b}", op.mnemonic()),
            HostInst::FpUn { op, dst, src } => write!(f, "{:<8} {dst}, {src}", op.mnemonic()),
            HostInst::MovToFp { dst, src } => write!(f, "mov_tofp {dst}, {src}"),
            HostInst::MovFromFp { dst, src } => write!(f, "mov_frfp {dst}, {src}"),
            HostInst::CallInterpreter { op, pc } => {
                write!(f, "interp   {:08x}: {}", pc, MipsOpcode(op))
            }
        }
    }
}
