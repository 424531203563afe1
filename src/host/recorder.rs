//! Emitter backend that records primitives instead of encoding them.
//!
//! Operand banks are checked as instructions are recorded, so a handler that
//! feeds a GP register to a float operation fails at compile time the same
//! way the machine-code backend would.

use super::inst::HostInst;
use crate::core::emitter::{Emitter, FpBinOp, FpUnOp};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::AsmReg;
use crate::mips::CtxSlot;

#[derive(Debug, Default, Clone)]
pub struct RecordingEmitter {
    insts: Vec<HostInst>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions recorded since the last `finish`.
    pub fn insts(&self) -> &[HostInst] {
        &self.insts
    }

    fn push(&mut self, inst: HostInst) -> CompileResult<()> {
        self.insts.push(inst);
        Ok(())
    }
}

fn gp(reg: AsmReg, what: &str) -> CompileResult<()> {
    if reg.is_gp() {
        Ok(())
    } else {
        Err(CompileError::Encoding {
            reason: format!("{what}: expected a GP register, got {reg}"),
        })
    }
}

fn fp(reg: AsmReg, what: &str) -> CompileResult<()> {
    if reg.is_fp() {
        Ok(())
    } else {
        Err(CompileError::Encoding {
            reason: format!("{what}: expected an FP register, got {reg}"),
        })
    }
}

impl Emitter for RecordingEmitter {
    type Output = Vec<HostInst>;

    fn mov_imm(&mut self, dst: AsmReg, imm: u32) -> CompileResult<()> {
        gp(dst, "mov_imm")?;
        self.push(HostInst::MovImm { dst, imm })
    }

    fn mov(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        gp(dst, "mov")?;
        gp(src, "mov")?;
        self.push(HostInst::Mov { dst, src })
    }

    fn add_imm(&mut self, dst: AsmReg, src: AsmReg, imm: i32) -> CompileResult<()> {
        gp(dst, "add_imm")?;
        gp(src, "add_imm")?;
        self.push(HostInst::AddImm { dst, src, imm })
    }

    fn and_imm(&mut self, dst: AsmReg, src: AsmReg, imm: u32) -> CompileResult<()> {
        gp(dst, "and_imm")?;
        gp(src, "and_imm")?;
        self.push(HostInst::AndImm { dst, src, imm })
    }

    fn or_imm(&mut self, dst: AsmReg, src: AsmReg, imm: u32) -> CompileResult<()> {
        gp(dst, "or_imm")?;
        gp(src, "or_imm")?;
        self.push(HostInst::OrImm { dst, src, imm })
    }

    fn add_ptr(&mut self, dst: AsmReg, a: AsmReg, b: AsmReg) -> CompileResult<()> {
        gp(dst, "add_ptr")?;
        gp(a, "add_ptr")?;
        gp(b, "add_ptr")?;
        self.push(HostInst::AddPtr { dst, a, b })
    }

    fn load_ctx(&mut self, dst: AsmReg, slot: CtxSlot) -> CompileResult<()> {
        self.push(HostInst::LoadCtx { dst, slot })
    }

    fn store_ctx(&mut self, src: AsmReg, slot: CtxSlot) -> CompileResult<()> {
        self.push(HostInst::StoreCtx { src, slot })
    }

    fn load_float_swap(&mut self, dst: AsmReg, base: AsmReg, offset: AsmReg) -> CompileResult<()> {
        fp(dst, "load_float_swap")?;
        gp(base, "load_float_swap")?;
        gp(offset, "load_float_swap")?;
        self.push(HostInst::LoadFloatSwap { dst, base, offset })
    }

    fn save_float_swap(&mut self, src: AsmReg, base: AsmReg, offset: AsmReg) -> CompileResult<()> {
        fp(src, "save_float_swap")?;
        gp(base, "save_float_swap")?;
        gp(offset, "save_float_swap")?;
        self.push(HostInst::SaveFloatSwap { src, base, offset })
    }

    fn fp_binop(&mut self, op: FpBinOp, dst: AsmReg, a: AsmReg, b: AsmReg) -> CompileResult<()> {
        fp(dst, op.mnemonic())?;
        fp(a, op.mnemonic())?;
        fp(b, op.mnemonic())?;
        self.push(HostInst::FpBin { op, dst, a, b })
    }

    fn fp_unop(&mut self, op: FpUnOp, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        fp(dst, op.mnemonic())?;
        fp(src, op.mnemonic())?;
        self.push(HostInst::FpUn { op, dst, src })
    }

    fn mov_to_fp(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        fp(dst, "mov_to_fp")?;
        gp(src, "mov_to_fp")?;
        self.push(HostInst::MovToFp { dst, src })
    }

    fn mov_from_fp(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        gp(dst, "mov_from_fp")?;
        fp(src, "mov_from_fp")?;
        self.push(HostInst::MovFromFp { dst, src })
    }

    fn call_interpreter(&mut self, op: u32, pc: u32) -> CompileResult<()> {
        self.push(HostInst::CallInterpreter { op, pc })
    }

    fn finish(&mut self) -> CompileResult<Self::Output> {
        Ok(std::mem::take(&mut self.insts))
    }

    fn discard(&mut self) {
        self.insts.clear();
    }
}
