//! Scalar FPU handlers.

use super::Jit;
use crate::core::{CompileResult, Emitter, FpBinOp, FpUnOp, MapFlags, MipsReg};
use crate::mips::opcode::major;
use crate::mips::MipsOpcode;

impl<E: Emitter> Jit<E> {
    /// add.s, sub.s, mul.s, div.s
    pub(crate) fn comp_fpu3op(&mut self, op: MipsOpcode) -> CompileResult<()> {
        let bin = match op.funct() {
            0 => FpBinOp::Add,
            1 => FpBinOp::Sub,
            2 => FpBinOp::Mul,
            3 => FpBinOp::Div,
            _ => return self.comp_generic(op),
        };
        let (fd, fs, ft) = (op.fd() as MipsReg, op.fs() as MipsReg, op.ft() as MipsReg);

        self.fpr.map_dirty_in_in(&mut self.em, fd, fs, ft, true)?;
        self.em
            .fp_binop(bin, self.fpr.r(fd), self.fpr.r(fs), self.fpr.r(ft))
    }

    /// sqrt.s, abs.s, mov.s, neg.s
    pub(crate) fn comp_fpu2op(&mut self, op: MipsOpcode) -> CompileResult<()> {
        if op.rs() != 16 {
            return self.comp_generic(op);
        }
        let un = match op.funct() {
            4 => FpUnOp::Sqrt,
            5 => FpUnOp::Abs,
            6 => FpUnOp::Mov,
            7 => FpUnOp::Neg,
            _ => return self.comp_generic(op),
        };
        let (fd, fs) = (op.fd() as MipsReg, op.fs() as MipsReg);

        self.fpr.map_dirty_in(&mut self.em, fd, fs, true)?;
        self.em.fp_unop(un, self.fpr.r(fd), self.fpr.r(fs))
    }

    /// lwc1, swc1
    pub(crate) fn comp_fpuls(&mut self, op: MipsOpcode) -> CompileResult<()> {
        let offset = op.simm16();
        let ft = op.ft() as MipsReg;
        let rs = op.rs();
        let (membase, sreg) = (self.layout.membase, self.layout.addr_scratch);

        match op.major() {
            major::LWC1 => {
                self.fpr.spill_lock(ft);
                self.fpr.map_reg(&mut self.em, ft, MapFlags::NOINIT | MapFlags::DIRTY)?;
                self.set_address(rs, offset)?;
                self.em.load_float_swap(self.fpr.r(ft), membase, sreg)
            }
            major::SWC1 => {
                self.fpr.spill_lock(ft);
                self.fpr.map_reg(&mut self.em, ft, MapFlags::NONE)?;
                self.set_address(rs, offset)?;
                self.em.save_float_swap(self.fpr.r(ft), membase, sreg)
            }
            _ => self.comp_generic(op),
        }
    }

    pub(crate) fn comp_fpu_comp(&mut self, op: MipsOpcode) -> CompileResult<()> {
        self.comp_generic(op)
    }

    /// mfc1, mtc1; control register moves go through the interpreter.
    pub(crate) fn comp_mxc1(&mut self, op: MipsOpcode) -> CompileResult<()> {
        let fs = op.fs() as MipsReg;
        let rt = op.rt() as MipsReg;

        match op.rs() {
            // mfc1
            0 => {
                if rt == 0 {
                    return Ok(());
                }
                self.fpr.map_reg(&mut self.em, fs, MapFlags::NONE)?;
                self.gpr.map_reg(&mut self.em, rt, MapFlags::NOINIT | MapFlags::DIRTY)?;
                self.em.mov_from_fp(self.gpr.r(rt), self.fpr.r(fs))
            }
            // mtc1
            4 => {
                let dst = self.fpr.map_reg(&mut self.em, fs, MapFlags::NOINIT | MapFlags::DIRTY)?;
                let src = match self.gpr.get_imm(rt) {
                    Some(value) => {
                        let scratch = self.layout.addr_scratch;
                        self.em.mov_imm(scratch, value)?;
                        scratch
                    }
                    None => self.gpr.map_reg(&mut self.em, rt, MapFlags::NONE)?,
                };
                self.em.mov_to_fp(dst, src)
            }
            _ => self.comp_generic(op),
        }
    }
}
