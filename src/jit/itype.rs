//! Integer immediate handlers.
//!
//! These exist mainly to feed constant tracking: `lui`/`ori`/`addiu` chains
//! that build an address leave the register as a known immediate, which the
//! memory handlers then fold into a single constant.

use super::Jit;
use crate::core::{CompileResult, Emitter, MipsReg};
use crate::mips::opcode::major;
use crate::mips::MipsOpcode;

impl<E: Emitter> Jit<E> {
    pub(crate) fn comp_itype(&mut self, op: MipsOpcode) -> CompileResult<()> {
        let rt = op.rt() as MipsReg;
        let rs = op.rs() as MipsReg;
        if rt == 0 {
            return Ok(());
        }

        match op.major() {
            major::LUI => {
                self.gpr.set_imm(rt, op.imm16() << 16);
                Ok(())
            }
            major::ORI => {
                let imm = op.imm16();
                if let Some(value) = self.gpr.get_imm(rs) {
                    self.gpr.set_imm(rt, value | imm);
                    return Ok(());
                }
                self.gpr.map_dirty_in(&mut self.em, rt, rs, true)?;
                if imm == 0 {
                    return self.em.mov(self.gpr.r(rt), self.gpr.r(rs));
                }
                self.em.or_imm(self.gpr.r(rt), self.gpr.r(rs), imm)
            }
            major::ADDIU => {
                let imm = op.simm16();
                if let Some(value) = self.gpr.get_imm(rs) {
                    self.gpr.set_imm(rt, value.wrapping_add(imm as u32));
                    return Ok(());
                }
                self.gpr.map_dirty_in(&mut self.em, rt, rs, true)?;
                if imm == 0 {
                    return self.em.mov(self.gpr.r(rt), self.gpr.r(rs));
                }
                self.em.add_imm(self.gpr.r(rt), self.gpr.r(rs), imm)
            }
            _ => self.comp_generic(op),
        }
    }
}
