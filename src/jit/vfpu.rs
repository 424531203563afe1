//! VFPU handlers.

use super::overlap::{is_overlap_safe, is_overlap_safe_allow_s};
use super::Jit;
use crate::core::{CompileResult, Emitter, FpBinOp, FpUnOp, MapFlags};
use crate::mips::opcode::major;
use crate::mips::{get_vector_regs, MipsOpcode, VectorRegs, VectorSize};

impl<E: Emitter> Jit<E> {
    /// lv.s, sv.s
    pub(crate) fn comp_sv(&mut self, op: MipsOpcode) -> CompileResult<()> {
        let offset = op.vfpu_mem_offset();
        let vt = op.vt_single_mem() as u8;
        let rs = op.rs();
        let (membase, sreg) = (self.layout.membase, self.layout.addr_scratch);

        match op.major() {
            major::LV_S => {
                self.fpr.spill_lock_v(vt);
                self.fpr.map_reg_v(&mut self.em, vt, MapFlags::DIRTY | MapFlags::NOINIT)?;
                self.set_address(rs, offset)?;
                self.em.load_float_swap(self.fpr.v(vt), membase, sreg)
            }
            major::SV_S => {
                self.fpr.spill_lock_v(vt);
                self.fpr.map_reg_v(&mut self.em, vt, MapFlags::NONE)?;
                self.set_address(rs, offset)?;
                self.em.save_float_swap(self.fpr.v(vt), membase, sreg)
            }
            _ => self.comp_generic(op),
        }
    }

    /// lv.q, sv.q
    ///
    /// The host address is formed once; lanes are reached through a small
    /// offset register.
    pub(crate) fn comp_svq(&mut self, op: MipsOpcode) -> CompileResult<()> {
        let offset = op.vfpu_mem_offset();
        let vregs = get_vector_regs(VectorSize::Quad, op.vt_quad_mem());
        let rs = op.rs();
        let (sreg, lane) = (self.layout.addr_scratch, self.layout.lane_scratch);

        match op.major() {
            major::LV_Q => {
                self.fpr
                    .map_regs_and_spill_lock_v(&mut self.em, vregs.as_slice(), MapFlags::DIRTY | MapFlags::NOINIT)?;
                self.set_host_address(rs, offset)?;
                for (i, &vreg) in vregs.as_slice().iter().enumerate() {
                    self.em.mov_imm(lane, 4 * i as u32)?;
                    self.em.load_float_swap(self.fpr.v(vreg), sreg, lane)?;
                }
                Ok(())
            }
            major::SV_Q => {
                self.fpr
                    .map_regs_and_spill_lock_v(&mut self.em, vregs.as_slice(), MapFlags::NONE)?;
                self.set_host_address(rs, offset)?;
                for (i, &vreg) in vregs.as_slice().iter().enumerate() {
                    self.em.mov_imm(lane, 4 * i as u32)?;
                    self.em.save_float_swap(self.fpr.v(vreg), sreg, lane)?;
                }
                Ok(())
            }
            _ => self.comp_generic(op),
        }
    }

    pub(crate) fn comp_vpfx(&mut self, op: MipsOpcode) -> CompileResult<()> {
        self.comp_generic(op)
    }

    /// vadd, vsub, vdiv, vmul
    pub(crate) fn comp_vec_do3(&mut self, op: MipsOpcode) -> CompileResult<()> {
        if !self.prefixes_are_default() {
            return self.comp_generic(op);
        }
        let bin = match (op.major(), (op.raw() >> 23) & 7) {
            (major::VFPU0, 0) => FpBinOp::Add,
            (major::VFPU0, 1) => FpBinOp::Sub,
            (major::VFPU0, 7) => FpBinOp::Div,
            (major::VFPU1, 0) => FpBinOp::Mul,
            _ => return self.comp_generic(op),
        };

        let sz = VectorSize::of_op(op);
        let sregs = get_vector_regs(sz, op.vs());
        let tregs = get_vector_regs(sz, op.vt());
        let dregs = get_vector_regs(sz, op.vd());

        self.fpr
            .map_regs_and_spill_lock_v(&mut self.em, sregs.as_slice(), MapFlags::NONE)?;
        self.fpr
            .map_regs_and_spill_lock_v(&mut self.em, tregs.as_slice(), MapFlags::NONE)?;

        let mut staged = [None; 4];
        for i in 0..dregs.len() {
            let (d, s, t) = (dregs.lane(i), sregs.lane(i), tregs.lane(i));
            let dst = if is_overlap_safe_allow_s(d, i, sregs.as_slice(), tregs.as_slice()) {
                self.fpr.map_dirty_in_in_v(&mut self.em, d, s, t, true)?;
                self.fpr.v(d)
            } else {
                let temp = self.fpr.get_temp_v(&mut self.em)?;
                staged[i] = Some(temp);
                self.fpr.v(temp)
            };
            self.em.fp_binop(bin, dst, self.fpr.v(s), self.fpr.v(t))?;
        }

        self.commit_staged(&dregs, &staged)
    }

    /// vmov, vabs, vneg
    pub(crate) fn comp_vv2op(&mut self, op: MipsOpcode) -> CompileResult<()> {
        if !self.prefixes_are_default() {
            return self.comp_generic(op);
        }
        let un = match (op.raw() >> 16) & 0x1F {
            0 => FpUnOp::Mov,
            1 => FpUnOp::Abs,
            2 => FpUnOp::Neg,
            _ => return self.comp_generic(op),
        };

        let sz = VectorSize::of_op(op);
        let sregs = get_vector_regs(sz, op.vs());
        let dregs = get_vector_regs(sz, op.vd());

        self.fpr
            .map_regs_and_spill_lock_v(&mut self.em, sregs.as_slice(), MapFlags::NONE)?;

        let mut staged = [None; 4];
        for i in 0..dregs.len() {
            let (d, s) = (dregs.lane(i), sregs.lane(i));
            let dst = if is_overlap_safe(d, i, sregs.as_slice(), &[]) {
                self.fpr.map_dirty_in_v(&mut self.em, d, s, true)?;
                self.fpr.v(d)
            } else {
                let temp = self.fpr.get_temp_v(&mut self.em)?;
                staged[i] = Some(temp);
                self.fpr.v(temp)
            };
            self.em.fp_unop(un, dst, self.fpr.v(s))?;
        }

        self.commit_staged(&dregs, &staged)
    }

    /// vzero, vone
    pub(crate) fn comp_vvector_init(&mut self, op: MipsOpcode) -> CompileResult<()> {
        if !self.prefixes_are_default() {
            return self.comp_generic(op);
        }
        let bits = match (op.raw() >> 16) & 0x1F {
            6 => 0.0f32.to_bits(),
            7 => 1.0f32.to_bits(),
            _ => return self.comp_generic(op),
        };

        let dregs = get_vector_regs(VectorSize::of_op(op), op.vd());
        self.fpr
            .map_regs_and_spill_lock_v(&mut self.em, dregs.as_slice(), MapFlags::DIRTY | MapFlags::NOINIT)?;

        let scratch = self.layout.addr_scratch;
        self.em.mov_imm(scratch, bits)?;
        for &d in dregs.as_slice() {
            self.em.mov_to_fp(self.fpr.v(d), scratch)?;
        }
        Ok(())
    }

    /// Copy lanes computed into temps to their destination once every source
    /// lane has been read.
    fn commit_staged(&mut self, dregs: &VectorRegs, staged: &[Option<u8>; 4]) -> CompileResult<()> {
        for (i, temp) in staged.iter().enumerate().take(dregs.len()) {
            let Some(temp) = *temp else { continue };
            let d = dregs.lane(i);
            self.fpr.map_dirty_in_v(&mut self.em, d, temp, true)?;
            self.em.fp_unop(FpUnOp::Mov, self.fpr.v(d), self.fpr.v(temp))?;
        }
        Ok(())
    }
}
