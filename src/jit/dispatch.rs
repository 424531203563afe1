//! Opcode classification and the family handler table.

use super::Jit;
use crate::core::{CompileResult, Emitter, OpFamily};
use crate::mips::opcode::major;
use crate::mips::MipsOpcode;

/// Compilation handler for one opcode family.
pub type CompFn<E> = fn(&mut Jit<E>, MipsOpcode) -> CompileResult<()>;

/// Opcode family of an instruction word.
pub fn classify(op: MipsOpcode) -> OpFamily {
    let raw = op.raw();
    match op.major() {
        major::LUI | major::ORI | major::ADDIU => OpFamily::IType,
        major::LWC1 | major::SWC1 => OpFamily::FpuLs,
        major::LV_S | major::SV_S => OpFamily::Sv,
        major::LV_Q | major::SV_Q | major::LVLR_Q | major::SVLR_Q => OpFamily::Svq,
        major::COP1 => match op.rs() {
            0 | 2 | 4 | 6 => OpFamily::Mxc1,
            16 => match op.funct() {
                0..=3 => OpFamily::Fpu3op,
                4..=7 | 12..=15 | 36 => OpFamily::Fpu2op,
                48..=63 => OpFamily::FpuComp,
                _ => OpFamily::Other,
            },
            20 => OpFamily::Fpu2op,
            _ => OpFamily::Other,
        },
        major::VFPU0 => OpFamily::VecDo3,
        major::VFPU1 if (raw >> 23) & 7 == 0 => OpFamily::VecDo3,
        major::VFPU4 if (raw >> 21) & 0x1F == 0 => match (raw >> 16) & 0x1F {
            6 | 7 => OpFamily::VVectorInit,
            _ => OpFamily::Vv2op,
        },
        major::VFPU5 if (raw >> 24) & 3 != 3 => OpFamily::Vpfx,
        major::VFPU1 | major::VFPU3 | major::VFPU4 | major::VFPU5 | major::VFPU6 => OpFamily::VfpuOther,
        _ => OpFamily::Other,
    }
}

/// Whether running an instruction of `family` resets the VFPU prefixes.
pub fn consumes_prefixes(family: OpFamily) -> bool {
    matches!(
        family,
        OpFamily::VecDo3 | OpFamily::Vv2op | OpFamily::VVectorInit | OpFamily::VfpuOther
    )
}

/// Handler for `family`.
pub fn handler<E: Emitter>(family: OpFamily) -> CompFn<E> {
    match family {
        OpFamily::Fpu3op => Jit::comp_fpu3op,
        OpFamily::Fpu2op => Jit::comp_fpu2op,
        OpFamily::FpuLs => Jit::comp_fpuls,
        OpFamily::FpuComp => Jit::comp_fpu_comp,
        OpFamily::Mxc1 => Jit::comp_mxc1,
        OpFamily::Sv => Jit::comp_sv,
        OpFamily::Svq => Jit::comp_svq,
        OpFamily::VecDo3 => Jit::comp_vec_do3,
        OpFamily::Vv2op => Jit::comp_vv2op,
        OpFamily::VVectorInit => Jit::comp_vvector_init,
        OpFamily::IType => Jit::comp_itype,
        OpFamily::Vpfx => Jit::comp_vpfx,
        OpFamily::VfpuOther | OpFamily::Other => Jit::comp_generic,
    }
}
