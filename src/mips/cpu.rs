//! Guest CPU register state.
//!
//! `CpuState` is laid out `#[repr(C)]` so generated host code can address
//! every guest register as a fixed offset from the context register.

use std::mem::offset_of;

/// VFPU control register indices inside `CpuState::vfpu_ctrl`.
pub mod vfpu_ctrl {
    pub const SPREFIX: usize = 0;
    pub const TPREFIX: usize = 1;
    pub const DPREFIX: usize = 2;
    pub const CC: usize = 3;
}

/// Identity source/target prefix (swizzle xyzw, no modifiers).
pub const DEFAULT_ST_PREFIX: u32 = 0xE4;
/// Identity destination prefix.
pub const DEFAULT_D_PREFIX: u32 = 0;

pub const NUM_VFPU_TEMPS: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, PartialEq)]
pub struct CpuState {
    pub gpr: [u32; 32],
    pub fpr: [u32; 32],
    pub vpr: [u32; 128],
    /// Backing store for VFPU temporaries evicted mid-instruction.
    pub vtemp: [u32; NUM_VFPU_TEMPS],
    pub hi: u32,
    pub lo: u32,
    pub pc: u32,
    pub fcr31: u32,
    pub vfpu_ctrl: [u32; 16],
}

impl CpuState {
    pub fn new() -> Self {
        let mut vfpu_ctrl = [0; 16];
        vfpu_ctrl[vfpu_ctrl::SPREFIX] = DEFAULT_ST_PREFIX;
        vfpu_ctrl[vfpu_ctrl::TPREFIX] = DEFAULT_ST_PREFIX;
        vfpu_ctrl[vfpu_ctrl::DPREFIX] = DEFAULT_D_PREFIX;
        Self {
            gpr: [0; 32],
            fpr: [0; 32],
            vpr: [0; 128],
            vtemp: [0; NUM_VFPU_TEMPS],
            hi: 0,
            lo: 0,
            pc: 0,
            fcr31: 0,
            vfpu_ctrl,
        }
    }

    pub fn f(&self, reg: usize) -> f32 {
        f32::from_bits(self.fpr[reg])
    }

    pub fn set_f(&mut self, reg: usize, value: f32) {
        self.fpr[reg] = value.to_bits();
    }

    pub fn v(&self, reg: usize) -> f32 {
        f32::from_bits(self.vpr[reg])
    }

    pub fn set_v(&mut self, reg: usize, value: f32) {
        self.vpr[reg] = value.to_bits();
    }

    pub fn has_default_prefixes(&self) -> bool {
        self.vfpu_ctrl[vfpu_ctrl::SPREFIX] == DEFAULT_ST_PREFIX
            && self.vfpu_ctrl[vfpu_ctrl::TPREFIX] == DEFAULT_ST_PREFIX
            && self.vfpu_ctrl[vfpu_ctrl::DPREFIX] == DEFAULT_D_PREFIX
    }

    pub fn read_slot(&self, slot: CtxSlot) -> u32 {
        match slot {
            CtxSlot::Gpr(r) => self.gpr[r as usize],
            CtxSlot::Hi => self.hi,
            CtxSlot::Lo => self.lo,
            CtxSlot::Fpr(r) => self.fpr[r as usize],
            CtxSlot::Vpr(r) => self.vpr[r as usize],
            CtxSlot::VTemp(r) => self.vtemp[r as usize],
            CtxSlot::Pc => self.pc,
            CtxSlot::VfpuCtrl(r) => self.vfpu_ctrl[r as usize],
        }
    }

    pub fn write_slot(&mut self, slot: CtxSlot, value: u32) {
        match slot {
            CtxSlot::Gpr(0) => {}
            CtxSlot::Gpr(r) => self.gpr[r as usize] = value,
            CtxSlot::Hi => self.hi = value,
            CtxSlot::Lo => self.lo = value,
            CtxSlot::Fpr(r) => self.fpr[r as usize] = value,
            CtxSlot::Vpr(r) => self.vpr[r as usize] = value,
            CtxSlot::VTemp(r) => self.vtemp[r as usize] = value,
            CtxSlot::Pc => self.pc = value,
            CtxSlot::VfpuCtrl(r) => self.vfpu_ctrl[r as usize] = value,
        }
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

/// A 32-bit storage location inside `CpuState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtxSlot {
    Gpr(u8),
    Hi,
    Lo,
    Fpr(u8),
    Vpr(u8),
    VTemp(u8),
    Pc,
    VfpuCtrl(u8),
}

impl CtxSlot {
    /// Byte offset of the slot from the start of `CpuState`.
    pub fn offset(self) -> i32 {
        let word = std::mem::size_of::<u32>();
        let off = match self {
            CtxSlot::Gpr(r) => offset_of!(CpuState, gpr) + r as usize * word,
            CtxSlot::Hi => offset_of!(CpuState, hi),
            CtxSlot::Lo => offset_of!(CpuState, lo),
            CtxSlot::Fpr(r) => offset_of!(CpuState, fpr) + r as usize * word,
            CtxSlot::Vpr(r) => offset_of!(CpuState, vpr) + r as usize * word,
            CtxSlot::VTemp(r) => offset_of!(CpuState, vtemp) + r as usize * word,
            CtxSlot::Pc => offset_of!(CpuState, pc),
            CtxSlot::VfpuCtrl(r) => offset_of!(CpuState, vfpu_ctrl) + r as usize * word,
        };
        off as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_offsets_follow_layout() {
        assert_eq!(CtxSlot::Gpr(0).offset(), 0);
        assert_eq!(CtxSlot::Gpr(31).offset(), 124);
        assert_eq!(CtxSlot::Fpr(0).offset(), 128);
        assert_eq!(CtxSlot::Vpr(0).offset(), 256);
        assert_eq!(CtxSlot::VTemp(0).offset(), 256 + 128 * 4);
    }

    #[test]
    fn test_zero_register_ignores_writes() {
        let mut cpu = CpuState::new();
        cpu.write_slot(CtxSlot::Gpr(0), 7);
        cpu.write_slot(CtxSlot::Gpr(1), 7);
        assert_eq!(cpu.gpr[0], 0);
        assert_eq!(cpu.gpr[1], 7);
    }

    #[test]
    fn test_new_state_has_identity_prefixes() {
        assert!(CpuState::new().has_default_prefixes());
    }
}
