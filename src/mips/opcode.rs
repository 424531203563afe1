// This module defines MipsOpcode, the decoded form of a single 32-bit Allegrex instruction
// word. The word itself is kept verbatim and every field (major opcode, rs/rt/rd, the
// scalar FPU fs/ft/fd registers, the signed and unsigned 16-bit immediates, funct) is
// extracted on demand with the fixed shifts and masks of the MIPS encoding. VFPU
// instructions add their own fields: the 7-bit vs/vt/vd register specifiers and the
// two scattered bits that select the vector size. A decoded opcode is immutable; handlers
// derive every other value they need from it.

//! Decoded guest instruction words.

use std::fmt;

/// Major opcode numbers (bits 26..32) used by the translator.
pub mod major {
    pub const ADDIU: u32 = 9;
    pub const ORI: u32 = 13;
    pub const LUI: u32 = 15;
    pub const COP1: u32 = 17;
    pub const VFPU0: u32 = 24;
    pub const VFPU1: u32 = 25;
    pub const VFPU3: u32 = 27;
    pub const LWC1: u32 = 49;
    pub const LV_S: u32 = 50;
    pub const VFPU4: u32 = 52;
    pub const LVLR_Q: u32 = 53;
    pub const LV_Q: u32 = 54;
    pub const VFPU5: u32 = 55;
    pub const SWC1: u32 = 57;
    pub const SV_S: u32 = 58;
    pub const VFPU6: u32 = 60;
    pub const SVLR_Q: u32 = 61;
    pub const SV_Q: u32 = 62;
}

/// A single encoded guest instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MipsOpcode(pub u32);

impl MipsOpcode {
    pub const fn new(word: u32) -> Self {
        Self(word)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Major opcode, bits 26..32.
    pub const fn major(self) -> u32 {
        self.0 >> 26
    }

    pub const fn rs(self) -> usize {
        ((self.0 >> 21) & 0x1F) as usize
    }

    pub const fn rt(self) -> usize {
        ((self.0 >> 16) & 0x1F) as usize
    }

    pub const fn rd(self) -> usize {
        ((self.0 >> 11) & 0x1F) as usize
    }

    pub const fn fs(self) -> usize {
        ((self.0 >> 11) & 0x1F) as usize
    }

    pub const fn ft(self) -> usize {
        ((self.0 >> 16) & 0x1F) as usize
    }

    pub const fn fd(self) -> usize {
        ((self.0 >> 6) & 0x1F) as usize
    }

    pub const fn funct(self) -> u32 {
        self.0 & 0x3F
    }

    pub const fn imm16(self) -> u32 {
        self.0 & 0xFFFF
    }

    pub const fn simm16(self) -> i32 {
        (self.0 & 0xFFFF) as u16 as i16 as i32
    }

    /// Offset of the VFPU load/store forms; the low two bits encode registers.
    pub const fn vfpu_mem_offset(self) -> i32 {
        (self.0 & 0xFFFC) as u16 as i16 as i32
    }

    /// Target register of `lv.s`/`sv.s`: five bits from rt plus two from the offset field.
    pub const fn vt_single_mem(self) -> usize {
        (((self.0 >> 16) & 0x1F) | ((self.0 & 3) << 5)) as usize
    }

    /// Target register of `lv.q`/`sv.q`: five bits from rt plus one from the offset field.
    pub const fn vt_quad_mem(self) -> usize {
        (((self.0 >> 16) & 0x1F) | ((self.0 & 1) << 5)) as usize
    }

    pub const fn vd(self) -> usize {
        (self.0 & 0x7F) as usize
    }

    pub const fn vs(self) -> usize {
        ((self.0 >> 8) & 0x7F) as usize
    }

    pub const fn vt(self) -> usize {
        ((self.0 >> 16) & 0x7F) as usize
    }
}

impl From<u32> for MipsOpcode {
    fn from(word: u32) -> Self {
        Self(word)
    }
}

impl fmt::Debug for MipsOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MipsOpcode({:#010x})", self.0)
    }
}

impl fmt::Display for MipsOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_fields() {
        // add.s $f3, $f1, $f2
        let op = MipsOpcode::new(0x4602_08C0);
        assert_eq!(op.major(), major::COP1);
        assert_eq!(op.rs(), 16);
        assert_eq!(op.ft(), 2);
        assert_eq!(op.fs(), 1);
        assert_eq!(op.fd(), 3);
        assert_eq!(op.funct(), 0);
    }

    #[test]
    fn test_signed_immediates() {
        let op = MipsOpcode::new(0xC4A4_FFF0); // lwc1 $f4, -16($a1)
        assert_eq!(op.major(), major::LWC1);
        assert_eq!(op.simm16(), -16);
        assert_eq!(op.rs(), 5);
        assert_eq!(op.ft(), 4);
    }

    #[test]
    fn test_vfpu_memory_register_bits() {
        // lv.q with rt bits 0b00011 and the extra bit set
        let op = MipsOpcode::new((major::LV_Q << 26) | (3 << 16) | 0x0011);
        assert_eq!(op.vt_quad_mem(), 3 | 32);
        assert_eq!(op.vfpu_mem_offset(), 0x10);

        let op = MipsOpcode::new((major::LV_S << 26) | (3 << 16) | 0x0012);
        assert_eq!(op.vt_single_mem(), 3 | (2 << 5));
    }
}
