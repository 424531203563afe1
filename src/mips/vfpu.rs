//! VFPU register addressing.
//!
//! The VFPU has 128 single-precision registers arranged as eight 4x4 matrices.
//! Instructions name a vector with a 7-bit specifier that packs the matrix
//! number, a column, a row offset and a transpose bit; the access width (single,
//! pair, triple, quad) decides how many lanes the specifier expands to and
//! which of the bits are interpreted as the row. Register index `i` in the
//! expanded group addresses `CpuState::vpr[i]`.

use super::opcode::MipsOpcode;

/// Vector access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorSize {
    Single,
    Pair,
    Triple,
    Quad,
}

impl VectorSize {
    /// Number of lanes covered by this width.
    pub const fn lanes(self) -> usize {
        match self {
            VectorSize::Single => 1,
            VectorSize::Pair => 2,
            VectorSize::Triple => 3,
            VectorSize::Quad => 4,
        }
    }

    /// Size selected by bits 7 and 15 of a VFPU arithmetic instruction.
    pub const fn of_op(op: MipsOpcode) -> Self {
        let a = (op.raw() >> 7) & 1;
        let b = (op.raw() >> 14) & 2;
        match a | b {
            0 => VectorSize::Single,
            1 => VectorSize::Pair,
            2 => VectorSize::Triple,
            _ => VectorSize::Quad,
        }
    }
}

/// Ordered group of up to four VFPU register indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorRegs {
    regs: [u8; 4],
    len: usize,
}

impl VectorRegs {
    pub fn as_slice(&self) -> &[u8] {
        &self.regs[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lane(&self, i: usize) -> u8 {
        self.as_slice()[i]
    }
}

/// Expand a vector specifier into its lane registers.
///
/// Lane `i` of the result is always lane `i` of the access; the expansion is a
/// pure function of `(size, vreg)`.
pub fn get_vector_regs(size: VectorSize, vreg: usize) -> VectorRegs {
    let mtx = (vreg >> 2) & 7;
    let col = vreg & 3;
    let mut transpose = (vreg >> 5) & 1;
    let row = match size {
        VectorSize::Single => {
            transpose = 0;
            (vreg >> 5) & 3
        }
        VectorSize::Pair => (vreg >> 5) & 2,
        VectorSize::Triple => (vreg >> 6) & 1,
        VectorSize::Quad => (vreg >> 5) & 2,
    };

    let mut regs = [0u8; 4];
    let len = size.lanes();
    for (i, slot) in regs.iter_mut().enumerate().take(len) {
        let mut index = mtx * 4;
        if transpose != 0 {
            index += ((row + i) & 3) + col * 32;
        } else {
            index += col + ((row + i) & 3) * 32;
        }
        *slot = index as u8;
    }

    VectorRegs { regs, len }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_is_identity_for_low_specifiers() {
        for vreg in 0..128 {
            let regs = get_vector_regs(VectorSize::Single, vreg);
            assert_eq!(regs.len(), 1);
            assert_eq!(regs.lane(0) as usize, vreg);
        }
    }

    #[test]
    fn test_quad_column_and_row() {
        // C000: matrix 0, column 0, lanes go down the column (stride 32).
        let c000 = get_vector_regs(VectorSize::Quad, 0);
        assert_eq!(c000.as_slice(), &[0, 32, 64, 96]);

        // R000: transposed, lanes go along the row.
        let r000 = get_vector_regs(VectorSize::Quad, 32);
        assert_eq!(r000.as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_pair_and_triple_offsets() {
        // C002 pair: row offset 2
        let c002 = get_vector_regs(VectorSize::Pair, 64);
        assert_eq!(c002.as_slice(), &[64, 96]);

        // C001 triple: row offset 1
        let c001 = get_vector_regs(VectorSize::Triple, 64);
        assert_eq!(c001.as_slice(), &[32, 64, 96]);
    }

    #[test]
    fn test_expansion_is_deterministic() {
        for size in [VectorSize::Single, VectorSize::Pair, VectorSize::Triple, VectorSize::Quad] {
            for vreg in 0..128 {
                assert_eq!(get_vector_regs(size, vreg), get_vector_regs(size, vreg));
                assert_eq!(get_vector_regs(size, vreg).len(), size.lanes());
            }
        }
    }

    #[test]
    fn test_size_bits() {
        assert_eq!(VectorSize::of_op(MipsOpcode::new(0)), VectorSize::Single);
        assert_eq!(VectorSize::of_op(MipsOpcode::new(0x80)), VectorSize::Pair);
        assert_eq!(VectorSize::of_op(MipsOpcode::new(0x8000)), VectorSize::Triple);
        assert_eq!(VectorSize::of_op(MipsOpcode::new(0x8080)), VectorSize::Quad);
    }
}
