//! Host register file bookkeeping.
//!
//! `RegisterFile` tracks which host registers are free, which guest register
//! currently owns each allocated one, and which are locked against eviction.
//! Victims are chosen with a clock sweep over the bank so the choice is
//! deterministic and bounded by one pass over the registers. The guest-facing
//! register caches in [`super::reg_cache`] sit on top of this and decide what
//! to emit when a register changes hands.

/// Maximum number of register banks supported (GP, FP).
pub const MAX_REGISTER_BANKS: usize = 2;

/// Maximum number of registers per bank.
pub const MAX_REGISTERS_PER_BANK: usize = 32;

/// Bank holding general-purpose host registers.
pub const BANK_GP: RegBank = 0;
/// Bank holding scalar/vector floating-point host registers.
pub const BANK_FP: RegBank = 1;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// Combined host register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }

    pub const fn gp(id: RegId) -> Self {
        Self::new(BANK_GP, id)
    }

    pub const fn fp(id: RegId) -> Self {
        Self::new(BANK_FP, id)
    }

    pub const fn is_gp(&self) -> bool {
        self.bank == BANK_GP
    }

    pub const fn is_fp(&self) -> bool {
        self.bank == BANK_FP
    }
}

impl std::fmt::Display for AsmReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bank {
            BANK_GP => write!(f, "g{}", self.id),
            BANK_FP => write!(f, "f{}", self.id),
            bank => write!(f, "b{}:{}", bank, self.id),
        }
    }
}

/// Bit set for tracking host register sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet {
    banks: [u64; MAX_REGISTER_BANKS],
}

impl RegBitSet {
    pub const fn new() -> Self {
        Self {
            banks: [0; MAX_REGISTER_BANKS],
        }
    }

    /// Set built from a list of registers.
    pub fn from_regs(regs: &[AsmReg]) -> Self {
        let mut set = Self::new();
        for &reg in regs {
            set.set(reg);
        }
        set
    }

    pub fn contains(&self, reg: AsmReg) -> bool {
        if reg.bank as usize >= MAX_REGISTER_BANKS || reg.id >= 64 {
            return false;
        }
        (self.banks[reg.bank as usize] & (1u64 << reg.id)) != 0
    }

    pub fn set(&mut self, reg: AsmReg) {
        if (reg.bank as usize) < MAX_REGISTER_BANKS && reg.id < 64 {
            self.banks[reg.bank as usize] |= 1u64 << reg.id;
        }
    }

    pub fn clear(&mut self, reg: AsmReg) {
        if (reg.bank as usize) < MAX_REGISTER_BANKS && reg.id < 64 {
            self.banks[reg.bank as usize] &= !(1u64 << reg.id);
        }
    }

    pub fn union(&mut self, other: &RegBitSet) {
        for i in 0..MAX_REGISTER_BANKS {
            self.banks[i] |= other.banks[i];
        }
    }

    /// Count number of set registers in bank.
    pub fn count_in_bank(&self, bank: RegBank) -> u32 {
        if bank as usize >= MAX_REGISTER_BANKS {
            return 0;
        }
        self.banks[bank as usize].count_ones()
    }

    /// Registers of `bank` set in `self` and not in `exclude`, lowest first.
    pub fn iter_bank(&self, bank: RegBank, exclude: &RegBitSet) -> impl Iterator<Item = AsmReg> {
        let mut bits = self.banks[bank as usize] & !exclude.banks[bank as usize];
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let id = bits.trailing_zeros() as RegId;
            bits &= bits - 1;
            Some(AsmReg::new(bank, id))
        })
    }

    pub fn clear_all(&mut self) {
        self.banks.fill(0);
    }
}

/// Allocation state of one bank of host registers.
///
/// Owners are guest register indices of whichever cache drives this file.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    bank: RegBank,
    /// Registers available for allocation (reserved ones are never handed out).
    allocatable: RegBitSet,
    /// Currently allocated registers.
    used: RegBitSet,
    /// Registers that cannot be evicted.
    locked: RegBitSet,
    /// Clock hand for victim selection.
    clock: RegId,
    /// Guest register owning each host register.
    owners: [Option<u16>; MAX_REGISTERS_PER_BANK],
    evictions: u64,
}

impl RegisterFile {
    /// Create a register file for `bank` handing out only `allocatable` registers.
    pub fn new(bank: RegBank, allocatable: RegBitSet) -> Self {
        assert!((bank as usize) < MAX_REGISTER_BANKS, "Invalid register bank");
        Self {
            bank,
            allocatable,
            used: RegBitSet::new(),
            locked: RegBitSet::new(),
            clock: 0,
            owners: [None; MAX_REGISTERS_PER_BANK],
            evictions: 0,
        }
    }

    pub fn bank(&self) -> RegBank {
        self.bank
    }

    /// First allocatable register that is neither used nor excluded.
    pub fn find_free(&self, exclude: &RegBitSet) -> Option<AsmReg> {
        let mut unavailable = self.used;
        unavailable.union(exclude);
        self.allocatable.iter_bank(self.bank, &unavailable).next()
    }

    /// Next eviction candidate under the clock hand.
    ///
    /// Advances the hand past the returned register so repeated evictions
    /// rotate through the bank.
    pub fn find_clocked_evictable(&mut self, exclude: &RegBitSet) -> Option<AsmReg> {
        for _ in 0..MAX_REGISTERS_PER_BANK {
            let reg = AsmReg::new(self.bank, self.clock);
            self.clock = (self.clock + 1) % MAX_REGISTERS_PER_BANK as RegId;

            if self.is_evictable(reg, exclude) {
                return Some(reg);
            }
        }
        None
    }

    fn is_evictable(&self, reg: AsmReg, exclude: &RegBitSet) -> bool {
        self.allocatable.contains(reg)
            && self.used.contains(reg)
            && !self.locked.contains(reg)
            && !exclude.contains(reg)
    }

    /// Number of registers a new binding could obtain without touching `exclude`.
    pub fn available(&self, exclude: &RegBitSet) -> usize {
        self.allocatable
            .iter_bank(self.bank, exclude)
            .filter(|&reg| !self.used.contains(reg) || !self.locked.contains(reg))
            .count()
    }

    pub fn assign(&mut self, reg: AsmReg, owner: u16) {
        debug_assert!(self.allocatable.contains(reg), "{reg} is not allocatable");
        self.used.set(reg);
        self.owners[reg.id as usize] = Some(owner);
    }

    /// Release a register, returning its previous owner.
    pub fn free(&mut self, reg: AsmReg) -> Option<u16> {
        self.used.clear(reg);
        self.locked.clear(reg);
        self.owners[reg.id as usize].take()
    }

    /// Record that `reg` was taken from a live owner.
    pub fn note_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn lock(&mut self, reg: AsmReg) {
        if self.used.contains(reg) {
            self.locked.set(reg);
        }
    }

    pub fn unlock(&mut self, reg: AsmReg) {
        self.locked.clear(reg);
    }

    pub fn unlock_all(&mut self) {
        self.locked.clear_all();
    }

    pub fn owner(&self, reg: AsmReg) -> Option<u16> {
        if reg.bank != self.bank {
            return None;
        }
        self.owners.get(reg.id as usize).copied().flatten()
    }

    pub fn is_allocated(&self, reg: AsmReg) -> bool {
        self.used.contains(reg)
    }

    pub fn is_locked(&self, reg: AsmReg) -> bool {
        self.locked.contains(reg)
    }

    /// (used, locked, allocatable) counts.
    pub fn usage(&self) -> (u32, u32, u32) {
        (
            self.used.count_in_bank(self.bank),
            self.locked.count_in_bank(self.bank),
            self.allocatable.count_in_bank(self.bank),
        )
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Reset for a new block.
    pub fn reset(&mut self) {
        self.used.clear_all();
        self.locked.clear_all();
        self.clock = 0;
        self.owners.fill(None);
    }
}
