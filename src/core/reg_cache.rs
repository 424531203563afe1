// This module implements the guest register caches used while compiling a block. A cache
// maps guest register indices (GPRs plus HI/LO, or scalar FPRs, VFPU registers and VFPU
// temporaries) onto the host registers of one bank of the RegisterFile. Each guest register
// is in memory, bound to a host register, or (GPR cache only) a compile-time immediate.
// Bindings carry dirty, spill-lock and temp attributes. Mapping loads the current guest value
// from the CPU context unless NOINIT is requested; DIRTY schedules a write-back. Victims are
// chosen by the register file's clock sweep and never include spill-locked registers or
// registers already mapped for the current instruction. Running out of candidates is reported
// as CompileError::RegistersExhausted. Flushing writes dirty values back through the emitter;
// temps are always discarded, never written back.

//! Guest register caches.

use super::emitter::{Emitter, HostLayout};
use super::error::{CompileError, CompileResult};
use super::register_file::{AsmReg, RegBank, RegBitSet, RegisterFile, BANK_FP, BANK_GP};
use crate::mips::cpu::NUM_VFPU_TEMPS;
use crate::mips::CtxSlot;
use log::trace;
use std::ops::BitOr;

/// Index into a register cache.
pub type MipsReg = u16;

pub const REG_ZERO: MipsReg = 0;
pub const REG_HI: MipsReg = 32;
pub const REG_LO: MipsReg = 33;
pub const NUM_GPR_INDICES: usize = 34;

/// First VFPU register in the FPR cache index space.
pub const VFPU_BASE: MipsReg = 32;
/// First VFPU temporary in the FPR cache index space.
pub const VFPU_TEMP_BASE: MipsReg = 160;
pub const NUM_FPR_INDICES: usize = VFPU_TEMP_BASE as usize + NUM_VFPU_TEMPS;

/// First temporary in the VFPU index space used by the `_v` operations.
pub const VTEMP_BASE: u8 = 128;

/// Mapping flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapFlags(u8);

impl MapFlags {
    pub const NONE: MapFlags = MapFlags(0);
    /// The value will be fully overwritten; skip loading it.
    pub const NOINIT: MapFlags = MapFlags(1);
    /// The binding diverges from guest storage and must be written back.
    pub const DIRTY: MapFlags = MapFlags(2);

    pub fn contains(self, other: MapFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MapFlags {
    type Output = MapFlags;

    fn bitor(self, rhs: MapFlags) -> MapFlags {
        MapFlags(self.0 | rhs.0)
    }
}

/// Where a guest register currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegLoc {
    Mem,
    Imm(u32),
    Host(AsmReg),
}

#[derive(Debug, Clone, Copy)]
struct GuestReg {
    loc: RegLoc,
    dirty: bool,
    spill_lock: bool,
    temp: bool,
}

impl GuestReg {
    const UNBOUND: GuestReg = GuestReg {
        loc: RegLoc::Mem,
        dirty: false,
        spill_lock: false,
        temp: false,
    };
}

/// Which guest register file a cache serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Gpr,
    Fpr,
}

impl CacheKind {
    pub fn name(self) -> &'static str {
        match self {
            CacheKind::Gpr => "gpr",
            CacheKind::Fpr => "fpr",
        }
    }

    fn bank(self) -> RegBank {
        match self {
            CacheKind::Gpr => BANK_GP,
            CacheKind::Fpr => BANK_FP,
        }
    }

    fn num_indices(self) -> usize {
        match self {
            CacheKind::Gpr => NUM_GPR_INDICES,
            CacheKind::Fpr => NUM_FPR_INDICES,
        }
    }

    /// Context slot backing a cache index.
    pub fn slot(self, reg: MipsReg) -> CtxSlot {
        match self {
            CacheKind::Gpr => match reg {
                REG_HI => CtxSlot::Hi,
                REG_LO => CtxSlot::Lo,
                r => CtxSlot::Gpr(r as u8),
            },
            CacheKind::Fpr => match reg {
                r if r < VFPU_BASE => CtxSlot::Fpr(r as u8),
                r if r < VFPU_TEMP_BASE => CtxSlot::Vpr((r - VFPU_BASE) as u8),
                r => CtxSlot::VTemp((r - VFPU_TEMP_BASE) as u8),
            },
        }
    }
}

/// Cache index of a VFPU register or temporary given in VFPU index space.
pub const fn vfpu_index(vreg: u8) -> MipsReg {
    vreg as MipsReg + VFPU_BASE
}

/// Binding state of one guest register file for the current block.
#[derive(Debug, Clone)]
pub struct RegCache {
    kind: CacheKind,
    regs: Vec<GuestReg>,
    file: RegisterFile,
    /// Host registers mapped since the last release; never chosen as victims.
    in_use: RegBitSet,
    /// GP scratch used to write back immediates.
    imm_scratch: AsmReg,
}

impl RegCache {
    pub fn new(kind: CacheKind, layout: &HostLayout) -> Self {
        let allocatable = match kind {
            CacheKind::Gpr => layout.gp_allocatable,
            CacheKind::Fpr => layout.fp_allocatable,
        };
        let mut cache = Self {
            kind,
            regs: vec![GuestReg::UNBOUND; kind.num_indices()],
            file: RegisterFile::new(kind.bank(), allocatable),
            in_use: RegBitSet::new(),
            imm_scratch: layout.addr_scratch,
        };
        cache.reset();
        cache
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Forget every binding without emitting anything.
    pub fn reset(&mut self) {
        self.regs.fill(GuestReg::UNBOUND);
        if self.kind == CacheKind::Gpr {
            self.regs[REG_ZERO as usize].loc = RegLoc::Imm(0);
        }
        self.file.reset();
        self.in_use.clear_all();
    }

    pub fn loc(&self, reg: MipsReg) -> RegLoc {
        self.regs[reg as usize].loc
    }

    pub fn is_mapped(&self, reg: MipsReg) -> bool {
        matches!(self.loc(reg), RegLoc::Host(_))
    }

    pub fn is_dirty(&self, reg: MipsReg) -> bool {
        self.regs[reg as usize].dirty
    }

    pub fn is_temp(&self, reg: MipsReg) -> bool {
        self.regs[reg as usize].temp
    }

    pub fn is_spill_locked(&self, reg: MipsReg) -> bool {
        self.regs[reg as usize].spill_lock
    }

    pub fn evictions(&self) -> u64 {
        self.file.evictions()
    }

    /// Number of guest registers currently bound to host registers.
    pub fn mapped_count(&self) -> usize {
        self.regs
            .iter()
            .filter(|r| matches!(r.loc, RegLoc::Host(_)))
            .count()
    }

    /// Host register bound to `reg`.
    ///
    /// # Panics
    /// If `reg` has not been mapped.
    pub fn r(&self, reg: MipsReg) -> AsmReg {
        match self.loc(reg) {
            RegLoc::Host(host) => host,
            loc => panic!("{} register {} used without a mapping ({:?})", self.kind.name(), reg, loc),
        }
    }

    /// Host register bound to VFPU register (or temp) `vreg`.
    pub fn v(&self, vreg: u8) -> AsmReg {
        self.r(vfpu_index(vreg))
    }

    pub fn spill_lock(&mut self, reg: MipsReg) {
        self.regs[reg as usize].spill_lock = true;
        if let RegLoc::Host(host) = self.loc(reg) {
            self.file.lock(host);
        }
    }

    /// Release the lock on one register and let it be chosen as a victim again.
    pub fn release_spill_lock(&mut self, reg: MipsReg) {
        self.regs[reg as usize].spill_lock = false;
        if let RegLoc::Host(host) = self.loc(reg) {
            self.file.unlock(host);
            self.in_use.clear(host);
        }
    }

    pub fn spill_lock_v(&mut self, vreg: u8) {
        self.spill_lock(vfpu_index(vreg));
    }

    /// Bind `reg` to a host register, loading it unless `NOINIT` is given.
    pub fn map_reg<E: Emitter>(
        &mut self,
        em: &mut E,
        reg: MipsReg,
        flags: MapFlags,
    ) -> CompileResult<AsmReg> {
        let dirty = flags.contains(MapFlags::DIRTY) && !self.is_zero(reg);
        let state = self.regs[reg as usize];

        let host = match state.loc {
            RegLoc::Host(host) => host,
            RegLoc::Imm(value) => {
                let host = self.alloc(em)?;
                if !flags.contains(MapFlags::NOINIT) {
                    em.mov_imm(host, value)?;
                }
                host
            }
            RegLoc::Mem => {
                let host = self.alloc(em)?;
                if !flags.contains(MapFlags::NOINIT) && !state.temp {
                    em.load_ctx(host, self.kind.slot(reg))?;
                }
                host
            }
        };

        if !matches!(state.loc, RegLoc::Host(_)) {
            self.file.assign(host, reg);
        }
        let entry = &mut self.regs[reg as usize];
        entry.loc = RegLoc::Host(host);
        entry.dirty |= dirty;
        if entry.spill_lock {
            self.file.lock(host);
        }
        self.in_use.set(host);
        Ok(host)
    }

    /// Map `d` for writing and `s`, `t` for reading.
    ///
    /// `d` is loaded as well when it aliases a source or `avoid_load` is false.
    pub fn map_dirty_in_in<E: Emitter>(
        &mut self,
        em: &mut E,
        d: MipsReg,
        s: MipsReg,
        t: MipsReg,
        avoid_load: bool,
    ) -> CompileResult<()> {
        self.spill_lock(d);
        self.spill_lock(s);
        self.spill_lock(t);
        let load = !avoid_load || d == s || d == t;
        self.map_reg(em, s, MapFlags::NONE)?;
        self.map_reg(em, t, MapFlags::NONE)?;
        self.map_reg(em, d, dirty_flags(load))?;
        Ok(())
    }

    pub fn map_dirty_in<E: Emitter>(
        &mut self,
        em: &mut E,
        d: MipsReg,
        s: MipsReg,
        avoid_load: bool,
    ) -> CompileResult<()> {
        self.spill_lock(d);
        self.spill_lock(s);
        let load = !avoid_load || d == s;
        self.map_reg(em, s, MapFlags::NONE)?;
        self.map_reg(em, d, dirty_flags(load))?;
        Ok(())
    }

    pub fn map_reg_v<E: Emitter>(&mut self, em: &mut E, vreg: u8, flags: MapFlags) -> CompileResult<AsmReg> {
        self.map_reg(em, vfpu_index(vreg), flags)
    }

    pub fn map_dirty_in_in_v<E: Emitter>(
        &mut self,
        em: &mut E,
        vd: u8,
        vs: u8,
        vt: u8,
        avoid_load: bool,
    ) -> CompileResult<()> {
        self.map_dirty_in_in(em, vfpu_index(vd), vfpu_index(vs), vfpu_index(vt), avoid_load)
    }

    pub fn map_dirty_in_v<E: Emitter>(&mut self, em: &mut E, vd: u8, vs: u8, avoid_load: bool) -> CompileResult<()> {
        self.map_dirty_in(em, vfpu_index(vd), vfpu_index(vs), avoid_load)
    }

    /// Map and spill-lock every lane of a vector group, or nothing.
    ///
    /// The free capacity is checked before any lane is touched, so a failure
    /// leaves the cache exactly as it was.
    pub fn map_regs_and_spill_lock_v<E: Emitter>(
        &mut self,
        em: &mut E,
        vregs: &[u8],
        flags: MapFlags,
    ) -> CompileResult<()> {
        let mut exclude = self.in_use;
        let mut needed = 0;
        for &vreg in vregs {
            match self.loc(vfpu_index(vreg)) {
                RegLoc::Host(host) => exclude.set(host),
                _ => needed += 1,
            }
        }
        if needed > self.file.available(&exclude) {
            return Err(self.exhausted());
        }

        for &vreg in vregs {
            self.spill_lock_v(vreg);
            self.map_reg_v(em, vreg, flags)?;
        }
        Ok(())
    }

    /// Allocate a VFPU temporary, returned in VFPU index space.
    ///
    /// The temp is bound, spill-locked and discarded at the next release.
    pub fn get_temp_v<E: Emitter>(&mut self, em: &mut E) -> CompileResult<u8> {
        let free = (0..NUM_VFPU_TEMPS as u8)
            .map(|k| VTEMP_BASE + k)
            .find(|&vreg| {
                let state = self.regs[vfpu_index(vreg) as usize];
                !state.temp && state.loc == RegLoc::Mem
            });
        let Some(vreg) = free else {
            return Err(self.exhausted());
        };

        let reg = vfpu_index(vreg);
        self.regs[reg as usize].temp = true;
        self.spill_lock(reg);
        if let Err(err) = self.map_reg(em, reg, MapFlags::NOINIT) {
            self.regs[reg as usize] = GuestReg::UNBOUND;
            return Err(err);
        }
        Ok(vreg)
    }

    /// Release every spill lock and drop every temp binding.
    pub fn release_spill_locks_and_discard_temps(&mut self) {
        for reg in 0..self.regs.len() as MipsReg {
            let state = &mut self.regs[reg as usize];
            state.spill_lock = false;
            if state.temp {
                self.discard_r(reg);
            }
        }
        self.file.unlock_all();
        self.in_use.clear_all();
    }

    /// Write `reg` back if dirty, keeping its binding.
    pub fn flush_r<E: Emitter>(&mut self, em: &mut E, reg: MipsReg) -> CompileResult<()> {
        let state = self.regs[reg as usize];
        if !state.dirty || state.temp || self.is_zero(reg) {
            return Ok(());
        }
        let slot = self.kind.slot(reg);
        match state.loc {
            RegLoc::Host(host) => em.store_ctx(host, slot)?,
            RegLoc::Imm(value) => {
                em.mov_imm(self.imm_scratch, value)?;
                em.store_ctx(self.imm_scratch, slot)?;
            }
            RegLoc::Mem => {}
        }
        self.regs[reg as usize].dirty = false;
        Ok(())
    }

    /// Write back every dirty register and unbind everything; temps are discarded.
    pub fn flush_all<E: Emitter>(&mut self, em: &mut E) -> CompileResult<()> {
        for reg in 0..self.regs.len() as MipsReg {
            if self.regs[reg as usize].temp {
                self.discard_r(reg);
                continue;
            }
            self.flush_r(em, reg)?;
            self.discard_r(reg);
        }
        self.file.unlock_all();
        self.in_use.clear_all();
        Ok(())
    }

    /// Drop the binding of `reg` without writing it back.
    pub fn discard_r(&mut self, reg: MipsReg) {
        if let RegLoc::Host(host) = self.loc(reg) {
            self.file.free(host);
            self.in_use.clear(host);
        }
        self.regs[reg as usize] = GuestReg::UNBOUND;
        if self.is_zero(reg) {
            self.regs[reg as usize].loc = RegLoc::Imm(0);
        }
    }

    pub fn is_imm(&self, reg: MipsReg) -> bool {
        self.get_imm(reg).is_some()
    }

    /// Compile-time value of `reg`, if known.
    pub fn get_imm(&self, reg: MipsReg) -> Option<u32> {
        if self.is_zero(reg) {
            return Some(0);
        }
        match self.loc(reg) {
            RegLoc::Imm(value) => Some(value),
            _ => None,
        }
    }

    /// Record that `reg` now holds `value`, dropping any host binding.
    pub fn set_imm(&mut self, reg: MipsReg, value: u32) {
        debug_assert_eq!(self.kind, CacheKind::Gpr, "immediates are tracked for GPRs only");
        if self.is_zero(reg) {
            return;
        }
        self.discard_r(reg);
        let state = &mut self.regs[reg as usize];
        state.loc = RegLoc::Imm(value);
        state.dirty = true;
    }

    fn is_zero(&self, reg: MipsReg) -> bool {
        self.kind == CacheKind::Gpr && reg == REG_ZERO
    }

    fn alloc<E: Emitter>(&mut self, em: &mut E) -> CompileResult<AsmReg> {
        if let Some(host) = self.file.find_free(&self.in_use) {
            return Ok(host);
        }
        let Some(victim) = self.file.find_clocked_evictable(&self.in_use) else {
            return Err(self.exhausted());
        };

        if let Some(owner) = self.file.owner(victim) {
            trace!("{}: evicting {} from {}", self.kind.name(), owner, victim);
            self.flush_r(em, owner)?;
            self.regs[owner as usize] = GuestReg::UNBOUND;
            if self.is_zero(owner) {
                self.regs[owner as usize].loc = RegLoc::Imm(0);
            }
        }
        self.file.free(victim);
        self.file.note_eviction();
        Ok(victim)
    }

    fn exhausted(&self) -> CompileError {
        let (_, locked, _) = self.file.usage();
        CompileError::RegistersExhausted {
            file: self.kind.name(),
            locked,
        }
    }
}

fn dirty_flags(load: bool) -> MapFlags {
    if load {
        MapFlags::DIRTY
    } else {
        MapFlags::DIRTY | MapFlags::NOINIT
    }
}
