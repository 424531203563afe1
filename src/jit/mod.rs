// This module contains the block compiler. A Jit owns one emitter, the two guest register
// caches (GPR, FPR/VFPU) and the per-block state, so independent Jit instances can compile
// concurrently. compile_block walks a straight-line run of guest words; for each word it
// classifies the opcode into a family, checks the family switch in JitOptions, and calls the
// family handler from the dispatch table (or the generic fallback). After every handler the
// dispatcher releases spill locks and discards temps on both caches, so no handler can leak
// locked state into the next instruction. The block ends by flushing both caches and storing
// the exit PC. Handlers live in fpu.rs, vfpu.rs and itype.rs; overlap.rs has the aliasing
// predicates the vector handlers use.

//! Block compiler and per-opcode handlers.

pub mod dispatch;
mod fpu;
mod itype;
pub mod overlap;
mod vfpu;

pub use dispatch::{classify, consumes_prefixes};
pub use overlap::{is_overlap_safe, is_overlap_safe_allow_s};

use crate::core::{
    CacheKind, CompilationSession, CompileResult, Emitter, HostLayout, JitOptions, MapFlags, MipsReg,
    OpFamily, RegCache,
};
use crate::mips::{mask_address, CtxSlot, MipsOpcode, ADDRESS_MASK};
use log::{debug, trace};

/// How one instruction was compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpOutcome {
    pub pc: u32,
    pub family: OpFamily,
    pub native: bool,
}

/// Result of compiling one block.
#[derive(Debug, Clone)]
pub struct CompiledBlock<T> {
    pub start_pc: u32,
    pub code: T,
    pub outcomes: Vec<OpOutcome>,
    /// Host registers taken from live guest bindings while compiling.
    pub evictions: u64,
    /// VFPU prefixes are known to be the identity when the block exits.
    pub exit_prefixes_default: bool,
}

impl<T> CompiledBlock<T> {
    pub fn native_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.native).count()
    }

    pub fn fallback_count(&self) -> usize {
        self.outcomes.len() - self.native_count()
    }

    /// Add this block to a session's history and statistics.
    pub fn record(&self, session: &CompilationSession<'_>, words: &[u32], code_size: usize) {
        for outcome in &self.outcomes {
            if outcome.native {
                session.record_native(outcome.family);
            } else {
                session.record_fallback(outcome.family);
            }
        }
        session.record_evictions(self.evictions);
        session.record_block(
            self.start_pc,
            words,
            self.native_count(),
            self.fallback_count(),
            code_size,
        );
    }
}

#[derive(Debug, Default)]
struct BlockState {
    compiler_pc: u32,
    /// No prefix instruction is pending since the last consumer.
    prefixes_default: bool,
    /// Set by the fallback path while compiling the current instruction.
    deferred: bool,
    outcomes: Vec<OpOutcome>,
}

/// Per-block translation context.
pub struct Jit<E: Emitter> {
    pub(crate) em: E,
    pub(crate) gpr: RegCache,
    pub(crate) fpr: RegCache,
    pub(crate) layout: HostLayout,
    options: JitOptions,
    js: BlockState,
}

impl<E: Emitter> Jit<E> {
    pub fn new(em: E, layout: HostLayout, options: JitOptions) -> Self {
        Self {
            gpr: RegCache::new(CacheKind::Gpr, &layout),
            fpr: RegCache::new(CacheKind::Fpr, &layout),
            em,
            layout,
            options,
            js: BlockState::default(),
        }
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    pub fn emitter(&self) -> &E {
        &self.em
    }

    pub fn into_emitter(self) -> E {
        self.em
    }

    /// Compile a straight-line block starting at `start_pc`.
    pub fn compile_block(&mut self, start_pc: u32, words: &[u32]) -> CompileResult<CompiledBlock<E::Output>> {
        self.gpr.reset();
        self.fpr.reset();
        self.js = BlockState {
            compiler_pc: start_pc,
            prefixes_default: self.options.assume_default_prefixes,
            deferred: false,
            outcomes: Vec::with_capacity(words.len()),
        };
        let evictions_before = self.gpr.evictions() + self.fpr.evictions();

        if let Err(err) = self.compile_body(start_pc, words) {
            debug!("Block {:08x} aborted: {}", start_pc, err);
            self.em.discard();
            self.gpr.reset();
            self.fpr.reset();
            return Err(err);
        }

        let code = self.em.finish()?;
        let block = CompiledBlock {
            start_pc,
            code,
            outcomes: std::mem::take(&mut self.js.outcomes),
            evictions: self.gpr.evictions() + self.fpr.evictions() - evictions_before,
            exit_prefixes_default: self.js.prefixes_default,
        };
        debug!(
            "Compiled block {:08x}: {} instructions, {} native, {} fallback",
            start_pc,
            words.len(),
            block.native_count(),
            block.fallback_count()
        );
        Ok(block)
    }

    fn compile_body(&mut self, start_pc: u32, words: &[u32]) -> CompileResult<()> {
        for (i, &word) in words.iter().enumerate() {
            self.js.compiler_pc = start_pc.wrapping_add(4 * i as u32);
            self.compile_op(MipsOpcode(word))?;
        }

        self.gpr.flush_all(&mut self.em)?;
        self.fpr.flush_all(&mut self.em)?;
        let exit_pc = start_pc.wrapping_add(4 * words.len() as u32);
        self.em.mov_imm(self.layout.addr_scratch, exit_pc)?;
        self.em.store_ctx(self.layout.addr_scratch, CtxSlot::Pc)
    }

    /// Compile one instruction at the current PC.
    fn compile_op(&mut self, op: MipsOpcode) -> CompileResult<()> {
        let family = classify(op);
        self.js.deferred = false;

        let result = if self.options.is_native(family) {
            (dispatch::handler::<E>(family))(self, op)
        } else {
            self.comp_generic(op)
        };
        self.gpr.release_spill_locks_and_discard_temps();
        self.fpr.release_spill_locks_and_discard_temps();
        result?;

        let native = !self.js.deferred;
        if family == OpFamily::Vpfx {
            self.js.prefixes_default = false;
        } else if consumes_prefixes(family) {
            self.js.prefixes_default = true;
        }
        if native {
            trace!("{:08x}: {} native ({})", self.js.compiler_pc, op, family);
        }
        self.js.outcomes.push(OpOutcome {
            pc: self.js.compiler_pc,
            family,
            native,
        });
        Ok(())
    }

    /// Run `op` through the interpreter.
    ///
    /// Everything cached is written back first and nothing stays bound, since
    /// the interpreter reads and writes guest state directly.
    pub(crate) fn comp_generic(&mut self, op: MipsOpcode) -> CompileResult<()> {
        self.gpr.release_spill_locks_and_discard_temps();
        self.fpr.release_spill_locks_and_discard_temps();
        self.gpr.flush_all(&mut self.em)?;
        self.fpr.flush_all(&mut self.em)?;
        self.em.call_interpreter(op.raw(), self.js.compiler_pc)?;
        self.js.deferred = true;
        debug!("{:08x}: {} -> interpreter", self.js.compiler_pc, op);
        Ok(())
    }

    /// Vector arithmetic may only be emitted while the prefixes are known to
    /// be the identity.
    pub(crate) fn prefixes_are_default(&self) -> bool {
        self.js.prefixes_default
    }

    /// Load the guest physical address `gpr[rs] + offset` into the address scratch.
    pub(crate) fn set_address(&mut self, rs: usize, offset: i32) -> CompileResult<()> {
        let sreg = self.layout.addr_scratch;
        match self.gpr.get_imm(rs as MipsReg) {
            Some(base) => {
                let addr = mask_address(base.wrapping_add(offset as u32));
                self.em.mov_imm(sreg, addr)
            }
            None => {
                let base = self.gpr.map_reg(&mut self.em, rs as MipsReg, MapFlags::NONE)?;
                self.em.add_imm(sreg, base, offset)?;
                self.em.and_imm(sreg, sreg, ADDRESS_MASK)
            }
        }
    }

    /// Load the host address of `gpr[rs] + offset` into the address scratch.
    pub(crate) fn set_host_address(&mut self, rs: usize, offset: i32) -> CompileResult<()> {
        self.set_address(rs, offset)?;
        let sreg = self.layout.addr_scratch;
        self.em.add_ptr(sreg, self.layout.membase, sreg)
    }
}
