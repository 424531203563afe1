// This module provides arena-based compilation session management using the bumpalo crate.
// A CompilationSession outlives the Jit instances that compile blocks into it. It owns a
// reference to the arena, keeps an arena-allocated copy of every compiled block's guest
// words keyed by start PC, and aggregates SessionStats: blocks and instructions compiled,
// how many instructions of each opcode family went native versus through the interpreter,
// host registers evicted, and the size of the emitted code. Interior mutability through
// RefCell lets a shared &CompilationSession be handed to the compiler; it also makes the
// session !Sync, so one session cannot be shared across compiling threads.

//! Arena-based compilation session management.
//!
//! All block records are tied to the session lifetime, so the guest words of
//! a compiled block stay addressable without copying them again.

use super::options::{OpFamily, NUM_FAMILIES};
use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// One compiled block.
#[derive(Debug, Clone, Copy)]
pub struct BlockRecord<'arena> {
    pub start_pc: u32,
    pub words: &'arena [u32],
    pub native: usize,
    pub fallback: usize,
    pub code_size: usize,
}

/// Native/fallback counts of one opcode family.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FamilyCounts {
    pub native: usize,
    pub fallback: usize,
}

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    stats: RefCell<SessionStats>,
    blocks: RefCell<Vec<BlockRecord<'arena>>>,
    by_pc: RefCell<HashMap<u32, usize>>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            blocks: RefCell::new(Vec::new()),
            by_pc: RefCell::new(HashMap::new()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T: Copy>(&self, slice: &[T]) -> &'arena [T] {
        self.arena.alloc_slice_copy(slice)
    }

    /// Record a compiled block. A block compiled again at the same PC replaces
    /// the lookup entry; both stay in the history.
    pub fn record_block(&self, start_pc: u32, words: &[u32], native: usize, fallback: usize, code_size: usize) {
        let record = BlockRecord {
            start_pc,
            words: self.alloc_slice(words),
            native,
            fallback,
            code_size,
        };

        let mut blocks = self.blocks.borrow_mut();
        self.by_pc.borrow_mut().insert(start_pc, blocks.len());
        blocks.push(record);

        let mut stats = self.stats.borrow_mut();
        stats.blocks_compiled += 1;
        stats.total_code_size += code_size;
        if code_size > stats.largest_block_size {
            stats.largest_block_size = code_size;
            stats.largest_block_pc = start_pc;
        }
    }

    /// Latest block compiled at `pc`.
    pub fn block(&self, pc: u32) -> Option<BlockRecord<'arena>> {
        let index = *self.by_pc.borrow().get(&pc)?;
        self.blocks.borrow().get(index).copied()
    }

    pub fn blocks(&self) -> Vec<BlockRecord<'arena>> {
        self.blocks.borrow().clone()
    }

    /// Record one instruction compiled natively.
    pub fn record_native(&self, family: OpFamily) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_compiled += 1;
        stats.families[family as usize].native += 1;
    }

    /// Record one instruction sent to the interpreter.
    pub fn record_fallback(&self, family: OpFamily) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_compiled += 1;
        stats.families[family as usize].fallback += 1;
    }

    pub fn record_evictions(&self, count: u64) {
        self.stats.borrow_mut().evictions += count;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub blocks_compiled: usize,
    pub instructions_compiled: usize,
    /// Indexed by `OpFamily as usize`.
    pub families: [FamilyCounts; NUM_FAMILIES],
    /// Host registers taken from a live guest binding.
    pub evictions: u64,
    pub total_code_size: usize,
    pub largest_block_size: usize,
    pub largest_block_pc: u32,
}

impl SessionStats {
    pub fn family(&self, family: OpFamily) -> FamilyCounts {
        self.families[family as usize]
    }

    pub fn native_instructions(&self) -> usize {
        self.families.iter().map(|c| c.native).sum()
    }

    pub fn fallback_instructions(&self) -> usize {
        self.families.iter().map(|c| c.fallback).sum()
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Blocks compiled: {}", self.blocks_compiled)?;
        writeln!(f, "  Instructions compiled: {}", self.instructions_compiled)?;
        writeln!(f, "  Native: {}", self.native_instructions())?;
        writeln!(f, "  Fallback: {}", self.fallback_instructions())?;
        writeln!(f, "  Evictions: {}", self.evictions)?;
        writeln!(f, "  Total code size: {} bytes", self.total_code_size)?;

        if self.blocks_compiled > 0 {
            writeln!(
                f,
                "  Largest block: {:08x} ({} bytes)",
                self.largest_block_pc, self.largest_block_size
            )?;
        }

        let used: Vec<_> = OpFamily::ALL
            .iter()
            .map(|&family| (family, self.family(family)))
            .filter(|(_, c)| c.native + c.fallback > 0)
            .collect();
        if !used.is_empty() {
            writeln!(f, "  Family breakdown (native/fallback):")?;
            for (family, counts) in used {
                writeln!(f, "    {}: {}/{}", family, counts.native, counts.fallback)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.blocks_compiled, 0);
        assert_eq!(stats.instructions_compiled, 0);
        assert!(session.blocks().is_empty());
    }

    #[test]
    fn test_block_records_live_in_arena() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let words = vec![0x3c04_0880, 0xd880_0004];
        session.record_block(0x0880_0000, &words, 2, 0, 64);
        drop(words);

        let block = session.block(0x0880_0000).unwrap();
        assert_eq!(block.words, &[0x3c04_0880, 0xd880_0004]);
        assert_eq!(block.native, 2);
        assert!(session.block(0x0880_0004).is_none());
    }

    #[test]
    fn test_recompiled_block_replaces_lookup() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_block(0x100, &[1], 1, 0, 8);
        session.record_block(0x100, &[1, 2], 1, 1, 16);
        assert_eq!(session.block(0x100).unwrap().words.len(), 2);
        assert_eq!(session.blocks().len(), 2);
        assert_eq!(session.stats().largest_block_size, 16);
    }

    #[test]
    fn test_family_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_native(OpFamily::Fpu3op);
        session.record_native(OpFamily::Fpu3op);
        session.record_fallback(OpFamily::Vpfx);
        session.record_evictions(3);

        let stats = session.stats();
        assert_eq!(stats.instructions_compiled, 3);
        assert_eq!(stats.family(OpFamily::Fpu3op), FamilyCounts { native: 2, fallback: 0 });
        assert_eq!(stats.fallback_instructions(), 1);
        assert_eq!(stats.evictions, 3);
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_block(0x0880_0000, &[0], 1, 1, 256);
        session.record_native(OpFamily::Svq);
        session.record_fallback(OpFamily::Vpfx);

        let output = format!("{}", session.stats());
        assert!(output.contains("Blocks compiled: 1"));
        assert!(output.contains("Instructions compiled: 2"));
        assert!(output.contains("08800000 (256 bytes)"));
        assert!(output.contains("svq: 1/0"));
        assert!(output.contains("vpfx: 0/1"));
    }
}
