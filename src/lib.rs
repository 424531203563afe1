//! Allegrex JIT - instruction translation for the PSP CPU and its VFPU.
//!
//! This crate turns straight-line runs of Allegrex (MIPS32-derived) guest
//! instructions into host code. Each guest instruction is classified into an
//! opcode family and either translated natively by that family's handler or
//! routed through the interpreter. Guest registers live in two register
//! caches (general purpose, and scalar FPU plus VFPU) that bind them to host
//! registers lazily and write them back at block exits and fallbacks.
//!
//! # Primary Usage
//!
//! ```ignore
//! use allegrex_jit::core::{CompilationSession, HostLayout, JitOptions};
//! use allegrex_jit::jit::Jit;
//! use allegrex_jit::x64::X64Encoder;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//!
//! let encoder = X64Encoder::new(interpreter_entry as u64)?;
//! let mut jit = Jit::new(encoder, HostLayout::x64(), JitOptions::from_env()?);
//! let block = jit.compile_block(0x0880_0000, &words)?;
//! block.record(&session, &words, block.code.len());
//! ```
//!
//! # Architecture
//!
//! - [`core`] - register caches, emitter interface, options, session
//! - [`jit`] - block compiler, dispatch table and per-family handlers
//! - [`mips`] - guest decoding, CPU state, memory and the interpreter
//! - [`host`] - recording emitter and host simulator
//! - [`x64`] - x86-64 encoding with iced-x86

pub mod core;
pub mod host;
pub mod jit;
pub mod mips;
pub mod x64;

pub use crate::core::{
    CompilationSession, CompileError, CompileResult, Emitter, HostLayout, JitOptions, OpFamily,
};
pub use crate::jit::{CompiledBlock, Jit, OpOutcome};
pub use crate::mips::{CpuState, GuestMemory, MipsInterpreter, MipsOpcode};
