// This module is the central hub for the translator's core infrastructure, shared by the
// opcode handlers and by every host backend. It organises the subsystems the handlers rely
// on: the host register file (clock-based eviction with bitset tracking), the guest register
// caches built on top of it (binding, dirty, spill-lock, temp and immediate state per guest
// register), the Emitter trait that backends implement together with the reserved host
// register layout, the per-family configuration table, the arena-backed compilation session
// with its statistics, and the thiserror-based error type.

//! Core translator infrastructure.
//!
//! # Key Components
//!
//! ## Register Allocation (`register_file`, `reg_cache`)
//! - Clock-based host register eviction with bitset tracking
//! - Guest-facing caches for GPRs and for FPU/VFPU registers
//!
//! ## Emission (`emitter`)
//! - Primitive host operations every backend provides
//! - Reserved and allocatable host registers
//!
//! ## Session Management (`session`)
//! - Arena-based block records using `bumpalo`
//! - Native/fallback statistics per opcode family

pub mod emitter;
pub mod error;
pub mod options;
pub mod reg_cache;
pub mod register_file;
pub mod session;

pub use emitter::{Emitter, FpBinOp, FpUnOp, HostLayout};
pub use error::{CompileError, CompileResult};
pub use options::{JitOptions, OpFamily};
pub use reg_cache::{CacheKind, MapFlags, MipsReg, RegCache, RegLoc};
pub use register_file::{AsmReg, RegBitSet, RegisterFile};
pub use session::{BlockRecord, CompilationSession, FamilyCounts, SessionStats};
