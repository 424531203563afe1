// This module defines error types for the translator using the thiserror crate for
// idiomatic Rust error handling. CompileError is the main error enum covering the failure
// scenarios that can surface while compiling a guest block: a register file with no
// evictable host register (an invariant violation, since handlers never lock more
// registers than the host provides), failures reported by the host encoder, invalid
// configuration entries, and exhaustion of the code buffer. Each variant carries the
// context needed for debugging. The module also provides CompileResult<T> as a convenience
// alias for Result<T, CompileError>. Unimplemented opcodes and unsafe aliasing are not
// errors: they are handled by deferring to the interpreter.

//! Error types for the translator.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for block compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("No evictable host register in the {file} cache ({locked} spill-locked)")]
    RegistersExhausted {
        file: &'static str,
        locked: u32,
    },

    #[error("Host encoding failed: {reason}")]
    Encoding {
        reason: String,
    },

    #[error("Invalid option: {reason}")]
    InvalidOption {
        reason: String,
    },

    #[error("Code buffer exhausted after {bytes} bytes")]
    CodeBuffer {
        bytes: usize,
    },
}

impl From<iced_x86::IcedError> for CompileError {
    fn from(err: iced_x86::IcedError) -> Self {
        CompileError::Encoding {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
