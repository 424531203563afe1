//! Per-family compilation switches.
//!
//! Every opcode family can be forced onto the interpreter path, which is the
//! bring-up and bisection workflow: when a block misbehaves, send families to
//! the fallback one at a time until the culprit is found. The list can come
//! from code, from a comma-separated string, or from the
//! `ALLEGREX_JIT_FALLBACK` environment variable.

use super::error::{CompileError, CompileResult};
use std::fmt;
use std::str::FromStr;

/// Environment variable holding a comma-separated list of families to send to
/// the interpreter.
pub const FALLBACK_ENV: &str = "ALLEGREX_JIT_FALLBACK";

pub const NUM_FAMILIES: usize = 14;

/// Opcode families, each handled by one compilation handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpFamily {
    /// Three-operand scalar float arithmetic.
    Fpu3op,
    /// Two-operand scalar float operations.
    Fpu2op,
    /// lwc1/swc1.
    FpuLs,
    /// c.cond.s.
    FpuComp,
    /// Moves between GPRs and FPRs or FPU control registers.
    Mxc1,
    /// Single VFPU load/store.
    Sv,
    /// Quad VFPU load/store.
    Svq,
    /// Three-operand vector arithmetic.
    VecDo3,
    /// Two-operand vector operations.
    Vv2op,
    /// vzero/vone.
    VVectorInit,
    /// Integer immediate arithmetic.
    IType,
    /// Prefix setup.
    Vpfx,
    /// Any other VFPU instruction.
    VfpuOther,
    /// Everything else.
    Other,
}

impl OpFamily {
    pub const ALL: [OpFamily; NUM_FAMILIES] = [
        OpFamily::Fpu3op,
        OpFamily::Fpu2op,
        OpFamily::FpuLs,
        OpFamily::FpuComp,
        OpFamily::Mxc1,
        OpFamily::Sv,
        OpFamily::Svq,
        OpFamily::VecDo3,
        OpFamily::Vv2op,
        OpFamily::VVectorInit,
        OpFamily::IType,
        OpFamily::Vpfx,
        OpFamily::VfpuOther,
        OpFamily::Other,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OpFamily::Fpu3op => "fpu3op",
            OpFamily::Fpu2op => "fpu2op",
            OpFamily::FpuLs => "fpuls",
            OpFamily::FpuComp => "fpucomp",
            OpFamily::Mxc1 => "mxc1",
            OpFamily::Sv => "sv",
            OpFamily::Svq => "svq",
            OpFamily::VecDo3 => "vecdo3",
            OpFamily::Vv2op => "vv2op",
            OpFamily::VVectorInit => "vvectorinit",
            OpFamily::IType => "itype",
            OpFamily::Vpfx => "vpfx",
            OpFamily::VfpuOther => "vfpu",
            OpFamily::Other => "other",
        }
    }

    /// Parse a family name, ignoring ASCII case.
    pub fn from_name(name: &str) -> CompileResult<OpFamily> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|family| family.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| CompileError::InvalidOption {
                reason: format!("unknown opcode family '{name}'"),
            })
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for OpFamily {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpFamily::from_name(s)
    }
}

impl fmt::Display for OpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// How the block compiler treats each family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitOptions {
    fallback: [bool; NUM_FAMILIES],
    /// Assume VFPU prefixes are the identity at block entry.
    pub assume_default_prefixes: bool,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            fallback: [false; NUM_FAMILIES],
            assume_default_prefixes: true,
        }
    }
}

impl JitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every family goes through the interpreter.
    pub fn fallback_all() -> Self {
        Self {
            fallback: [true; NUM_FAMILIES],
            ..Self::default()
        }
    }

    pub fn with_fallback(mut self, family: OpFamily) -> Self {
        self.set_fallback(family, true);
        self
    }

    pub fn set_fallback(&mut self, family: OpFamily, fallback: bool) {
        self.fallback[family.index()] = fallback;
    }

    pub fn is_native(&self, family: OpFamily) -> bool {
        !self.fallback[family.index()]
    }

    /// Apply a comma-separated family list; `all` selects every family.
    pub fn parse_fallback_list(mut self, list: &str) -> CompileResult<Self> {
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if name.eq_ignore_ascii_case("all") {
                self.fallback = [true; NUM_FAMILIES];
            } else {
                self.set_fallback(OpFamily::from_name(name)?, true);
            }
        }
        Ok(self)
    }

    /// Defaults overridden by [`FALLBACK_ENV`] when it is set.
    pub fn from_env() -> CompileResult<Self> {
        match std::env::var(FALLBACK_ENV) {
            Ok(list) => {
                log::debug!("{FALLBACK_ENV}={list}");
                Self::default().parse_fallback_list(&list)
            }
            Err(_) => Ok(Self::default()),
        }
    }

    /// Families currently sent to the interpreter.
    pub fn fallback_families(&self) -> impl Iterator<Item = OpFamily> + '_ {
        OpFamily::ALL.into_iter().filter(|family| !self.is_native(*family))
    }
}
