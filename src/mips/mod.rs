//! Guest-side model: instruction words, VFPU register addressing, CPU state,
//! memory, and the interpreter used by the fallback path.

pub mod cpu;
pub mod interp;
pub mod memory;
pub mod opcode;
pub mod vfpu;

pub use cpu::{CpuState, CtxSlot};
pub use interp::{Interpreter, MipsInterpreter};
pub use memory::{mask_address, GuestMemory, ADDRESS_MASK};
pub use opcode::MipsOpcode;
pub use vfpu::{get_vector_regs, VectorRegs, VectorSize};
