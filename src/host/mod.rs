//! Portable host backend: a recording emitter and a simulator for what it records.
//!
//! Compiling a block with [`RecordingEmitter`] and running the result on
//! [`HostMachine`] executes exactly the primitive sequence the handlers asked
//! for, which is what the differential tests compare against the interpreter.

pub mod inst;
pub mod machine;
pub mod recorder;

pub use inst::HostInst;
pub use machine::{HostMachine, MachineError, MachineResult, HOST_CTX, HOST_MEMBASE};
pub use recorder::RecordingEmitter;
