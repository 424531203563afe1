// This module provides a small simulator for recorded host code. HostMachine models the
// host register banks (64-bit GP registers, 32-bit scalar float registers), the context
// register pointing at the guest CpuState and the memory-base register pointing at guest
// physical address zero. Context loads and stores go straight to CpuState slots; swap
// loads and stores turn the host address back into a guest address, check that it lies in
// the 30-bit physical window, and access GuestMemory in guest byte order. Interpreter calls
// set the PC, run the instruction through an Interpreter, and then scramble every
// caller-saved host register so that code relying on values surviving a call is caught.

//! Execution of recorded host code against guest state.

use super::inst::HostInst;
use crate::core::emitter::HostLayout;
use crate::core::register_file::{AsmReg, MAX_REGISTERS_PER_BANK};
use crate::mips::memory::ADDRESS_MASK;
use crate::mips::{CpuState, GuestMemory, Interpreter, MipsOpcode};
use thiserror::Error;

/// Host address the memory-base register holds.
pub const HOST_MEMBASE: u64 = 0x0000_7f00_0000_0000;
/// Host address the context register holds.
pub const HOST_CTX: u64 = 0x0000_7e00_0000_0000;

const SCRAMBLE_GP: u64 = 0xdead_beef_dead_beef;
const SCRAMBLE_FP: u32 = 0x7fc0_dead;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MachineError {
    #[error("Host address {addr:#x} is outside guest memory")]
    OutOfWindow { addr: u64 },

    #[error("Reserved register {reg} was clobbered")]
    ReservedClobbered { reg: AsmReg },
}

pub type MachineResult<T> = Result<T, MachineError>;

/// Simulated host CPU.
#[derive(Debug, Clone)]
pub struct HostMachine {
    layout: HostLayout,
    gp: [u64; MAX_REGISTERS_PER_BANK],
    fp: [u32; MAX_REGISTERS_PER_BANK],
    executed: usize,
    interpreter_calls: usize,
}

impl HostMachine {
    pub fn new(layout: HostLayout) -> Self {
        let mut machine = Self {
            layout,
            gp: [0; MAX_REGISTERS_PER_BANK],
            fp: [0; MAX_REGISTERS_PER_BANK],
            executed: 0,
            interpreter_calls: 0,
        };
        machine.scramble();
        machine
    }

    pub fn executed(&self) -> usize {
        self.executed
    }

    pub fn interpreter_calls(&self) -> usize {
        self.interpreter_calls
    }

    pub fn gp(&self, reg: AsmReg) -> u64 {
        self.gp[reg.id as usize]
    }

    pub fn fp(&self, reg: AsmReg) -> u32 {
        self.fp[reg.id as usize]
    }

    /// Run a block from the top.
    pub fn run<I: Interpreter>(
        &mut self,
        code: &[HostInst],
        cpu: &mut CpuState,
        mem: &mut GuestMemory,
        interp: &mut I,
    ) -> MachineResult<()> {
        self.gp[self.layout.ctx.id as usize] = HOST_CTX;
        self.gp[self.layout.membase.id as usize] = HOST_MEMBASE;

        for inst in code {
            self.step(*inst, cpu, mem, interp)?;
            self.executed += 1;
        }
        Ok(())
    }

    fn step<I: Interpreter>(
        &mut self,
        inst: HostInst,
        cpu: &mut CpuState,
        mem: &mut GuestMemory,
        interp: &mut I,
    ) -> MachineResult<()> {
        match inst {
            HostInst::MovImm { dst, imm } => self.set_gp32(dst, imm)?,
            HostInst::Mov { dst, src } => self.set_gp32(dst, self.gp32(src))?,
            HostInst::AddImm { dst, src, imm } => {
                self.set_gp32(dst, self.gp32(src).wrapping_add(imm as u32))?
            }
            HostInst::AndImm { dst, src, imm } => self.set_gp32(dst, self.gp32(src) & imm)?,
            HostInst::OrImm { dst, src, imm } => self.set_gp32(dst, self.gp32(src) | imm)?,
            HostInst::AddPtr { dst, a, b } => {
                let value = self.gp(a).wrapping_add(u64::from(self.gp32(b)));
                self.set_gp(dst, value)?;
            }
            HostInst::LoadCtx { dst, slot } => {
                self.check_ctx()?;
                let value = cpu.read_slot(slot);
                if dst.is_fp() {
                    self.fp[dst.id as usize] = value;
                } else {
                    self.set_gp32(dst, value)?;
                }
            }
            HostInst::StoreCtx { src, slot } => {
                self.check_ctx()?;
                let value = if src.is_fp() { self.fp(src) } else { self.gp32(src) };
                cpu.write_slot(slot, value);
            }
            HostInst::LoadFloatSwap { dst, base, offset } => {
                let addr = self.guest_address(base, offset)?;
                self.fp[dst.id as usize] = mem.read_u32(addr);
            }
            HostInst::SaveFloatSwap { src, base, offset } => {
                let addr = self.guest_address(base, offset)?;
                mem.write_u32(addr, self.fp(src));
            }
            HostInst::FpBin { op, dst, a, b } => {
                let result = op.apply(f32::from_bits(self.fp(a)), f32::from_bits(self.fp(b)));
                self.fp[dst.id as usize] = result.to_bits();
            }
            HostInst::FpUn { op, dst, src } => {
                self.fp[dst.id as usize] = op.apply_bits(self.fp(src));
            }
            HostInst::MovToFp { dst, src } => self.fp[dst.id as usize] = self.gp32(src),
            HostInst::MovFromFp { dst, src } => self.set_gp32(dst, self.fp(src))?,
            HostInst::CallInterpreter { op, pc } => {
                self.check_ctx()?;
                cpu.pc = pc;
                interp.interpret(cpu, mem, MipsOpcode(op));
                self.interpreter_calls += 1;
                self.scramble();
            }
        }
        Ok(())
    }

    fn gp32(&self, reg: AsmReg) -> u32 {
        self.gp(reg) as u32
    }

    /// 32-bit writes zero-extend, as on x86-64.
    fn set_gp32(&mut self, reg: AsmReg, value: u32) -> MachineResult<()> {
        self.set_gp(reg, u64::from(value))
    }

    fn set_gp(&mut self, reg: AsmReg, value: u64) -> MachineResult<()> {
        if reg == self.layout.ctx || reg == self.layout.membase {
            return Err(MachineError::ReservedClobbered { reg });
        }
        self.gp[reg.id as usize] = value;
        Ok(())
    }

    fn check_ctx(&self) -> MachineResult<()> {
        if self.gp(self.layout.ctx) != HOST_CTX {
            return Err(MachineError::ReservedClobbered { reg: self.layout.ctx });
        }
        Ok(())
    }

    fn guest_address(&self, base: AsmReg, offset: AsmReg) -> MachineResult<u32> {
        let host = self.gp(base).wrapping_add(u64::from(self.gp32(offset)));
        match host.checked_sub(HOST_MEMBASE) {
            Some(addr) if addr <= u64::from(ADDRESS_MASK) => Ok(addr as u32),
            _ => Err(MachineError::OutOfWindow { addr: host }),
        }
    }

    /// Trash every register the interpreter call may clobber.
    fn scramble(&mut self) {
        let (ctx, membase) = (self.layout.ctx.id as usize, self.layout.membase.id as usize);
        for (id, value) in self.gp.iter_mut().enumerate() {
            if id != ctx && id != membase {
                *value = SCRAMBLE_GP;
            }
        }
        self.fp.fill(SCRAMBLE_FP);
    }
}
