// This module provides the interpreter behind the generic fallback path. The JIT emits a call
// into an Interpreter for every instruction it does not translate natively, and the host
// simulator forwards those calls here. MipsInterpreter covers the families the translator
// deals with: the immediate ALU forms used for constant tracking, scalar FPU arithmetic,
// moves, conversions and compares, FPU and VFPU loads/stores, VFPU three-operand and
// two-operand arithmetic, vector init, dot/scale, and the prefix instructions together with
// their source swizzle and destination saturate/write-mask semantics. Opcodes outside that
// set are logged and skipped so that a missing case is visible without aborting the run.

//! Instruction-at-a-time interpreter used by the fallback path.

use super::cpu::{vfpu_ctrl, CpuState, DEFAULT_D_PREFIX, DEFAULT_ST_PREFIX};
use super::memory::GuestMemory;
use super::opcode::{major, MipsOpcode};
use super::vfpu::{get_vector_regs, VectorSize};

/// Executes single guest instructions against guest state.
pub trait Interpreter {
    /// Execute `op` located at `cpu.pc` and advance `cpu.pc` past it.
    fn interpret(&mut self, cpu: &mut CpuState, mem: &mut GuestMemory, op: MipsOpcode);
}

/// Reference interpreter for the translated instruction families.
#[derive(Debug, Default)]
pub struct MipsInterpreter {
    unhandled: u64,
}

/// Value of FCR0 (implementation/revision) reported by `cfc1`.
const FCR0_VALUE: u32 = 0x0000_3351;
const FCR31_CC_BIT: u32 = 1 << 23;

const PREFIX_CONSTANTS: [f32; 8] = [0.0, 1.0, 2.0, 0.5, 3.0, 1.0 / 3.0, 0.25, 1.0 / 6.0];

impl MipsInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions skipped because no case matched.
    pub fn unhandled(&self) -> u64 {
        self.unhandled
    }

    fn unknown(&mut self, cpu: &CpuState, op: MipsOpcode) {
        self.unhandled += 1;
        log::warn!("Interpreter: unhandled opcode {} at PC={:#010x}", op, cpu.pc);
    }

    fn execute(&mut self, cpu: &mut CpuState, mem: &mut GuestMemory, op: MipsOpcode) {
        match op.major() {
            major::LUI => set_gpr(cpu, op.rt(), op.imm16() << 16),
            major::ORI => set_gpr(cpu, op.rt(), cpu.gpr[op.rs()] | op.imm16()),
            major::ADDIU => {
                set_gpr(cpu, op.rt(), cpu.gpr[op.rs()].wrapping_add(op.simm16() as u32))
            }
            major::LWC1 => {
                let addr = cpu.gpr[op.rs()].wrapping_add(op.simm16() as u32);
                cpu.fpr[op.ft()] = mem.read_u32(addr);
            }
            major::SWC1 => {
                let addr = cpu.gpr[op.rs()].wrapping_add(op.simm16() as u32);
                mem.write_u32(addr, cpu.fpr[op.ft()]);
            }
            major::COP1 => self.cop1(cpu, op),
            major::LV_S => {
                let addr = cpu.gpr[op.rs()].wrapping_add(op.vfpu_mem_offset() as u32);
                cpu.vpr[op.vt_single_mem()] = mem.read_u32(addr);
            }
            major::SV_S => {
                let addr = cpu.gpr[op.rs()].wrapping_add(op.vfpu_mem_offset() as u32);
                mem.write_u32(addr, cpu.vpr[op.vt_single_mem()]);
            }
            major::LV_Q => {
                let addr = cpu.gpr[op.rs()].wrapping_add(op.vfpu_mem_offset() as u32);
                let regs = get_vector_regs(VectorSize::Quad, op.vt_quad_mem());
                for (i, &reg) in regs.as_slice().iter().enumerate() {
                    cpu.vpr[reg as usize] = mem.read_u32(addr.wrapping_add(4 * i as u32));
                }
            }
            major::SV_Q => {
                let addr = cpu.gpr[op.rs()].wrapping_add(op.vfpu_mem_offset() as u32);
                let regs = get_vector_regs(VectorSize::Quad, op.vt_quad_mem());
                for (i, &reg) in regs.as_slice().iter().enumerate() {
                    mem.write_u32(addr.wrapping_add(4 * i as u32), cpu.vpr[reg as usize]);
                }
            }
            major::VFPU0 => match (op.raw() >> 23) & 7 {
                0 => vec_do3(cpu, op, |s, t| s + t),
                1 => vec_do3(cpu, op, |s, t| s - t),
                7 => vec_do3(cpu, op, |s, t| s / t),
                _ => self.unknown(cpu, op),
            },
            major::VFPU1 => match (op.raw() >> 23) & 7 {
                0 => vec_do3(cpu, op, |s, t| s * t),
                1 => vdot(cpu, op),
                2 => vscl(cpu, op),
                _ => self.unknown(cpu, op),
            },
            major::VFPU4 if (op.raw() >> 21) & 0x1F == 0 => match (op.raw() >> 16) & 0x1F {
                0 => vv2op(cpu, op, |s| s),
                1 => vv2op(cpu, op, f32::abs),
                2 => vv2op(cpu, op, |s| -s),
                4 => vv2op(cpu, op, |s| {
                    if s > 1.0 {
                        1.0
                    } else if !(s >= 0.0) {
                        0.0
                    } else {
                        s
                    }
                }),
                5 => vv2op(cpu, op, |s| {
                    if s > 1.0 {
                        1.0
                    } else if !(s >= -1.0) {
                        -1.0
                    } else {
                        s
                    }
                }),
                6 => vector_init(cpu, op, 0.0),
                7 => vector_init(cpu, op, 1.0),
                16 => vv2op(cpu, op, |s| 1.0 / s),
                22 => vv2op(cpu, op, f32::sqrt),
                _ => self.unknown(cpu, op),
            },
            major::VFPU5 => match (op.raw() >> 24) & 3 {
                which @ 0..=2 => {
                    cpu.vfpu_ctrl[vfpu_ctrl::SPREFIX + which as usize] = op.raw() & 0xFFFFF;
                }
                _ => {
                    let vt = op.vt();
                    let value = if (op.raw() >> 23) & 1 == 0 {
                        op.simm16() as f32
                    } else {
                        half_to_float(op.imm16() as u16)
                    };
                    cpu.set_v(vt, value);
                    eat_prefixes(cpu);
                }
            },
            _ => self.unknown(cpu, op),
        }
    }

    fn cop1(&mut self, cpu: &mut CpuState, op: MipsOpcode) {
        match op.rs() {
            0 => set_gpr(cpu, op.rt(), cpu.fpr[op.fs()]),
            2 => {
                let value = match op.fs() {
                    31 => cpu.fcr31,
                    0 => FCR0_VALUE,
                    _ => 0,
                };
                set_gpr(cpu, op.rt(), value);
            }
            4 => cpu.fpr[op.fs()] = cpu.gpr[op.rt()],
            6 => {
                if op.fs() == 31 {
                    cpu.fcr31 = cpu.gpr[op.rt()] & 0x0181_FFFF;
                }
            }
            16 => self.fpu_single(cpu, op),
            20 if op.funct() == 32 => {
                // cvt.s.w
                let value = cpu.fpr[op.fs()] as i32 as f32;
                cpu.set_f(op.fd(), value);
            }
            _ => self.unknown(cpu, op),
        }
    }

    fn fpu_single(&mut self, cpu: &mut CpuState, op: MipsOpcode) {
        let fs = cpu.f(op.fs());
        let ft = cpu.f(op.ft());
        let fd = op.fd();
        match op.funct() {
            0 => cpu.set_f(fd, fs + ft),
            1 => cpu.set_f(fd, fs - ft),
            2 => cpu.set_f(fd, fs * ft),
            3 => cpu.set_f(fd, fs / ft),
            4 => cpu.set_f(fd, fs.sqrt()),
            5 => cpu.set_f(fd, fs.abs()),
            6 => cpu.fpr[fd] = cpu.fpr[op.fs()],
            7 => cpu.set_f(fd, -fs),
            12 => cpu.fpr[fd] = float_to_word(fs.round_ties_even()),
            13 => cpu.fpr[fd] = float_to_word(fs.trunc()),
            14 => cpu.fpr[fd] = float_to_word(fs.ceil()),
            15 => cpu.fpr[fd] = float_to_word(fs.floor()),
            36 => cpu.fpr[fd] = float_to_word(fs.round_ties_even()),
            48..=63 => {
                let cond = op.funct() & 0xF;
                let unordered = fs.is_nan() || ft.is_nan();
                let result = (unordered && cond & 1 != 0)
                    || (fs == ft && cond & 2 != 0)
                    || (fs < ft && cond & 4 != 0);
                if result {
                    cpu.fcr31 |= FCR31_CC_BIT;
                } else {
                    cpu.fcr31 &= !FCR31_CC_BIT;
                }
            }
            _ => self.unknown(cpu, op),
        }
    }
}

impl Interpreter for MipsInterpreter {
    fn interpret(&mut self, cpu: &mut CpuState, mem: &mut GuestMemory, op: MipsOpcode) {
        self.execute(cpu, mem, op);
        cpu.pc = cpu.pc.wrapping_add(4);
    }
}

fn set_gpr(cpu: &mut CpuState, reg: usize, value: u32) {
    if reg != 0 {
        cpu.gpr[reg] = value;
    }
}

/// Float to word conversion with the FPU's saturating behaviour.
fn float_to_word(value: f32) -> u32 {
    if value.is_nan() || value >= 2_147_483_648.0 {
        i32::MAX as u32
    } else if value < -2_147_483_648.0 {
        i32::MIN as u32
    } else {
        value as i32 as u32
    }
}

fn half_to_float(half: u16) -> f32 {
    let sign = ((half >> 15) & 1) as u32;
    let exp = ((half >> 10) & 0x1F) as u32;
    let frac = (half & 0x3FF) as u32;
    let bits = if exp == 0x1F {
        (sign << 31) | 0x7F80_0000 | (frac << 13)
    } else if exp == 0 {
        if frac == 0 {
            sign << 31
        } else {
            let magnitude = frac as f32 * (1.0 / 16_777_216.0);
            return if sign != 0 { -magnitude } else { magnitude };
        }
    } else {
        (sign << 31) | ((exp + 112) << 23) | (frac << 13)
    };
    f32::from_bits(bits)
}

fn read_vector(cpu: &CpuState, size: VectorSize, vreg: usize) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (lane, &reg) in get_vector_regs(size, vreg).as_slice().iter().enumerate() {
        out[lane] = cpu.v(reg as usize);
    }
    out
}

/// Write lanes, skipping those masked by the destination prefix.
fn write_vector(cpu: &mut CpuState, size: VectorSize, vreg: usize, values: &[f32; 4]) {
    let mask = (cpu.vfpu_ctrl[vfpu_ctrl::DPREFIX] >> 8) & 0xF;
    for (lane, &reg) in get_vector_regs(size, vreg).as_slice().iter().enumerate() {
        if mask & (1 << lane) == 0 {
            cpu.set_v(reg as usize, values[lane]);
        }
    }
}

fn apply_prefix_st(values: &mut [f32; 4], prefix: u32, size: VectorSize) {
    if prefix == DEFAULT_ST_PREFIX {
        return;
    }
    let orig = *values;
    for (i, value) in values.iter_mut().enumerate().take(size.lanes()) {
        let regnum = ((prefix >> (i * 2)) & 3) as usize;
        let abs = (prefix >> (8 + i)) & 1;
        let constant = (prefix >> (12 + i)) & 1;
        let negate = (prefix >> (16 + i)) & 1;
        *value = if constant == 0 {
            if abs != 0 {
                orig[regnum].abs()
            } else {
                orig[regnum]
            }
        } else {
            PREFIX_CONSTANTS[regnum + ((abs as usize) << 2)]
        };
        if negate != 0 {
            *value = -*value;
        }
    }
}

fn apply_prefix_d(cpu: &CpuState, values: &mut [f32; 4], size: VectorSize) {
    let prefix = cpu.vfpu_ctrl[vfpu_ctrl::DPREFIX];
    if prefix == DEFAULT_D_PREFIX {
        return;
    }
    for (i, value) in values.iter_mut().enumerate().take(size.lanes()) {
        match (prefix >> (i * 2)) & 3 {
            1 => {
                if *value > 1.0 {
                    *value = 1.0;
                }
                if !(*value >= 0.0) {
                    *value = 0.0;
                }
            }
            3 => {
                if *value > 1.0 {
                    *value = 1.0;
                }
                if !(*value >= -1.0) {
                    *value = -1.0;
                }
            }
            _ => {}
        }
    }
}

fn eat_prefixes(cpu: &mut CpuState) {
    cpu.vfpu_ctrl[vfpu_ctrl::SPREFIX] = DEFAULT_ST_PREFIX;
    cpu.vfpu_ctrl[vfpu_ctrl::TPREFIX] = DEFAULT_ST_PREFIX;
    cpu.vfpu_ctrl[vfpu_ctrl::DPREFIX] = DEFAULT_D_PREFIX;
}

fn read_s(cpu: &CpuState, size: VectorSize, vreg: usize) -> [f32; 4] {
    let mut s = read_vector(cpu, size, vreg);
    apply_prefix_st(&mut s, cpu.vfpu_ctrl[vfpu_ctrl::SPREFIX], size);
    s
}

fn read_t(cpu: &CpuState, size: VectorSize, vreg: usize) -> [f32; 4] {
    let mut t = read_vector(cpu, size, vreg);
    apply_prefix_st(&mut t, cpu.vfpu_ctrl[vfpu_ctrl::TPREFIX], size);
    t
}

fn finish_vector(cpu: &mut CpuState, size: VectorSize, vd: usize, mut d: [f32; 4]) {
    apply_prefix_d(cpu, &mut d, size);
    write_vector(cpu, size, vd, &d);
    eat_prefixes(cpu);
}

fn vec_do3(cpu: &mut CpuState, op: MipsOpcode, f: impl Fn(f32, f32) -> f32) {
    let size = VectorSize::of_op(op);
    let s = read_s(cpu, size, op.vs());
    let t = read_t(cpu, size, op.vt());
    let mut d = [0.0; 4];
    for i in 0..size.lanes() {
        d[i] = f(s[i], t[i]);
    }
    finish_vector(cpu, size, op.vd(), d);
}

fn vv2op(cpu: &mut CpuState, op: MipsOpcode, f: impl Fn(f32) -> f32) {
    let size = VectorSize::of_op(op);
    let s = read_s(cpu, size, op.vs());
    let mut d = [0.0; 4];
    for i in 0..size.lanes() {
        d[i] = f(s[i]);
    }
    finish_vector(cpu, size, op.vd(), d);
}

fn vector_init(cpu: &mut CpuState, op: MipsOpcode, value: f32) {
    let size = VectorSize::of_op(op);
    finish_vector(cpu, size, op.vd(), [value; 4]);
}

fn vdot(cpu: &mut CpuState, op: MipsOpcode) {
    let size = VectorSize::of_op(op);
    let s = read_s(cpu, size, op.vs());
    let t = read_t(cpu, size, op.vt());
    let mut sum = 0.0f32;
    for i in 0..size.lanes() {
        sum += s[i] * t[i];
    }
    finish_vector(cpu, VectorSize::Single, op.vd(), [sum, 0.0, 0.0, 0.0]);
}

fn vscl(cpu: &mut CpuState, op: MipsOpcode) {
    let size = VectorSize::of_op(op);
    let s = read_s(cpu, size, op.vs());
    let t = read_t(cpu, VectorSize::Single, op.vt());
    let mut d = [0.0; 4];
    for i in 0..size.lanes() {
        d[i] = s[i] * t[0];
    }
    finish_vector(cpu, size, op.vd(), d);
}
