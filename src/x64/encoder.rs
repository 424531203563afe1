// This module provides the x86-64 implementation of the Emitter trait using the iced-x86
// library. X64Encoder converts AsmReg register references into real machine code through
// iced's CodeAssembler. GP primitives operate on 32-bit registers (which zero-extend on
// x86-64) except the pointer add, which uses a 64-bit LEA. Guest context slots are addressed
// as [r15 + offset] with offsets taken from CpuState's layout. Float transfers use MOVSS for
// memory and MOVD between banks; when the guest byte order differs from the host the value
// passes through ECX and a BSWAP instead. Scalar SSE arithmetic is two-operand, so three-operand
// primitives copy the first source into the destination first; if the destination is also the
// second source, the second source is saved in XMM15 so the operand order stays `a op b`.
// abs/neg flip bits through ECX.
//
// A block is a System V function with no arguments. The caller enters it with CALL, holding the
// CpuState address in R15 and the guest memory base in RBX; both are callee-saved and the block
// never writes them. The block saves the callee-saved allocatable registers (R12-R14) in its
// prologue, which also leaves RSP 16-byte aligned for the rest of the block, and restores them
// before RET. Interpreter calls pass the context pointer, the instruction word and its PC in
// RDI/ESI/EDX and call the entry point through RAX. The block compiler flushes every binding
// before such a call, so clobbered caller-saved registers hold nothing live. finish assembles
// the prologue and the body separately and joins them.

//! x86-64 instruction encoding using iced-x86.

use crate::core::emitter::{Emitter, FpBinOp, FpUnOp};
use crate::core::error::{CompileError, CompileResult};
use crate::core::register_file::AsmReg;
use crate::mips::CtxSlot;
use iced_x86::code_asm::*;

/// Base address blocks are assembled at when no other is given.
pub const DEFAULT_CODE_BASE: u64 = 0x1000;

/// Signature of the interpreter entry point called by generated code.
pub type InterpreterEntry = extern "C" fn(ctx: *mut u8, op: u32, pc: u32);

const GP32_REGS: [AsmRegister32; 16] = [
    eax, ecx, edx, ebx, esp, ebp, esi, edi, r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
];

const GP64_REGS: [AsmRegister64; 16] = [
    rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15,
];

const XMM_REGS: [AsmRegisterXmm; 16] = [
    xmm0, xmm1, xmm2, xmm3, xmm4, xmm5, xmm6, xmm7, xmm8, xmm9, xmm10, xmm11, xmm12, xmm13, xmm14,
    xmm15,
];

/// Context register.
const CTX: AsmRegister64 = r15;
/// GP scratch owned by the encoder.
const SCRATCH32: AsmRegister32 = ecx;
/// FP scratch owned by the encoder.
const XMM_SCRATCH: AsmRegisterXmm = xmm15;

/// Callee-saved registers the allocator may hand out, in push order.
const CALLEE_SAVED: [AsmRegister64; 3] = [r12, r13, r14];

/// Extra stack adjustment keeping RSP 16-byte aligned after the pushes and
/// the caller's return address.
const FRAME_PAD: i32 = if (CALLEE_SAVED.len() + 1) % 2 == 0 { 0 } else { 8 };

/// x86-64 emitter.
pub struct X64Encoder {
    assembler: CodeAssembler,
    /// Address the block is assembled for.
    code_base: u64,
    /// Absolute address of the interpreter entry point.
    interpreter_entry: u64,
    /// Guest byte order differs from the host's.
    swap_bytes: bool,
    /// Largest block accepted, in bytes.
    code_limit: Option<usize>,
}

impl X64Encoder {
    pub fn new(interpreter_entry: u64) -> CompileResult<Self> {
        Ok(Self {
            assembler: CodeAssembler::new(64)?,
            code_base: DEFAULT_CODE_BASE,
            interpreter_entry,
            swap_bytes: false,
            code_limit: None,
        })
    }

    pub fn with_code_base(mut self, code_base: u64) -> Self {
        self.code_base = code_base;
        self
    }

    /// Byte-swap every float transfer.
    pub fn with_byte_swap(mut self, swap_bytes: bool) -> Self {
        self.swap_bytes = swap_bytes;
        self
    }

    pub fn with_code_limit(mut self, bytes: usize) -> Self {
        self.code_limit = Some(bytes);
        self
    }

    pub fn code_base(&self) -> u64 {
        self.code_base
    }

    fn gp32(&self, reg: AsmReg) -> CompileResult<AsmRegister32> {
        if !reg.is_gp() {
            return Err(invalid_register(reg, "GP"));
        }
        GP32_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or_else(|| invalid_register(reg, "GP"))
    }

    fn gp64(&self, reg: AsmReg) -> CompileResult<AsmRegister64> {
        if !reg.is_gp() {
            return Err(invalid_register(reg, "GP"));
        }
        GP64_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or_else(|| invalid_register(reg, "GP"))
    }

    fn xmm(&self, reg: AsmReg) -> CompileResult<AsmRegisterXmm> {
        if !reg.is_fp() {
            return Err(invalid_register(reg, "XMM"));
        }
        XMM_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or_else(|| invalid_register(reg, "XMM"))
    }

    /// `dst = src` for 32-bit GP registers, skipping self-moves.
    fn copy32(&mut self, dst: AsmRegister32, src: AsmRegister32) -> CompileResult<()> {
        if dst != src {
            self.assembler.mov(dst, src)?;
        }
        Ok(())
    }

    fn copy_xmm(&mut self, dst: AsmRegisterXmm, src: AsmRegisterXmm) -> CompileResult<()> {
        if dst != src {
            self.assembler.movaps(dst, src)?;
        }
        Ok(())
    }

    /// Save the callee-saved allocatables and align the stack.
    fn prologue(&self) -> CompileResult<Vec<u8>> {
        let mut frame = CodeAssembler::new(64)?;
        for reg in CALLEE_SAVED {
            frame.push(reg)?;
        }
        if FRAME_PAD != 0 {
            frame.sub(rsp, FRAME_PAD)?;
        }
        Ok(frame.assemble(self.code_base)?)
    }

    /// Close the body with the epilogue and assemble it behind the prologue.
    fn assemble_block(&mut self) -> CompileResult<Vec<u8>> {
        if FRAME_PAD != 0 {
            self.assembler.add(rsp, FRAME_PAD)?;
        }
        for reg in CALLEE_SAVED.into_iter().rev() {
            self.assembler.pop(reg)?;
        }
        self.assembler.ret()?;

        let prologue = self.prologue()?;
        let body = self.assembler.assemble(self.code_base + prologue.len() as u64)?;
        Ok([prologue, body].concat())
    }

    fn sse_op(&mut self, op: FpBinOp, dst: AsmRegisterXmm, src: AsmRegisterXmm) -> CompileResult<()> {
        match op {
            FpBinOp::Add => self.assembler.addss(dst, src)?,
            FpBinOp::Sub => self.assembler.subss(dst, src)?,
            FpBinOp::Mul => self.assembler.mulss(dst, src)?,
            FpBinOp::Div => self.assembler.divss(dst, src)?,
        }
        Ok(())
    }
}

fn invalid_register(reg: AsmReg, want: &str) -> CompileError {
    CompileError::Encoding {
        reason: format!("{reg} is not an encodable {want} register"),
    }
}

impl Emitter for X64Encoder {
    type Output = Vec<u8>;

    fn mov_imm(&mut self, dst: AsmReg, imm: u32) -> CompileResult<()> {
        let dst = self.gp32(dst)?;
        self.assembler.mov(dst, imm as i32)?;
        Ok(())
    }

    fn mov(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        let (dst, src) = (self.gp32(dst)?, self.gp32(src)?);
        self.copy32(dst, src)
    }

    fn add_imm(&mut self, dst: AsmReg, src: AsmReg, imm: i32) -> CompileResult<()> {
        let (dst, src) = (self.gp32(dst)?, self.gp32(src)?);
        self.copy32(dst, src)?;
        if imm != 0 {
            self.assembler.add(dst, imm)?;
        }
        Ok(())
    }

    fn and_imm(&mut self, dst: AsmReg, src: AsmReg, imm: u32) -> CompileResult<()> {
        let (dst, src) = (self.gp32(dst)?, self.gp32(src)?);
        self.copy32(dst, src)?;
        self.assembler.and(dst, imm as i32)?;
        Ok(())
    }

    fn or_imm(&mut self, dst: AsmReg, src: AsmReg, imm: u32) -> CompileResult<()> {
        let (dst, src) = (self.gp32(dst)?, self.gp32(src)?);
        self.copy32(dst, src)?;
        if imm != 0 {
            self.assembler.or(dst, imm as i32)?;
        }
        Ok(())
    }

    fn add_ptr(&mut self, dst: AsmReg, a: AsmReg, b: AsmReg) -> CompileResult<()> {
        let (dst, a, b) = (self.gp64(dst)?, self.gp64(a)?, self.gp64(b)?);
        self.assembler.lea(dst, qword_ptr(a + b))?;
        Ok(())
    }

    fn load_ctx(&mut self, dst: AsmReg, slot: CtxSlot) -> CompileResult<()> {
        let mem = dword_ptr(CTX + slot.offset());
        if dst.is_fp() {
            let dst = self.xmm(dst)?;
            self.assembler.movss(dst, mem)?;
        } else {
            let dst = self.gp32(dst)?;
            self.assembler.mov(dst, mem)?;
        }
        Ok(())
    }

    fn store_ctx(&mut self, src: AsmReg, slot: CtxSlot) -> CompileResult<()> {
        let mem = dword_ptr(CTX + slot.offset());
        if src.is_fp() {
            let src = self.xmm(src)?;
            self.assembler.movss(mem, src)?;
        } else {
            let src = self.gp32(src)?;
            self.assembler.mov(mem, src)?;
        }
        Ok(())
    }

    fn load_float_swap(&mut self, dst: AsmReg, base: AsmReg, offset: AsmReg) -> CompileResult<()> {
        let (dst, base, offset) = (self.xmm(dst)?, self.gp64(base)?, self.gp64(offset)?);
        let mem = dword_ptr(base + offset);
        if self.swap_bytes {
            self.assembler.mov(SCRATCH32, mem)?;
            self.assembler.bswap(SCRATCH32)?;
            self.assembler.movd(dst, SCRATCH32)?;
        } else {
            self.assembler.movss(dst, mem)?;
        }
        Ok(())
    }

    fn save_float_swap(&mut self, src: AsmReg, base: AsmReg, offset: AsmReg) -> CompileResult<()> {
        let (src, base, offset) = (self.xmm(src)?, self.gp64(base)?, self.gp64(offset)?);
        let mem = dword_ptr(base + offset);
        if self.swap_bytes {
            self.assembler.movd(SCRATCH32, src)?;
            self.assembler.bswap(SCRATCH32)?;
            self.assembler.mov(mem, SCRATCH32)?;
        } else {
            self.assembler.movss(mem, src)?;
        }
        Ok(())
    }

    fn fp_binop(&mut self, op: FpBinOp, dst: AsmReg, a: AsmReg, b: AsmReg) -> CompileResult<()> {
        let (dst, a, b) = (self.xmm(dst)?, self.xmm(a)?, self.xmm(b)?);
        if dst == a {
            self.sse_op(op, dst, b)
        } else if dst != b {
            self.copy_xmm(dst, a)?;
            self.sse_op(op, dst, b)
        } else {
            self.copy_xmm(XMM_SCRATCH, b)?;
            self.copy_xmm(dst, a)?;
            self.sse_op(op, dst, XMM_SCRATCH)
        }
    }

    fn fp_unop(&mut self, op: FpUnOp, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        let (dst, src) = (self.xmm(dst)?, self.xmm(src)?);
        match op {
            FpUnOp::Mov => self.copy_xmm(dst, src)?,
            FpUnOp::Sqrt => self.assembler.sqrtss(dst, src)?,
            FpUnOp::Abs | FpUnOp::Neg => {
                self.assembler.movd(SCRATCH32, src)?;
                if op == FpUnOp::Abs {
                    self.assembler.and(SCRATCH32, 0x7FFF_FFFF)?;
                } else {
                    self.assembler.xor(SCRATCH32, 0x8000_0000u32 as i32)?;
                }
                self.assembler.movd(dst, SCRATCH32)?;
            }
        }
        Ok(())
    }

    fn mov_to_fp(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        let (dst, src) = (self.xmm(dst)?, self.gp32(src)?);
        self.assembler.movd(dst, src)?;
        Ok(())
    }

    fn mov_from_fp(&mut self, dst: AsmReg, src: AsmReg) -> CompileResult<()> {
        let (dst, src) = (self.gp32(dst)?, self.xmm(src)?);
        self.assembler.movd(dst, src)?;
        Ok(())
    }

    fn call_interpreter(&mut self, op: u32, pc: u32) -> CompileResult<()> {
        self.assembler.mov(rdi, CTX)?;
        self.assembler.mov(esi, op as i32)?;
        self.assembler.mov(edx, pc as i32)?;
        self.assembler.mov(rax, self.interpreter_entry)?;
        self.assembler.call(rax)?;
        Ok(())
    }

    fn finish(&mut self) -> CompileResult<Self::Output> {
        let result = self.assemble_block();
        self.assembler.reset();
        let code = result?;

        match self.code_limit {
            Some(limit) if code.len() > limit => Err(CompileError::CodeBuffer { bytes: code.len() }),
            _ => Ok(code),
        }
    }

    fn discard(&mut self) {
        self.assembler.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::{Decoder, DecoderOptions, Instruction, Mnemonic, Register};

    fn decode(code: &[u8]) -> Vec<Instruction> {
        let mut decoder = Decoder::with_ip(64, code, DEFAULT_CODE_BASE, DecoderOptions::NONE);
        let mut out = Vec::new();
        while decoder.can_decode() {
            out.push(decoder.decode());
        }
        out
    }

    /// Mnemonics between the frame setup and teardown.
    fn mnemonics(code: &[u8]) -> Vec<Mnemonic> {
        let all: Vec<_> = decode(code).iter().map(Instruction::mnemonic).collect();
        let end = all.len() - CALLEE_SAVED.len() - 1;
        all[CALLEE_SAVED.len()..end].to_vec()
    }

    #[test]
    fn test_block_frame_preserves_callee_saved() {
        let mut encoder = X64Encoder::new(0).unwrap();
        encoder.mov_imm(AsmReg::gp(0), 0x0880_0010).unwrap();
        let code = encoder.finish().unwrap();
        let insts = decode(&code);

        let pushed: Vec<_> = insts[..3].iter().map(|i| (i.mnemonic(), i.op0_register())).collect();
        assert_eq!(
            pushed,
            vec![(Mnemonic::Push, Register::R12), (Mnemonic::Push, Register::R13), (Mnemonic::Push, Register::R14)]
        );
        let tail: Vec<_> = insts[insts.len() - 4..].iter().map(|i| (i.mnemonic(), i.op0_register())).collect();
        assert_eq!(
            tail,
            vec![
                (Mnemonic::Pop, Register::R14),
                (Mnemonic::Pop, Register::R13),
                (Mnemonic::Pop, Register::R12),
                (Mnemonic::Ret, Register::None),
            ]
        );
        assert_eq!(mnemonics(&code), vec![Mnemonic::Mov]);
    }

    #[test]
    fn test_stack_is_aligned_at_interpreter_calls() {
        let mut encoder = X64Encoder::new(0x1234_5678).unwrap();
        encoder.or_imm(AsmReg::gp(6), AsmReg::gp(6), 0x1234).unwrap();
        encoder.call_interpreter(0x4600_083C, 0x0880_4004).unwrap();
        encoder.call_interpreter(0x4600_083C, 0x0880_4008).unwrap();
        let code = encoder.finish().unwrap();

        // The caller's CALL pushed the return address.
        let mut depth = 8u64;
        let mut calls = 0;
        for inst in decode(&code) {
            match inst.mnemonic() {
                Mnemonic::Push => depth += 8,
                Mnemonic::Pop => depth -= 8,
                Mnemonic::Sub if inst.op0_register() == Register::RSP => depth += inst.immediate(1),
                Mnemonic::Add if inst.op0_register() == Register::RSP => depth -= inst.immediate(1),
                Mnemonic::Call => {
                    assert_eq!(depth % 16, 0, "misaligned call at {:#x}", inst.ip());
                    calls += 1;
                }
                Mnemonic::Ret => assert_eq!(depth, 8),
                _ => {}
            }
        }
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_discard_keeps_frame_balanced() {
        let mut encoder = X64Encoder::new(0).unwrap();
        encoder.mov_imm(AsmReg::gp(0), 1).unwrap();
        encoder.discard();
        let code = encoder.finish().unwrap();
        assert!(mnemonics(&code).is_empty());
        assert_eq!(decode(&code).len(), 2 * CALLEE_SAVED.len() + 1);
    }

    #[test]
    fn test_aliased_second_operand_is_preserved() {
        let mut encoder = X64Encoder::new(0).unwrap();
        encoder
            .fp_binop(FpBinOp::Sub, AsmReg::fp(1), AsmReg::fp(0), AsmReg::fp(1))
            .unwrap();
        let code = encoder.finish().unwrap();
        assert_eq!(
            mnemonics(&code),
            vec![Mnemonic::Movaps, Mnemonic::Movaps, Mnemonic::Subss]
        );
    }

    #[test]
    fn test_commutative_alias_keeps_operand_order() {
        // SSE returns the first operand's NaN payload, so mul a, b must stay `a * b`.
        let mut encoder = X64Encoder::new(0).unwrap();
        encoder
            .fp_binop(FpBinOp::Mul, AsmReg::fp(1), AsmReg::fp(0), AsmReg::fp(1))
            .unwrap();
        let code = encoder.finish().unwrap();
        let insts = decode(&code);
        let mul = insts.iter().find(|i| i.mnemonic() == Mnemonic::Mulss).unwrap();
        assert_eq!(mul.op0_register(), Register::XMM1);
        assert_eq!(mul.op1_register(), Register::XMM15);
        assert_eq!(mnemonics(&code), vec![Mnemonic::Movaps, Mnemonic::Movaps, Mnemonic::Mulss]);
    }

    #[test]
    fn test_byte_swapped_load() {
        let mut encoder = X64Encoder::new(0).unwrap().with_byte_swap(true);
        encoder
            .load_float_swap(AsmReg::fp(2), AsmReg::gp(3), AsmReg::gp(0))
            .unwrap();
        let code = encoder.finish().unwrap();
        assert_eq!(
            mnemonics(&code),
            vec![Mnemonic::Mov, Mnemonic::Bswap, Mnemonic::Movd]
        );
    }

    #[test]
    fn test_wrong_bank_is_an_encoding_error() {
        let mut encoder = X64Encoder::new(0).unwrap();
        let err = encoder.mov_to_fp(AsmReg::gp(1), AsmReg::gp(2)).unwrap_err();
        assert!(matches!(err, CompileError::Encoding { .. }));
    }

    #[test]
    fn test_code_limit() {
        let mut encoder = X64Encoder::new(0).unwrap().with_code_limit(4);
        encoder.call_interpreter(0, 0).unwrap();
        let err = encoder.finish().unwrap_err();
        assert!(matches!(err, CompileError::CodeBuffer { .. }));
    }
}
