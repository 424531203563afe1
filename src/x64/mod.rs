//! x86-64 backend.
//!
//! [`X64Encoder`] implements the emission primitives with iced-x86;
//! [`disassemble`] turns a finished block back into NASM text for dumps and
//! tests.

pub mod encoder;

pub use encoder::{InterpreterEntry, X64Encoder, DEFAULT_CODE_BASE};

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};

/// Disassemble `code` assembled at `ip`, one line per instruction.
pub fn disassemble(code: &[u8], ip: u64) -> Vec<String> {
    let mut decoder = Decoder::with_ip(64, code, ip, DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    formatter.options_mut().set_first_operand_char_index(9);

    let mut lines = Vec::new();
    let mut instruction = Instruction::default();
    let mut text = String::new();
    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        text.clear();
        formatter.format(&instruction, &mut text);
        lines.push(format!("{:016x}  {}", instruction.ip(), text));
    }
    lines
}
