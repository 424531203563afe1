//! Print the host code produced for a block of guest instructions.
//!
//! Words are given as hex on the command line or, if none are given, read
//! from stdin (whitespace or comma separated).

use allegrex_jit::core::{CompilationSession, HostLayout, JitOptions};
use allegrex_jit::host::RecordingEmitter;
use allegrex_jit::jit::{CompiledBlock, Jit};
use allegrex_jit::x64::{disassemble, X64Encoder};
use bumpalo::Bump;
use clap::Parser;
use std::io::{self, Read};

#[derive(Parser, Debug)]
#[command(name = "jitdump", about = "Dump translated Allegrex blocks")]
struct Args {
    /// Guest instruction words in hex.
    words: Vec<String>,

    /// Guest address of the first word.
    #[arg(long, default_value = "08804000", value_parser = parse_hex)]
    pc: u32,

    /// Comma-separated opcode families to route through the interpreter, or "all".
    #[arg(long)]
    fallback: Option<String>,

    /// Emit x86-64 and print its disassembly instead of the portable listing.
    #[arg(long)]
    x64: bool,

    /// Interpreter entry address used by x86-64 fallback calls.
    #[arg(long, default_value = "0", value_parser = parse_hex_u64)]
    entry: u64,

    /// Print session statistics after the listing.
    #[arg(long)]
    stats: bool,
}

fn parse_hex(text: &str) -> Result<u32, String> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex word '{text}': {e}"))
}

fn parse_hex_u64(text: &str) -> Result<u64, String> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex address '{text}': {e}"))
}

fn read_words(args: &[String]) -> Result<Vec<u32>, Box<dyn std::error::Error>> {
    let text = if args.is_empty() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        args.join(" ")
    };

    let mut words = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        words.push(parse_hex(token)?);
    }
    Ok(words)
}

fn print_outcomes<T>(block: &CompiledBlock<T>, words: &[u32]) {
    for (outcome, word) in block.outcomes.iter().zip(words) {
        let how = if outcome.native { "native" } else { "interp" };
        println!("; {:08x}: {:08x}  {:<8} {}", outcome.pc, word, outcome.family, how);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let words = read_words(&args.words)?;
    if words.is_empty() {
        eprintln!("No instruction words given");
        std::process::exit(1);
    }

    let mut options = JitOptions::from_env()?;
    if let Some(list) = &args.fallback {
        options = options.parse_fallback_list(list)?;
    }

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);

    if args.x64 {
        let encoder = X64Encoder::new(args.entry)?;
        let code_base = encoder.code_base();
        let mut jit = Jit::new(encoder, HostLayout::x64(), options);
        let block = jit.compile_block(args.pc, &words)?;
        print_outcomes(&block, &words);
        for line in disassemble(&block.code, code_base) {
            println!("{line}");
        }
        block.record(&session, &words, block.code.len());
    } else {
        let mut jit = Jit::new(RecordingEmitter::new(), HostLayout::x64(), options);
        let block = jit.compile_block(args.pc, &words)?;
        print_outcomes(&block, &words);
        for inst in &block.code {
            println!("    {inst}");
        }
        block.record(&session, &words, block.code.len());
    }

    if args.stats {
        println!();
        print!("{}", session.stats());
    }
    Ok(())
}
