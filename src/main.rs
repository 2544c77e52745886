use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use decay_engine::format::OutputFormat;
use decay_engine::{Arch, Mode, Session, SessionConfig, Syntax};

#[derive(Parser, Debug)]
#[command(name = "decay-dis", version, about = "Disassemble raw machine code")]
struct Args {
    /// Hex-encoded machine code (whitespace allowed)
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    hex: Option<String>,

    /// Read raw machine code from this file
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Instruction-set family
    #[arg(long, value_enum, default_value_t = Arch::X86)]
    arch: Arch,

    /// Mode flags, e.g. "MODE_64" or "MODE_32 | BIG_ENDIAN" (family default when absent)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<Mode>,

    /// Session configuration file (JSON); overrides --arch, --mode, --detail and --syntax
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Compute instruction details (raw bytes, registers, groups, operands)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    detail: bool,

    /// Printer dialect
    #[arg(long, value_enum, default_value_t = Syntax::Default)]
    syntax: Syntax,

    /// Address of the first byte
    #[arg(long, value_parser = parse_address, default_value = "0x1000")]
    address: u64,

    /// Stop after this many instructions (0 = no limit)
    #[arg(long, default_value_t = 0)]
    count: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn parse_mode(text: &str) -> Result<Mode, String> {
    bitflags::parser::from_str::<Mode>(text).map_err(|err| err.to_string())
}

fn parse_address(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("invalid address {:?}: {}", text, err))
}

fn decode_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        bail!("hex input has an odd number of digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).context("hex input is not ASCII")?;
            u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex byte {:?}", pair))
        })
        .collect()
}

fn session_config(args: &Args) -> anyhow::Result<SessionConfig> {
    if let Some(path) = &args.config {
        return SessionConfig::load(path).with_context(|| format!("load config {}", path.display()));
    }
    Ok(SessionConfig {
        arch: args.arch,
        mode: args.mode,
        detail: args.detail,
        syntax: args.syntax,
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> anyhow::Result<()> {
    let code = match (&args.hex, &args.file) {
        (Some(hex), _) => decode_hex(hex)?,
        (None, Some(path)) => fs::read(path).with_context(|| format!("read {}", path.display()))?,
        (None, None) => bail!("either --hex or --file is required"),
    };

    let config = session_config(&args)?;
    let session = Session::from_config(&config).context("open session")?;

    let insns = session
        .disasm_all(&code, args.address, args.count)
        .context("disassemble")?;
    let decoded: usize = insns.iter().map(|insn| usize::from(insn.size)).sum();

    let rendered = args.format.formatter().format(&insns, args.address)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(rendered.as_bytes())?;

    if decoded < code.len() && args.count == 0 {
        eprintln!(
            "stopped at 0x{:x}: {} of {} bytes decoded",
            args.address + decoded as u64,
            decoded,
            code.len()
        );
    }

    decay_engine::free(insns);
    session.close();
    Ok(())
}
