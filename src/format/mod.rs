//! Renderers for decoded records.

mod csv;
mod json;

pub use self::json::*;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::Insn;

/// Errors raised while rendering records
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV serialization error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// How `decay-dis` prints records. Names follow the CLI spelling
/// (`text`, `json`, `json-lines`, `csv`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per record
    #[default]
    Text,
    /// A single document with every record
    Json,
    /// One JSON object per record
    #[value(alias = "jsonl")]
    JsonLines,
    /// Flat rows with a header
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

impl OutputFormat {
    /// The renderer behind this format
    pub fn formatter(&self) -> Box<dyn InsnFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for decoded records
pub trait InsnFormatter {
    /// Render `insns`, decoded starting at `base_addr`
    fn format(&self, insns: &[Insn], base_addr: u64) -> Result<String, FormatError>;
}

/// Format records in plain text
pub struct TextFormatter;

/// Format records in JSON
pub struct JsonFormatter;

/// Format records in JSON Lines
pub struct JsonLinesFormatter;

/// Format records in CSV
pub struct CsvFormatter;

/// Raw bytes as space-separated hex. Bytes are only recorded in detail mode;
/// records without detail render as an empty string.
pub(crate) fn hex_bytes(insn: &Insn) -> String {
    if insn.detail().is_none() {
        return String::new();
    }
    insn.bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

impl InsnFormatter for TextFormatter {
    fn format(&self, insns: &[Insn], base_addr: u64) -> Result<String, FormatError> {
        let mut output = String::new();
        output.push_str(&format!("Disassembly at 0x{:x}:\n\n", base_addr));

        for insn in insns {
            let bytes = hex_bytes(insn);
            let line = format!("0x{:08x}: {:<10} {:<30}", insn.address, insn.mnemonic(), insn.op_str());
            if bytes.is_empty() {
                output.push_str(line.trim_end());
            } else {
                output.push_str(&format!("{} ; {}", line, bytes));
            }
            output.push('\n');
        }

        Ok(output)
    }
}
