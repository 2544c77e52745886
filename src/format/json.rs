//! JSON and JSON Lines output formatters

use serde::{Deserialize, Serialize};

use super::{hex_bytes, FormatError, InsnFormatter};
use crate::Insn;

/// Serializable detail summary
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DetailRecord {
    pub regs_read: Vec<u32>,
    pub regs_write: Vec<u32>,
    pub groups: Vec<u32>,
    pub operands: usize,
}

/// Serializable record, shared by the JSON, JSON Lines and CSV formatters
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct InsnRecord {
    /// Address of the instruction
    pub address: String,
    /// Public instruction id
    pub id: u32,
    /// Size of the instruction in bytes
    pub size: u16,
    /// Mnemonic (e.g., "mov", "add")
    pub mnemonic: String,
    /// Operands
    pub operands: String,
    /// Bytes of the instruction as hex string
    pub bytes: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<DetailRecord>,
}

impl From<&Insn> for InsnRecord {
    fn from(insn: &Insn) -> Self {
        Self {
            address: format!("0x{:x}", insn.address),
            id: insn.id,
            size: insn.size,
            mnemonic: insn.mnemonic().to_string(),
            operands: insn.op_str().to_string(),
            bytes: hex_bytes(insn),
            detail: insn.detail().map(|d| DetailRecord {
                regs_read: d.regs_read().to_vec(),
                regs_write: d.regs_write().to_vec(),
                groups: d.groups().to_vec(),
                operands: d.arch().len(),
            }),
        }
    }
}

/// Serializable result for JSON output
#[derive(Serialize, Deserialize)]
struct DisassemblyJson {
    base_address: String,
    instructions: Vec<InsnRecord>,
}

impl InsnFormatter for super::JsonFormatter {
    fn format(&self, insns: &[Insn], base_addr: u64) -> Result<String, FormatError> {
        let result = DisassemblyJson {
            base_address: format!("0x{:x}", base_addr),
            instructions: insns.iter().map(InsnRecord::from).collect(),
        };

        Ok(serde_json::to_string_pretty(&result)?)
    }
}

impl InsnFormatter for super::JsonLinesFormatter {
    fn format(&self, insns: &[Insn], _base_addr: u64) -> Result<String, FormatError> {
        let mut output = String::new();
        for insn in insns {
            output.push_str(&serde_json::to_string(&InsnRecord::from(insn))?);
            output.push('\n');
        }
        Ok(output)
    }
}
