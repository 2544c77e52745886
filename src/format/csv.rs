//! CSV output formatter

use serde::Serialize;

use super::{FormatError, InsnFormatter, InsnRecord};
use crate::Insn;

/// Flat CSV row; the detail summary is reduced to counts
#[derive(Serialize)]
struct CsvRow<'a> {
    base_address: &'a str,
    address: String,
    id: u32,
    size: u16,
    mnemonic: String,
    operands: String,
    bytes: String,
    operand_count: Option<usize>,
}

impl InsnFormatter for super::CsvFormatter {
    fn format(&self, insns: &[Insn], base_addr: u64) -> Result<String, FormatError> {
        let base_address = format!("0x{:x}", base_addr);
        let mut writer = ::csv::Writer::from_writer(Vec::new());

        for insn in insns {
            let record = InsnRecord::from(insn);
            writer.serialize(CsvRow {
                base_address: &base_address,
                address: record.address,
                id: record.id,
                size: record.size,
                mnemonic: record.mnemonic,
                operands: record.operands,
                bytes: record.bytes,
                operand_count: record.detail.map(|d| d.operands),
            })?;
        }

        let bytes = writer.into_inner().map_err(|err| FormatError::Io(err.into_error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}
