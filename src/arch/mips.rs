//! MIPS32 and MIPS64.

use std::sync::Arc;

use capstone::arch::mips::MipsOperand;
use capstone::arch::ArchOperand;
use log::debug;

use super::{Capabilities, Mode};
use crate::decoder::{capstone_backend, register_table, CapstoneDecoder};
use crate::detail::{ArchDetail, MipsOpType, Operand, OperandValue, MAX_OPERANDS};
use crate::memory::MemoryProvider;
use crate::Error;

capstone_backend!(MipsBackend, syntax: []);

fn operand(op: MipsOperand) -> Operand<MipsOpType> {
    match op {
        MipsOperand::Reg(reg) => Operand::new(MipsOpType::Reg, OperandValue::Reg(u32::from(reg.0))),
        MipsOperand::Imm(imm) => Operand::new(MipsOpType::Imm, OperandValue::Imm(imm)),
        MipsOperand::Mem(mem) => Operand::new(
            MipsOpType::Mem,
            OperandValue::Mem {
                base: u32::from(mem.base().0),
                disp: i64::from(mem.disp()),
            },
        ),
        #[allow(unreachable_patterns)]
        _ => Operand::new(MipsOpType::Invalid, OperandValue::None),
    }
}

fn operands(ops: Vec<ArchOperand>) -> ArchDetail {
    ArchDetail::Mips(
        ops.into_iter()
            .filter_map(|op| match op {
                ArchOperand::MipsOperand(op) => Some(operand(op)),
                _ => None,
            })
            .take(MAX_OPERANDS)
            .collect(),
    )
}

/// Exactly one of MODE_32 / MODE_64, either byte order. microMIPS and the
/// N64 variant have no decoder here.
pub fn init(mode: Mode, memory: &Arc<dyn MemoryProvider>) -> Result<Capabilities, Error> {
    let cs_mode = match mode.difference(Mode::BIG_ENDIAN) {
        m if m == Mode::MODE_32 => capstone::Mode::Mips32,
        m if m == Mode::MODE_64 => capstone::Mode::Mips64,
        _ => return Err(Error::InvalidMode),
    };

    let backend = MipsBackend {
        decoder: CapstoneDecoder::build(capstone::Arch::MIPS, cs_mode, mode.is_big_endian(), operands)?,
    };
    let side_table = register_table(&backend, memory)?;
    debug!("MIPS backend ready ({:?}, {} register names)", cs_mode, side_table.len());

    Ok(Capabilities {
        backend: Box::new(backend),
        side_table: Some(side_table),
    })
}
