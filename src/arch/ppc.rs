//! PowerPC, 32 and 64 bit.

use std::sync::Arc;

use capstone::arch::ppc::PpcOperand;
use capstone::arch::ArchOperand;
use log::debug;

use super::{Capabilities, Mode};
use crate::decoder::{capstone_backend, register_table, CapstoneDecoder};
use crate::detail::{ArchDetail, Operand, OperandValue, PpcOpType, MAX_OPERANDS};
use crate::memory::MemoryProvider;
use crate::Error;

capstone_backend!(PpcBackend, syntax: [Default, NoRegName]);

fn operand(op: PpcOperand) -> Operand<PpcOpType> {
    match op {
        PpcOperand::Reg(reg) => Operand::new(PpcOpType::Reg, OperandValue::Reg(u32::from(reg.0))),
        PpcOperand::Imm(imm) => Operand::new(PpcOpType::Imm, OperandValue::Imm(i64::from(imm))),
        PpcOperand::Mem(mem) => Operand::new(
            PpcOpType::Mem,
            OperandValue::Mem {
                base: u32::from(mem.base().0),
                disp: i64::from(mem.disp()),
            },
        ),
        PpcOperand::Crx(_) => Operand::new(PpcOpType::Crx, OperandValue::None),
        #[allow(unreachable_patterns)]
        _ => Operand::new(PpcOpType::Invalid, OperandValue::None),
    }
}

fn operands(ops: Vec<ArchOperand>) -> ArchDetail {
    ArchDetail::Ppc(
        ops.into_iter()
            .filter_map(|op| match op {
                ArchOperand::PpcOperand(op) => Some(operand(op)),
                _ => None,
            })
            .take(MAX_OPERANDS)
            .collect(),
    )
}

/// Exactly one of MODE_32 / MODE_64, either byte order.
pub fn init(mode: Mode, memory: &Arc<dyn MemoryProvider>) -> Result<Capabilities, Error> {
    let cs_mode = match mode.difference(Mode::BIG_ENDIAN) {
        m if m == Mode::MODE_32 => capstone::Mode::Mode32,
        m if m == Mode::MODE_64 => capstone::Mode::Mode64,
        _ => return Err(Error::InvalidMode),
    };

    let backend = PpcBackend {
        decoder: CapstoneDecoder::build(capstone::Arch::PPC, cs_mode, mode.is_big_endian(), operands)?,
    };
    let side_table = register_table(&backend, memory)?;
    debug!("PPC backend ready ({:?}, {} register names)", cs_mode, side_table.len());

    Ok(Capabilities {
        backend: Box::new(backend),
        side_table: Some(side_table),
    })
}
