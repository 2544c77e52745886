//! 32-bit ARM, Thumb and Thumb-2.

use std::sync::Arc;

use capstone::arch::arm::{ArmOperand, ArmOperandType};
use capstone::arch::ArchOperand;
use log::debug;

use super::{Capabilities, Mode};
use crate::decoder::{capstone_backend, register_table, CapstoneDecoder};
use crate::detail::{ArchDetail, ArmOpType, Operand, OperandValue, MAX_OPERANDS};
use crate::memory::MemoryProvider;
use crate::Error;

capstone_backend!(ArmBackend, syntax: []);

fn operand(op: ArmOperand) -> Operand<ArmOpType> {
    match op.op_type {
        ArmOperandType::Reg(reg) => Operand::new(ArmOpType::Reg, OperandValue::Reg(u32::from(reg.0))),
        ArmOperandType::Imm(imm) => Operand::new(ArmOpType::Imm, OperandValue::Imm(i64::from(imm))),
        ArmOperandType::Cimm(imm) => Operand::new(ArmOpType::Cimm, OperandValue::Imm(i64::from(imm))),
        ArmOperandType::Pimm(imm) => Operand::new(ArmOpType::Pimm, OperandValue::Imm(i64::from(imm))),
        ArmOperandType::Fp(fp) => Operand::new(ArmOpType::Fp, OperandValue::Fp(fp)),
        ArmOperandType::Mem(mem) => Operand::new(
            ArmOpType::Mem,
            OperandValue::Mem {
                base: u32::from(mem.base().0),
                disp: i64::from(mem.disp()),
            },
        ),
        ArmOperandType::Setend(_) => Operand::new(ArmOpType::Setend, OperandValue::None),
        ArmOperandType::SysReg(reg) => Operand::new(ArmOpType::SysReg, OperandValue::Reg(u32::from(reg.0))),
        #[allow(unreachable_patterns)]
        _ => Operand::new(ArmOpType::Invalid, OperandValue::None),
    }
}

fn operands(ops: Vec<ArchOperand>) -> ArchDetail {
    ArchDetail::Arm(
        ops.into_iter()
            .filter_map(|op| match op {
                ArchOperand::ArmOperand(op) => Some(operand(op)),
                _ => None,
            })
            .take(MAX_OPERANDS)
            .collect(),
    )
}

/// ARM (no bits) or Thumb, in either byte order.
pub fn init(mode: Mode, memory: &Arc<dyn MemoryProvider>) -> Result<Capabilities, Error> {
    if !(Mode::THUMB | Mode::BIG_ENDIAN).contains(mode) {
        return Err(Error::InvalidMode);
    }
    let cs_mode = if mode.contains(Mode::THUMB) {
        capstone::Mode::Thumb
    } else {
        capstone::Mode::Arm
    };

    let backend = ArmBackend {
        decoder: CapstoneDecoder::build(capstone::Arch::ARM, cs_mode, mode.is_big_endian(), operands)?,
    };
    let side_table = register_table(&backend, memory)?;
    debug!("ARM backend ready ({:?}, {} register names)", cs_mode, side_table.len());

    Ok(Capabilities {
        backend: Box::new(backend),
        side_table: Some(side_table),
    })
}
