//! AArch64.

use std::sync::Arc;

use capstone::arch::arm64::{Arm64Operand, Arm64OperandType};
use capstone::arch::ArchOperand;
use log::debug;

use super::{Capabilities, Mode};
use crate::decoder::{capstone_backend, register_table, CapstoneDecoder};
use crate::detail::{ArchDetail, Arm64OpType, Operand, OperandValue, MAX_OPERANDS};
use crate::memory::MemoryProvider;
use crate::Error;

capstone_backend!(Arm64Backend, syntax: []);

fn operand(op: Arm64Operand) -> Operand<Arm64OpType> {
    let none = |kind| Operand::new(kind, OperandValue::None);
    match op.op_type {
        Arm64OperandType::Reg(reg) => Operand::new(Arm64OpType::Reg, OperandValue::Reg(u32::from(reg.0))),
        Arm64OperandType::Imm(imm) => Operand::new(Arm64OpType::Imm, OperandValue::Imm(imm)),
        Arm64OperandType::Cimm(imm) => Operand::new(Arm64OpType::Cimm, OperandValue::Imm(imm)),
        Arm64OperandType::Fp(fp) => Operand::new(Arm64OpType::Fp, OperandValue::Fp(fp)),
        Arm64OperandType::Mem(mem) => Operand::new(
            Arm64OpType::Mem,
            OperandValue::Mem {
                base: u32::from(mem.base().0),
                disp: i64::from(mem.disp()),
            },
        ),
        Arm64OperandType::RegMrs(_) => none(Arm64OpType::RegMrs),
        Arm64OperandType::RegMsr(_) => none(Arm64OpType::RegMsr),
        Arm64OperandType::Pstate(_) => none(Arm64OpType::Pstate),
        Arm64OperandType::Sys(_) => none(Arm64OpType::Sys),
        Arm64OperandType::Prefetch(_) => none(Arm64OpType::Prefetch),
        Arm64OperandType::Barrier(_) => none(Arm64OpType::Barrier),
        #[allow(unreachable_patterns)]
        _ => none(Arm64OpType::Invalid),
    }
}

fn operands(ops: Vec<ArchOperand>) -> ArchDetail {
    ArchDetail::Arm64(
        ops.into_iter()
            .filter_map(|op| match op {
                ArchOperand::Arm64Operand(op) => Some(operand(op)),
                _ => None,
            })
            .take(MAX_OPERANDS)
            .collect(),
    )
}

/// No size or Thumb bits; either byte order.
pub fn init(mode: Mode, memory: &Arc<dyn MemoryProvider>) -> Result<Capabilities, Error> {
    if !Mode::BIG_ENDIAN.contains(mode) {
        return Err(Error::InvalidMode);
    }

    let backend = Arm64Backend {
        decoder: CapstoneDecoder::build(capstone::Arch::ARM64, capstone::Mode::Arm, mode.is_big_endian(), operands)?,
    };
    let side_table = register_table(&backend, memory)?;
    debug!("ARM64 backend ready ({} register names)", side_table.len());

    Ok(Capabilities {
        backend: Box::new(backend),
        side_table: Some(side_table),
    })
}
