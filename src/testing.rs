//! A scripted collaborator for deterministic decode-loop tests.
//!
//! Encodings:
//!
//! | bytes        | record                    |
//! |--------------|---------------------------|
//! | `90`         | `nop`                     |
//! | `f0 0f`      | `pfx`, fuses with the next record |
//! | `01 rr`      | `mov rN`, reads `rr`, writes `r0` |
//! | `ee`         | zero-length result        |
//! | `ef`         | result longer than the input |
//! | anything else | undecodable              |

use std::sync::Arc;

use crate::arch::{Arch, ArchBackend, Capabilities, DecodedInsn, Mode, Syntax};
use crate::detail::{ArchDetail, Detail, Operand, OperandValue, X86OpType};
use crate::disasm::InsnTail;
use crate::insn::INSN_BYTES;
use crate::memory::MemoryProvider;
use crate::{Error, Insn, Session};

pub(crate) const NOP: u8 = 0x90;
pub(crate) const PREFIX: [u8; 2] = [0xf0, 0x0f];
pub(crate) const MOV: u8 = 0x01;
pub(crate) const STALL: u8 = 0xee;
pub(crate) const OVERRUN: u8 = 0xef;
pub(crate) const INVALID: u8 = 0xff;

/// Offset added to an opcode to form its public id
pub(crate) const ID_BASE: u32 = 100;

#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend;

impl ArchBackend for ScriptedBackend {
    fn decode(&self, code: &[u8], address: u64, detail: bool) -> Option<DecodedInsn> {
        let (size, opcode, mnemonic, op_str, reg) = match *code.first()? {
            NOP => (1, 1, "nop", String::new(), None),
            first if first == PREFIX[0] && code.get(1) == Some(&PREFIX[1]) => (2, 2, "pfx", String::new(), None),
            MOV => {
                let reg = *code.get(1)?;
                (2, 3, "mov", format!("r{}", reg), Some(u32::from(reg)))
            }
            STALL => (0, 4, "stall", String::new(), None),
            OVERRUN => (8, 5, "overrun", String::new(), None),
            _ => return None,
        };

        let detail = detail.then(|| {
            let operands = reg
                .map(|reg| vec![Operand::new(X86OpType::Reg, OperandValue::Reg(reg))])
                .unwrap_or_default();
            Detail::new(reg, reg.map(|_| 0), [1], ArchDetail::X86(operands))
        });

        Some(DecodedInsn {
            address,
            size,
            opcode,
            public_id: None,
            mnemonic: mnemonic.to_string(),
            op_str,
            detail,
        })
    }

    fn public_id(&self, opcode: u32) -> u32 {
        opcode + ID_BASE
    }

    fn reg_name(&self, reg: u32) -> Option<String> {
        (reg < 16).then(|| format!("r{}", reg))
    }

    fn insn_name(&self, id: u32) -> Option<String> {
        let name = match id.checked_sub(ID_BASE)? {
            1 => "nop",
            2 => "pfx",
            3 => "mov",
            _ => return None,
        };
        Some(name.to_string())
    }

    fn combine(&self, insn: &mut Insn, tail: &mut dyn InsnTail) -> bool {
        let Some(prev) = tail.last_mut() else {
            return false;
        };
        if prev.mnemonic() != "pfx" || prev.address + u64::from(prev.size) != insn.address {
            return false;
        }
        let head = usize::from(prev.size);
        let size = head + usize::from(insn.size);
        if size > INSN_BYTES {
            return false;
        }

        let mut bytes = prev.bytes;
        bytes[head..size].copy_from_slice(&insn.bytes[..usize::from(insn.size)]);
        let mnemonic = format!("pfx.{}", insn.mnemonic());

        prev.bytes = bytes;
        prev.size += insn.size;
        prev.id = insn.id;
        prev.set_mnemonic(&mnemonic);
        prev.set_op_str(insn.op_str());
        prev.set_detail(insn.take_detail());
        true
    }

    fn set_syntax(&mut self, syntax: Syntax) -> Result<(), Error> {
        match syntax {
            Syntax::Default => Ok(()),
            _ => Err(Error::InvalidOption),
        }
    }
}

/// A session driving [`ScriptedBackend`], allocating through `memory`.
pub(crate) fn scripted_session(memory: Arc<dyn MemoryProvider>) -> Session {
    Session::assemble(Arch::X86, Mode::MODE_32, memory, |_| {
        Ok(Capabilities {
            backend: Box::new(ScriptedBackend),
            side_table: None,
        })
    })
    .expect("scripted session")
}
