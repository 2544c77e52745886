//! x86 / x86-64.
//!
//! The only family with several printer dialects, prefix-aware mnemonic
//! splitting and a combining pass (`wait` + no-wait x87 control forms).

use std::sync::Arc;

use capstone::arch::x86::{X86Operand, X86OperandType};
use capstone::arch::ArchOperand;
use log::debug;

use super::{ArchBackend, Capabilities, DecodedInsn, Mode, Syntax};
use crate::decoder::{capstone_syntax, CapstoneDecoder};
use crate::detail::{ArchDetail, Operand, OperandValue, X86OpType, MAX_OPERANDS};
use crate::disasm::InsnTail;
use crate::insn::INSN_BYTES;
use crate::memory::MemoryProvider;
use crate::{Error, Insn};

/// Prefixes the printer emits as a separate word in front of the mnemonic
const PREFIXES: &[&str] = &[
    "rep", "repe", "repz", "repne", "repnz", "lock", "xacquire", "xrelease", "bnd", "notrack", "data16",
];

/// No-wait x87 control forms and the waiting form a preceding `wait` turns
/// them into
const WAIT_FORMS: &[(&str, &str)] = &[
    ("fnstsw", "fstsw"),
    ("fnstcw", "fstcw"),
    ("fnstenv", "fstenv"),
    ("fnsave", "fsave"),
    ("fninit", "finit"),
    ("fnclex", "fclex"),
];

#[derive(Debug)]
pub struct X86Backend {
    decoder: CapstoneDecoder,
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Byte length of "prefix mnemonic" when `text` starts with a known prefix
/// followed by another word.
fn prefixed_mnemonic_len(text: &str) -> Option<usize> {
    let first_end = text.find(is_blank)?;
    if !PREFIXES.contains(&&text[..first_end]) {
        return None;
    }
    let rest = &text[first_end..];
    let word_start = first_end + (rest.len() - rest.trim_start_matches(' ').len());
    if word_start >= text.len() || text[word_start..].starts_with('\t') {
        return None;
    }
    let word_len = text[word_start..].find(is_blank).unwrap_or(text.len() - word_start);
    Some(word_start + word_len)
}

impl ArchBackend for X86Backend {
    fn decode(&self, code: &[u8], address: u64, detail: bool) -> Option<DecodedInsn> {
        self.decoder.decode_one(code, address, detail)
    }

    fn reg_name(&self, reg: u32) -> Option<String> {
        self.decoder.reg_name(reg)
    }

    fn insn_name(&self, id: u32) -> Option<String> {
        self.decoder.insn_name(id)
    }

    fn post_render(&self, _insn: &mut Insn, text: &mut String) -> Option<usize> {
        prefixed_mnemonic_len(text)
    }

    fn combine(&self, insn: &mut Insn, tail: &mut dyn InsnTail) -> bool {
        let Some(&(_, waiting)) = WAIT_FORMS.iter().find(|(nowait, _)| insn.mnemonic() == *nowait) else {
            return false;
        };
        let Some(prev) = tail.last_mut() else {
            return false;
        };
        if prev.mnemonic() != "wait" || prev.address.wrapping_add(u64::from(prev.size)) != insn.address {
            return false;
        }

        let head = usize::from(prev.size);
        let size = head + usize::from(insn.size);
        if size > INSN_BYTES {
            return false;
        }

        let mut bytes = [0u8; INSN_BYTES];
        bytes[..head].copy_from_slice(&prev.bytes[..head]);
        bytes[head..size].copy_from_slice(&insn.bytes[..usize::from(insn.size)]);

        prev.bytes = bytes;
        prev.size += insn.size;
        prev.id = insn.id;
        prev.set_mnemonic(waiting);
        prev.set_op_str(insn.op_str());
        prev.set_detail(insn.take_detail());
        true
    }

    fn set_syntax(&mut self, syntax: Syntax) -> Result<(), Error> {
        match syntax {
            Syntax::Default | Syntax::Intel | Syntax::Att => self.decoder.set_syntax(capstone_syntax(syntax)),
            Syntax::NoRegName => Err(Error::InvalidOption),
        }
    }
}

fn operand(op: X86Operand) -> Operand<X86OpType> {
    match op.op_type {
        X86OperandType::Reg(reg) => Operand::new(X86OpType::Reg, OperandValue::Reg(u32::from(reg.0))),
        X86OperandType::Imm(imm) => Operand::new(X86OpType::Imm, OperandValue::Imm(imm)),
        X86OperandType::Mem(mem) => Operand::new(
            X86OpType::Mem,
            OperandValue::Mem {
                base: u32::from(mem.base().0),
                disp: i64::from(mem.disp()),
            },
        ),
        #[allow(unreachable_patterns)]
        _ => Operand::new(X86OpType::Invalid, OperandValue::None),
    }
}

fn operands(ops: Vec<ArchOperand>) -> ArchDetail {
    ArchDetail::X86(
        ops.into_iter()
            .filter_map(|op| match op {
                ArchOperand::X86Operand(op) => Some(operand(op)),
                _ => None,
            })
            .take(MAX_OPERANDS)
            .collect(),
    )
}

fn capstone_mode(mode: Mode) -> Result<capstone::Mode, Error> {
    if mode == Mode::MODE_16 {
        Ok(capstone::Mode::Mode16)
    } else if mode == Mode::MODE_32 {
        Ok(capstone::Mode::Mode32)
    } else if mode == Mode::MODE_64 {
        Ok(capstone::Mode::Mode64)
    } else {
        Err(Error::InvalidMode)
    }
}

/// Exactly one of the 16/32/64-bit flags; x86 is little-endian only.
pub fn init(mode: Mode, _memory: &Arc<dyn MemoryProvider>) -> Result<Capabilities, Error> {
    let cs_mode = capstone_mode(mode)?;
    let decoder = CapstoneDecoder::build(capstone::Arch::X86, cs_mode, false, operands)?;
    debug!("x86 backend ready ({:?})", cs_mode);

    Ok(Capabilities {
        backend: Box::new(X86Backend { decoder }),
        side_table: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemMemory;
    use rstest::rstest;

    fn backend(mode: Mode) -> Box<dyn ArchBackend> {
        let memory: Arc<dyn MemoryProvider> = Arc::new(SystemMemory);
        init(mode, &memory).unwrap().backend
    }

    fn record(address: u64, code: &[u8], mnemonic: &str, op_str: &str) -> Insn {
        let mut insn = Insn::at(address, code.len() as u16);
        insn.bytes[..code.len()].copy_from_slice(code);
        insn.set_mnemonic(mnemonic);
        insn.set_op_str(op_str);
        insn
    }

    #[rstest]
    #[case(Mode::MODE_16, true)]
    #[case(Mode::MODE_32, true)]
    #[case(Mode::MODE_64, true)]
    #[case(Mode::empty(), false)]
    #[case(Mode::MODE_32 | Mode::MODE_64, false)]
    #[case(Mode::MODE_32 | Mode::BIG_ENDIAN, false)]
    #[case(Mode::THUMB, false)]
    fn test_mode_validation(#[case] mode: Mode, #[case] valid: bool) {
        let memory: Arc<dyn MemoryProvider> = Arc::new(SystemMemory);
        match init(mode, &memory) {
            Ok(caps) => {
                assert!(valid);
                assert!(caps.side_table.is_none());
            }
            Err(err) => {
                assert!(!valid);
                assert_eq!(err, Error::InvalidMode);
            }
        }
    }

    #[test]
    fn test_decode_64bit() {
        let backend = backend(Mode::MODE_64);
        let raw = backend.decode(&[0x48, 0x89, 0xd8, 0x90], 0x1000, true).unwrap();

        assert_eq!(raw.size, 3);
        assert_eq!(raw.mnemonic, "mov");
        assert_eq!(raw.op_str, "rax, rbx");
        let detail = raw.detail.unwrap();
        assert_eq!(detail.op_count(X86OpType::Reg), Ok(2));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let backend = backend(Mode::MODE_32);
        assert!(backend.decode(&[0xb8, 0x01], 0, false).is_none());
        assert!(backend.decode(&[], 0, false).is_none());
    }

    #[rstest]
    #[case("rep stosd\tdword ptr es:[edi], eax", Some(9))]
    #[case("lock add\tdword ptr [eax], 1", Some(8))]
    #[case("rep movsb byte ptr es:[edi], byte ptr [esi]", Some(9))]
    #[case("mov\teax, ebx", None)]
    #[case("lock", None)]
    #[case("ret", None)]
    fn test_prefix_hint(#[case] text: &str, #[case] hint: Option<usize>) {
        assert_eq!(prefixed_mnemonic_len(text), hint);
    }

    #[test]
    fn test_syntax_dialects() {
        let mut backend = backend(Mode::MODE_32);
        assert_eq!(backend.set_syntax(Syntax::Att), Ok(()));
        let raw = backend.decode(&[0x89, 0xd8], 0, false).unwrap();
        assert_eq!(raw.op_str, "%ebx, %eax");

        assert_eq!(backend.set_syntax(Syntax::Intel), Ok(()));
        assert_eq!(backend.set_syntax(Syntax::Default), Ok(()));
        assert_eq!(backend.set_syntax(Syntax::NoRegName), Err(Error::InvalidOption));
    }

    #[test]
    fn test_wait_fuses_with_nowait_form() {
        let backend = backend(Mode::MODE_32);
        let mut tail = vec![record(0x100, &[0x9b], "wait", "")];
        let mut next = record(0x101, &[0xdf, 0xe0], "fnstsw", "ax");

        assert!(backend.combine(&mut next, &mut tail));
        assert_eq!(tail.len(), 1);
        let fused = &tail[0];
        assert_eq!(fused.mnemonic(), "fstsw");
        assert_eq!(fused.op_str(), "ax");
        assert_eq!(fused.size, 3);
        assert_eq!(fused.bytes(), &[0x9b, 0xdf, 0xe0]);
    }

    #[test]
    fn test_combine_requires_adjacent_wait() {
        let backend = backend(Mode::MODE_32);

        // Nothing before it
        let mut empty: Vec<Insn> = Vec::new();
        let mut next = record(0x101, &[0xdf, 0xe0], "fnstsw", "ax");
        assert!(!backend.combine(&mut next, &mut empty));

        // Predecessor is not a wait
        let mut tail = vec![record(0x100, &[0x90], "nop", "")];
        assert!(!backend.combine(&mut next, &mut tail));

        // Gap between the two
        let mut tail = vec![record(0xf0, &[0x9b], "wait", "")];
        assert!(!backend.combine(&mut next, &mut tail));

        // Not a no-wait form
        let mut tail = vec![record(0x100, &[0x9b], "wait", "")];
        let mut other = record(0x101, &[0x90], "nop", "");
        assert!(!backend.combine(&mut other, &mut tail));
        assert_eq!(tail[0].mnemonic(), "wait");
    }
}
