//! Turn one decoded + rendered instruction into an output record.

use std::sync::Arc;

use crate::arch::{ArchBackend, DecodedInsn};
use crate::insn::INSN_BYTES;
use crate::memory::{MemoryProvider, Payload};
use crate::{Error, Insn};

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Split rendered text into mnemonic and operands.
///
/// The mnemonic ends at `hint` when given, otherwise at the first space or
/// tab. Operands start after the whitespace run that follows; text without
/// whitespace is all mnemonic.
pub fn split_text(text: &str, hint: Option<usize>) -> (&str, &str) {
    let end = hint
        .filter(|&end| end <= text.len() && text.is_char_boundary(end))
        .or_else(|| text.find(is_blank))
        .unwrap_or(text.len());
    let (mnemonic, rest) = text.split_at(end);
    (mnemonic, rest.trim_start_matches(is_blank))
}

/// Fill `insn` from `raw`, using the rendered `text` and the source `code`.
///
/// In detail mode the detail payload is allocated through `memory` and the
/// raw bytes are copied; otherwise only address and size are set.
pub(crate) fn fill_insn(
    backend: &dyn ArchBackend,
    memory: &Arc<dyn MemoryProvider>,
    detail: bool,
    insn: &mut Insn,
    mut raw: DecodedInsn,
    text: &mut String,
    code: &[u8],
) -> Result<(), Error> {
    insn.address = raw.address;
    insn.size = raw.size;
    insn.bytes = [0; INSN_BYTES];

    if detail {
        let payload = raw.detail.take().map(|d| Payload::new(memory, d)).transpose()?;
        insn.set_detail(payload);

        let len = usize::from(raw.size).min(INSN_BYTES).min(code.len());
        insn.bytes[..len].copy_from_slice(&code[..len]);
    } else {
        insn.set_detail(None);
    }

    insn.id = raw.public_id.unwrap_or_else(|| backend.public_id(raw.opcode));

    let hint = backend.post_render(insn, text);

    let (mnemonic, operands) = split_text(text, hint);
    insn.set_mnemonic(mnemonic);
    insn.set_op_str(operands);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::{MNEMONIC_LEN, OP_STR_LEN};
    use rstest::rstest;

    #[rstest]
    #[case("mov\teax, ebx", "mov", "eax, ebx")]
    #[case("ret", "ret", "")]
    #[case("nop ", "nop", "")]
    #[case("add  \t r0, r1", "add", "r0, r1")]
    #[case("", "", "")]
    fn test_split_text(#[case] text: &str, #[case] mnemonic: &str, #[case] operands: &str) {
        assert_eq!(split_text(text, None), (mnemonic, operands));
    }

    #[test]
    fn test_split_hint_keeps_prefix_in_mnemonic() {
        let text = "rep stosd\tdword ptr es:[edi], eax";
        assert_eq!(split_text(text, Some(9)), ("rep stosd", "dword ptr es:[edi], eax"));
        // Out-of-range hints fall back to the generic split
        assert_eq!(split_text("ret", Some(10)), ("ret", ""));
    }

    #[test]
    fn test_overlong_fields_are_truncated() {
        let mut insn = Insn::default();
        let text = format!("{}\t{}", "m".repeat(50), "o".repeat(200));
        let (mnemonic, operands) = split_text(&text, None);
        insn.set_mnemonic(mnemonic);
        insn.set_op_str(operands);

        assert_eq!(insn.mnemonic(), "m".repeat(MNEMONIC_LEN - 1));
        assert_eq!(insn.op_str(), "o".repeat(OP_STR_LEN - 1));
        assert_eq!(insn.op_str_raw()[OP_STR_LEN - 1], 0);
    }
}
