//! The caller-visible instruction record.

use std::fmt;

use crate::detail::{Detail, OpType};
use crate::memory::Payload;
use crate::Error;

/// Capacity of the raw byte field
pub const INSN_BYTES: usize = 16;
/// Capacity of the mnemonic field, terminator included
pub const MNEMONIC_LEN: usize = 32;
/// Capacity of the operand field, terminator included
pub const OP_STR_LEN: usize = 96;

/// One decoded instruction.
///
/// Text fields are fixed-capacity, NUL-terminated buffers: overlong text is
/// truncated (at a character boundary), never overflowed.
#[derive(Debug, PartialEq)]
pub struct Insn {
    /// Public instruction id
    pub id: u32,
    /// Address of the instruction
    pub address: u64,
    /// Size of the instruction in bytes
    pub size: u16,
    /// Raw bytes (only filled in detail mode)
    pub bytes: [u8; INSN_BYTES],
    mnemonic: [u8; MNEMONIC_LEN],
    op_str: [u8; OP_STR_LEN],
    detail: Option<Payload<Detail>>,
}

impl Default for Insn {
    fn default() -> Self {
        Self {
            id: 0,
            address: 0,
            size: 0,
            bytes: [0; INSN_BYTES],
            mnemonic: [0; MNEMONIC_LEN],
            op_str: [0; OP_STR_LEN],
            detail: None,
        }
    }
}

/// Copy `src` into `dst`, truncating at a char boundary and always leaving
/// room for the terminator.
fn copy_terminated(dst: &mut [u8], src: &str) {
    let mut len = src.len().min(dst.len().saturating_sub(1));
    while !src.is_char_boundary(len) {
        len -= 1;
    }
    dst[..len].copy_from_slice(&src.as_bytes()[..len]);
    dst[len..].fill(0);
}

fn read_terminated(src: &[u8]) -> &str {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    std::str::from_utf8(&src[..end]).unwrap_or("")
}

impl Insn {
    /// Blank record covering `size` bytes at `address`
    pub fn at(address: u64, size: u16) -> Self {
        Self {
            address,
            size,
            ..Self::default()
        }
    }

    /// Instruction mnemonic (e.g. "mov", "add")
    pub fn mnemonic(&self) -> &str {
        read_terminated(&self.mnemonic)
    }

    /// Operand string
    pub fn op_str(&self) -> &str {
        read_terminated(&self.op_str)
    }

    /// The terminated mnemonic buffer as stored
    pub fn mnemonic_raw(&self) -> &[u8; MNEMONIC_LEN] {
        &self.mnemonic
    }

    /// The terminated operand buffer as stored
    pub fn op_str_raw(&self) -> &[u8; OP_STR_LEN] {
        &self.op_str
    }

    pub fn set_mnemonic(&mut self, text: &str) {
        copy_terminated(&mut self.mnemonic, text);
    }

    pub fn set_op_str(&mut self, text: &str) {
        copy_terminated(&mut self.op_str, text);
    }

    /// Returns the instruction bytes, up to the actual instruction size.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.size).min(INSN_BYTES)]
    }

    /// Detail payload, present only for records produced in detail mode
    pub fn detail(&self) -> Option<&Detail> {
        self.detail.as_deref()
    }

    pub fn detail_mut(&mut self) -> Option<&mut Detail> {
        self.detail.as_deref_mut()
    }

    pub(crate) fn set_detail(&mut self, detail: Option<Payload<Detail>>) {
        self.detail = detail;
    }

    pub(crate) fn take_detail(&mut self) -> Option<Payload<Detail>> {
        self.detail.take()
    }

    fn require_detail(&self) -> Result<&Detail, Error> {
        self.detail().ok_or(Error::DetailUnavailable)
    }

    /// Whether the instruction belongs to `group`
    pub fn in_group(&self, group: u32) -> Result<bool, Error> {
        Ok(self.require_detail()?.in_group(group))
    }

    /// Whether the instruction implicitly reads `reg`
    pub fn reads_reg(&self, reg: u32) -> Result<bool, Error> {
        Ok(self.require_detail()?.reads_reg(reg))
    }

    /// Whether the instruction implicitly writes `reg`
    pub fn writes_reg(&self, reg: u32) -> Result<bool, Error> {
        Ok(self.require_detail()?.writes_reg(reg))
    }

    /// Number of operands of `kind`
    pub fn op_count(&self, kind: impl Into<OpType>) -> Result<usize, Error> {
        self.require_detail()?.op_count(kind)
    }

    /// Position of the `post`-th (1-based) operand of `kind`
    pub fn op_index(&self, kind: impl Into<OpType>, post: usize) -> Result<Option<usize>, Error> {
        self.require_detail()?.op_index(kind, post)
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.mnemonic(), self.op_str())
    }
}
