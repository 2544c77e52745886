//! Architecture identifiers, mode flags and the per-family dispatch table.
//!
//! Each supported instruction-set family contributes one row: an
//! initializer that validates the requested mode and wires up the
//! [`ArchBackend`] collaborator a session drives. The table is fixed at build
//! time; families can be left out with cargo features.

use std::fmt;
use std::mem;
use std::sync::Arc;

use bitflags::bitflags;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::detail::Detail;
use crate::disasm::InsnTail;
use crate::memory::{Footprint, MemoryProvider, Payload};
use crate::{Error, Insn};

#[cfg(feature = "arm")]
pub mod arm;
#[cfg(feature = "arm64")]
pub mod arm64;
#[cfg(feature = "mips")]
pub mod mips;
#[cfg(feature = "ppc")]
pub mod ppc;
#[cfg(feature = "x86")]
pub mod x86;

/// Query value asking whether every family was compiled in.
pub const ARCH_ALL: u32 = 0xFFFF;

/// Supported instruction-set families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum Arch {
    /// ARM, including Thumb and Thumb-2
    Arm = 0,
    /// AArch64
    Arm64 = 1,
    /// MIPS
    Mips = 2,
    /// x86 and x86-64
    X86 = 3,
    /// PowerPC
    Ppc = 4,
}

impl Arch {
    /// Every family the engine knows about, compiled in or not.
    pub fn all() -> &'static [Arch] {
        &[Arch::Arm, Arch::Arm64, Arch::Mips, Arch::X86, Arch::Ppc]
    }

    /// The mode used when a caller does not ask for one
    pub fn default_mode(self) -> Mode {
        match self {
            Arch::Arm => Mode::ARM,
            Arch::Arm64 => Mode::LITTLE_ENDIAN,
            Arch::Mips => Mode::MODE_32 | Mode::BIG_ENDIAN,
            Arch::X86 => Mode::MODE_32,
            Arch::Ppc => Mode::MODE_32 | Mode::BIG_ENDIAN,
        }
    }
}

impl TryFrom<u32> for Arch {
    type Error = Error;

    fn try_from(raw: u32) -> Result<Self, Error> {
        match raw {
            0 => Ok(Arch::Arm),
            1 => Ok(Arch::Arm64),
            2 => Ok(Arch::Mips),
            3 => Ok(Arch::X86),
            4 => Ok(Arch::Ppc),
            _ => Err(Error::UnsupportedArch),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::Arm => write!(f, "ARM"),
            Arch::Arm64 => write!(f, "ARM64"),
            Arch::Mips => write!(f, "MIPS"),
            Arch::X86 => write!(f, "x86"),
            Arch::Ppc => write!(f, "PowerPC"),
        }
    }
}

bitflags! {
    /// Decoding mode flags. Meaning depends on the family.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Mode: u32 {
        /// 16-bit mode (x86)
        const MODE_16 = 1 << 1;
        /// 32-bit mode (x86, MIPS, PPC)
        const MODE_32 = 1 << 2;
        /// 64-bit mode (x86, MIPS, PPC)
        const MODE_64 = 1 << 3;
        /// Thumb / Thumb-2 (ARM)
        const THUMB = 1 << 4;
        /// Nintendo-64 mode (MIPS)
        const N64 = 1 << 5;
        /// Big-endian byte order
        const BIG_ENDIAN = 1 << 31;
    }
}

impl Mode {
    /// Little-endian byte order, the default
    pub const LITTLE_ENDIAN: Mode = Mode::empty();
    /// 32-bit ARM
    pub const ARM: Mode = Mode::empty();
    /// microMIPS; shares its bit with [`Mode::THUMB`]
    pub const MICRO: Mode = Mode::THUMB;

    /// Whether the big-endian bit is set
    pub fn is_big_endian(self) -> bool {
        self.contains(Mode::BIG_ENDIAN)
    }
}

/// Output dialects, for families that have more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum Syntax {
    /// The family's default dialect
    #[default]
    Default = 0,
    /// Intel syntax (x86)
    Intel = 1,
    /// AT&T syntax (x86)
    Att = 2,
    /// Registers printed as bare numbers (PPC)
    NoRegName = 3,
}

/// Decoder output for one instruction, consumed by the render and
/// normalize steps of the same loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedInsn {
    /// Address of the instruction
    pub address: u64,
    /// Encoded length in bytes
    pub size: u16,
    /// Family-internal opcode
    pub opcode: u32,
    /// Public id for textual aliases; overrides the opcode mapping
    pub public_id: Option<u32>,
    /// Printer input: mnemonic part
    pub mnemonic: String,
    /// Printer input: operand part
    pub op_str: String,
    /// Fine-grained detail, computed only when requested
    pub detail: Option<Detail>,
}

/// The capabilities a session needs from one instruction-set family.
pub trait ArchBackend: Send {
    /// Decode one instruction at the head of `code`. `None` means the bytes
    /// are not a valid (or complete) encoding.
    fn decode(&self, code: &[u8], address: u64, detail: bool) -> Option<DecodedInsn>;

    /// Render `insn` as a single "mnemonic<TAB>operands" line into `out`.
    fn render(&self, insn: &DecodedInsn, out: &mut String, memory: &dyn MemoryProvider) {
        let rendered = if insn.op_str.is_empty() {
            memory.format(out, format_args!("{}", insn.mnemonic))
        } else {
            memory.format(out, format_args!("{}\t{}", insn.mnemonic, insn.op_str))
        };
        if rendered.is_err() {
            out.clear();
        }
    }

    /// Map an internal opcode to its public instruction id.
    fn public_id(&self, opcode: u32) -> u32 {
        opcode
    }

    /// Name of register `reg`, if it exists.
    fn reg_name(&self, reg: u32) -> Option<String>;

    /// Name of public instruction `id`, if it exists.
    fn insn_name(&self, id: u32) -> Option<String>;

    /// Fix dialect corner cases after rendering. May rewrite `text`; a
    /// returned value is the byte length of the mnemonic inside `text`.
    fn post_render(&self, _insn: &mut Insn, _text: &mut String) -> Option<usize> {
        None
    }

    /// Offer `insn` for merging into its predecessor. Returns `true` when it
    /// was folded in and must not be appended.
    fn combine(&self, _insn: &mut Insn, _tail: &mut dyn InsnTail) -> bool {
        false
    }

    /// Switch output dialect.
    fn set_syntax(&mut self, _syntax: Syntax) -> Result<(), Error> {
        Err(Error::InvalidOption)
    }
}

/// Register names resolved once at open and owned by the session.
#[derive(Debug, Default, PartialEq)]
pub struct RegisterTable {
    names: Vec<Option<String>>,
}

impl RegisterTable {
    /// Collect the names of registers `0..count` from `backend`.
    pub(crate) fn collect(backend: &dyn ArchBackend, count: u32) -> Self {
        Self {
            names: (0..count).map(|reg| backend.reg_name(reg)).collect(),
        }
    }

    /// Cached name of `reg`
    pub fn get(&self, reg: u32) -> Option<&str> {
        let idx = usize::try_from(reg).ok()?;
        self.names.get(idx)?.as_deref()
    }

    /// Number of register slots
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table has no slots
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Footprint for RegisterTable {
    fn heap_bytes(&self) -> usize {
        let slots = self.names.capacity() * mem::size_of::<Option<String>>();
        let text: usize = self.names.iter().flatten().map(String::capacity).sum();
        slots + text
    }
}

/// What a family initializer hands back to the session.
pub struct Capabilities {
    /// The collaborator driven by the decode loops
    pub backend: Box<dyn ArchBackend>,
    /// Family-private data owned by the session until close
    pub side_table: Option<Payload<RegisterTable>>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("side_table", &self.side_table.as_ref().map(|t| t.len()))
            .finish_non_exhaustive()
    }
}

/// Family initializer: validate `mode`, wire the backend, allocate side tables.
pub type ArchInit = fn(Mode, &Arc<dyn MemoryProvider>) -> Result<Capabilities, Error>;

/// Dispatch table row for `arch`, if the family was compiled in.
pub fn dispatch(arch: Arch) -> Option<ArchInit> {
    match arch {
        #[cfg(feature = "arm")]
        Arch::Arm => Some(arm::init),
        #[cfg(feature = "arm64")]
        Arch::Arm64 => Some(arm64::init),
        #[cfg(feature = "mips")]
        Arch::Mips => Some(mips::init),
        #[cfg(feature = "x86")]
        Arch::X86 => Some(x86::init),
        #[cfg(feature = "ppc")]
        Arch::Ppc => Some(ppc::init),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Whether `arch` was compiled in.
pub fn support(arch: Arch) -> bool {
    dispatch(arch).is_some()
}

/// Whether the raw family id is supported; [`ARCH_ALL`] asks for every family.
pub fn support_raw(raw: u32) -> bool {
    if raw == ARCH_ALL {
        return Arch::all().iter().all(|&arch| support(arch));
    }
    Arch::try_from(raw).map(support).unwrap_or(false)
}
