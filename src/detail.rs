//! Detail payloads and the introspection queries over them.
//!
//! A record carries a [`Detail`] only when it was produced with detail mode
//! on. The register and group sets are fixed-capacity; the operand list is
//! tagged with the family that produced it and typed by that family's own
//! operand-kind enumeration.

use std::mem;

use crate::memory::Footprint;
use crate::Error;

/// Maximum number of implicitly read registers kept per record
pub const MAX_REGS_READ: usize = 12;
/// Maximum number of implicitly written registers kept per record
pub const MAX_REGS_WRITE: usize = 20;
/// Maximum number of groups kept per record
pub const MAX_GROUPS: usize = 8;
/// Maximum number of operands kept per record
pub const MAX_OPERANDS: usize = 20;

/// A small set of ids with a fixed capacity. Extra ids are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSet<const N: usize> {
    ids: [u32; N],
    len: usize,
}

impl<const N: usize> IdSet<N> {
    /// Collect up to `N` ids
    pub fn collect(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut set = Self { ids: [0; N], len: 0 };
        for id in ids.into_iter().take(N) {
            set.ids[set.len] = id;
            set.len += 1;
        }
        set
    }

    /// The ids in decoder order
    pub fn as_slice(&self) -> &[u32] {
        &self.ids[..self.len]
    }

    /// Linear membership test
    pub fn contains(&self, id: u32) -> bool {
        self.as_slice().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const N: usize> Default for IdSet<N> {
    fn default() -> Self {
        Self { ids: [0; N], len: 0 }
    }
}

/// Value carried by an operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperandValue {
    /// Register id
    Reg(u32),
    /// Immediate
    Imm(i64),
    /// Memory reference
    Mem { base: u32, disp: i64 },
    /// Floating-point immediate
    Fp(f64),
    /// Kinds with no value the engine models
    None,
}

/// One operand, classified by the family's operand-kind enumeration `K`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operand<K> {
    pub kind: K,
    pub value: OperandValue,
}

impl<K> Operand<K> {
    pub fn new(kind: K, value: OperandValue) -> Self {
        Self { kind, value }
    }
}

/// x86 operand kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum X86OpType {
    Invalid = 0,
    Reg = 1,
    Imm = 2,
    Mem = 3,
    Fp = 4,
}

/// ARM operand kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArmOpType {
    Invalid = 0,
    Reg = 1,
    Cimm = 2,
    Pimm = 3,
    Imm = 4,
    Fp = 5,
    Mem = 6,
    Setend = 7,
    SysReg = 8,
}

/// ARM64 operand kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Arm64OpType {
    Invalid = 0,
    Reg = 1,
    Cimm = 2,
    Imm = 3,
    Fp = 4,
    Mem = 5,
    RegMrs = 6,
    RegMsr = 7,
    Pstate = 8,
    Sys = 9,
    Prefetch = 10,
    Barrier = 11,
}

/// MIPS operand kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MipsOpType {
    Invalid = 0,
    Reg = 1,
    Imm = 2,
    Mem = 3,
}

/// PowerPC operand kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PpcOpType {
    Invalid = 0,
    Reg = 1,
    Imm = 2,
    Mem = 3,
    Crx = 4,
}

/// Operand list tagged with the family that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchDetail {
    X86(Vec<Operand<X86OpType>>),
    Arm(Vec<Operand<ArmOpType>>),
    Arm64(Vec<Operand<Arm64OpType>>),
    Mips(Vec<Operand<MipsOpType>>),
    Ppc(Vec<Operand<PpcOpType>>),
}

/// An operand kind of some family, used to query operand lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    X86(X86OpType),
    Arm(ArmOpType),
    Arm64(Arm64OpType),
    Mips(MipsOpType),
    Ppc(PpcOpType),
}

macro_rules! op_type_from {
    ($($kind:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$kind> for OpType {
                fn from(kind: $kind) -> Self {
                    OpType::$variant(kind)
                }
            }
        )*
    };
}

op_type_from! {
    X86OpType => X86,
    ArmOpType => Arm,
    Arm64OpType => Arm64,
    MipsOpType => Mips,
    PpcOpType => Ppc,
}

impl ArchDetail {
    /// Operand count of the list
    pub fn len(&self) -> usize {
        match self {
            ArchDetail::X86(ops) => ops.len(),
            ArchDetail::Arm(ops) => ops.len(),
            ArchDetail::Arm64(ops) => ops.len(),
            ArchDetail::Mips(ops) => ops.len(),
            ArchDetail::Ppc(ops) => ops.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-operand match flags against `kind`, or an error when `kind`
    /// belongs to another family.
    fn matches(&self, kind: OpType) -> Result<Vec<bool>, Error> {
        fn flags<K: PartialEq>(ops: &[Operand<K>], kind: K) -> Vec<bool> {
            ops.iter().map(|op| op.kind == kind).collect()
        }

        match (self, kind) {
            (ArchDetail::X86(ops), OpType::X86(k)) => Ok(flags(ops, k)),
            (ArchDetail::Arm(ops), OpType::Arm(k)) => Ok(flags(ops, k)),
            (ArchDetail::Arm64(ops), OpType::Arm64(k)) => Ok(flags(ops, k)),
            (ArchDetail::Mips(ops), OpType::Mips(k)) => Ok(flags(ops, k)),
            (ArchDetail::Ppc(ops), OpType::Ppc(k)) => Ok(flags(ops, k)),
            _ => Err(Error::UnsupportedQuery),
        }
    }
}

impl Footprint for Detail {
    fn heap_bytes(&self) -> usize {
        #[allow(clippy::ptr_arg)]
        fn bytes<K>(ops: &Vec<Operand<K>>) -> usize {
            ops.capacity() * mem::size_of::<Operand<K>>()
        }

        match &self.arch {
            ArchDetail::X86(ops) => bytes(ops),
            ArchDetail::Arm(ops) => bytes(ops),
            ArchDetail::Arm64(ops) => bytes(ops),
            ArchDetail::Mips(ops) => bytes(ops),
            ArchDetail::Ppc(ops) => bytes(ops),
        }
    }
}

/// Fine-grained information about one instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    regs_read: IdSet<MAX_REGS_READ>,
    regs_write: IdSet<MAX_REGS_WRITE>,
    groups: IdSet<MAX_GROUPS>,
    arch: ArchDetail,
}

impl Detail {
    /// Build a payload, truncating every set to its capacity.
    pub fn new(
        regs_read: impl IntoIterator<Item = u32>,
        regs_write: impl IntoIterator<Item = u32>,
        groups: impl IntoIterator<Item = u32>,
        arch: ArchDetail,
    ) -> Self {
        Self {
            regs_read: IdSet::collect(regs_read),
            regs_write: IdSet::collect(regs_write),
            groups: IdSet::collect(groups),
            arch,
        }
    }

    pub fn regs_read(&self) -> &[u32] {
        self.regs_read.as_slice()
    }

    pub fn regs_write(&self) -> &[u32] {
        self.regs_write.as_slice()
    }

    pub fn groups(&self) -> &[u32] {
        self.groups.as_slice()
    }

    /// Family-tagged operand list
    pub fn arch(&self) -> &ArchDetail {
        &self.arch
    }

    pub fn in_group(&self, group: u32) -> bool {
        self.groups.contains(group)
    }

    pub fn reads_reg(&self, reg: u32) -> bool {
        self.regs_read.contains(reg)
    }

    pub fn writes_reg(&self, reg: u32) -> bool {
        self.regs_write.contains(reg)
    }

    /// Number of operands of `kind`.
    pub fn op_count(&self, kind: impl Into<OpType>) -> Result<usize, Error> {
        let matches = self.arch.matches(kind.into())?;
        Ok(matches.into_iter().filter(|&hit| hit).count())
    }

    /// Position of the `post`-th (1-based) operand of `kind`.
    pub fn op_index(&self, kind: impl Into<OpType>, post: usize) -> Result<Option<usize>, Error> {
        let matches = self.arch.matches(kind.into())?;
        if post == 0 {
            return Ok(None);
        }
        Ok(matches
            .into_iter()
            .enumerate()
            .filter(|&(_, hit)| hit)
            .nth(post - 1)
            .map(|(idx, _)| idx))
    }
}
