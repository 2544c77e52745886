//! Capstone-based instruction decoders shared by every family backend.

use std::fmt;
use std::sync::Arc;

use capstone::arch::ArchOperand;
use capstone::{Capstone, Endian, InsnId, RegId, NO_EXTRA_MODE};
use log::debug;

use crate::arch::{ArchBackend, DecodedInsn, RegisterTable, Syntax};
use crate::detail::{ArchDetail, Detail};
use crate::memory::{MemoryProvider, Payload};
use crate::Error;

/// Converts capstone's operand list into the family's typed operand list.
pub(crate) type OperandMapper = fn(Vec<ArchOperand>) -> ArchDetail;

/// One capstone handle configured for a family and mode.
pub struct CapstoneDecoder {
    cs: Capstone,
    operands: OperandMapper,
}

// SAFETY: the capstone handle is owned by exactly one session and is never
// shared; sessions are not `Sync`, so no two threads drive it at once.
unsafe impl Send for CapstoneDecoder {}

impl fmt::Debug for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapstoneDecoder").finish_non_exhaustive()
    }
}

impl CapstoneDecoder {
    /// Build a decoder for a raw capstone configuration, with detail
    /// computation enabled so the normalizer can request it per call.
    pub(crate) fn build(
        arch: capstone::Arch,
        mode: capstone::Mode,
        big_endian: bool,
        operands: OperandMapper,
    ) -> Result<Self, Error> {
        let endian = if big_endian { Endian::Big } else { Endian::Little };
        let mut cs = Capstone::new_raw(arch, mode, NO_EXTRA_MODE, Some(endian)).map_err(|err| {
            debug!("capstone rejected {:?}/{:?}: {}", arch, mode, err);
            Error::InvalidMode
        })?;
        cs.set_detail(true).map_err(|err| {
            debug!("capstone refused detail mode: {}", err);
            Error::InvalidMode
        })?;

        Ok(Self { cs, operands })
    }

    /// Decode exactly one instruction at the head of `code`.
    pub(crate) fn decode_one(&self, code: &[u8], address: u64, detail: bool) -> Option<DecodedInsn> {
        let insns = self.cs.disasm_count(code, address, 1).ok()?;
        let insn = insns.iter().next()?;

        let size = u16::try_from(insn.bytes().len()).ok()?;
        let detail = if detail {
            self.cs.insn_detail(insn).ok().map(|d| {
                Detail::new(
                    d.regs_read().iter().map(|r| u32::from(r.0)),
                    d.regs_write().iter().map(|r| u32::from(r.0)),
                    d.groups().iter().map(|g| u32::from(g.0)),
                    (self.operands)(d.arch_detail().operands()),
                )
            })
        } else {
            None
        };

        Some(DecodedInsn {
            address,
            size,
            opcode: insn.id().0,
            public_id: None,
            mnemonic: insn.mnemonic().unwrap_or("").to_string(),
            op_str: insn.op_str().unwrap_or("").to_string(),
            detail,
        })
    }

    /// Switch capstone's printer dialect.
    pub(crate) fn set_syntax(&mut self, syntax: capstone::Syntax) -> Result<(), Error> {
        self.cs.set_syntax(syntax).map_err(|_| Error::InvalidOption)
    }

    pub(crate) fn reg_name(&self, reg: u32) -> Option<String> {
        let reg = u16::try_from(reg).ok()?;
        self.cs.reg_name(RegId(reg))
    }

    pub(crate) fn insn_name(&self, id: u32) -> Option<String> {
        self.cs.insn_name(InsnId(id))
    }
}

/// Backend for families whose only family-specific traits are how operands
/// are classified and which dialects the printer accepts.
macro_rules! capstone_backend {
    ($name:ident, syntax: [$($syntax:ident),* $(,)?]) => {
        /// Capstone-backed collaborator for this family.
        #[derive(Debug)]
        pub struct $name {
            decoder: $crate::decoder::CapstoneDecoder,
        }

        impl $crate::arch::ArchBackend for $name {
            fn decode(&self, code: &[u8], address: u64, detail: bool) -> Option<$crate::arch::DecodedInsn> {
                self.decoder.decode_one(code, address, detail)
            }

            fn reg_name(&self, reg: u32) -> Option<String> {
                self.decoder.reg_name(reg)
            }

            fn insn_name(&self, id: u32) -> Option<String> {
                self.decoder.insn_name(id)
            }

            fn set_syntax(&mut self, syntax: $crate::arch::Syntax) -> Result<(), $crate::Error> {
                let accepted: &[$crate::arch::Syntax] = &[$($crate::arch::Syntax::$syntax),*];
                if !accepted.contains(&syntax) {
                    return Err($crate::Error::InvalidOption);
                }
                self.decoder.set_syntax($crate::decoder::capstone_syntax(syntax))
            }
        }
    };
}

pub(crate) use capstone_backend;

/// Number of register ids scanned when building a family's register table.
pub(crate) const REGISTER_TABLE_LEN: u32 = 512;

/// Build the register-name side table for `backend`, accounted to `memory`.
pub(crate) fn register_table(
    backend: &dyn ArchBackend,
    memory: &Arc<dyn MemoryProvider>,
) -> Result<Payload<RegisterTable>, Error> {
    Payload::new(memory, RegisterTable::collect(backend, REGISTER_TABLE_LEN))
}

/// Map the engine's dialect onto capstone's.
pub(crate) fn capstone_syntax(syntax: Syntax) -> capstone::Syntax {
    match syntax {
        Syntax::Default | Syntax::Intel => capstone::Syntax::Intel,
        Syntax::Att => capstone::Syntax::Att,
        Syntax::NoRegName => capstone::Syntax::NoRegName,
    }
}
