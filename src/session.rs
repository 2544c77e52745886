//! Decoding sessions: open, configure, query, close.

use std::cell::Cell;
use std::fmt;
use std::mem;
use std::sync::Arc;

use log::debug;

use crate::arch::{self, Arch, ArchBackend, Capabilities, Mode, RegisterTable, Syntax};
use crate::detail::OpType;
use crate::memory::{self, Grant, MemoryProvider, MemoryRegistry, Payload};
use crate::{Error, Insn};

/// Runtime options accepted by [`Session::set_option`] and [`crate::option`].
#[derive(Clone)]
pub enum Opt {
    /// Install a process-wide memory provider. Accepted without a session.
    Memory(Arc<dyn MemoryProvider>),
    /// Compute detail payloads for decoded records
    Detail(bool),
    /// Switch the printer dialect
    Syntax(Syntax),
}

impl fmt::Debug for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opt::Memory(provider) => f.debug_tuple("Memory").field(provider).finish(),
            Opt::Detail(on) => f.debug_tuple("Detail").field(on).finish(),
            Opt::Syntax(syntax) => f.debug_tuple("Syntax").field(syntax).finish(),
        }
    }
}

/// One configured decoder.
///
/// A session owns its family collaborator and side table, and remembers the
/// memory provider it was opened with. It keeps no state between decode
/// calls apart from the last error code. Sessions can be moved to another
/// thread but not shared.
pub struct Session {
    arch: Arch,
    mode: Mode,
    big_endian: bool,
    pub(crate) detail: bool,
    syntax: Syntax,
    pub(crate) backend: Box<dyn ArchBackend>,
    // Released before the session allocation below
    side_table: Option<Payload<RegisterTable>>,
    errnum: Cell<Option<Error>>,
    pub(crate) memory: Arc<dyn MemoryProvider>,
    _grant: Grant,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("arch", &self.arch)
            .field("mode", &self.mode)
            .field("detail", &self.detail)
            .field("syntax", &self.syntax)
            .field("errnum", &self.errnum.get())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open a session using the process-wide memory provider.
    pub fn open(arch: Arch, mode: Mode) -> Result<Self, Error> {
        let memory = memory::configured()?;
        Self::open_with(arch, mode, memory)
    }

    /// Open a session using the provider installed in `registry`.
    pub fn open_in(registry: &MemoryRegistry, arch: Arch, mode: Mode) -> Result<Self, Error> {
        let memory = registry.current()?;
        Self::open_with(arch, mode, memory)
    }

    /// Open a session that allocates through `memory`.
    pub fn open_with(arch: Arch, mode: Mode, memory: Arc<dyn MemoryProvider>) -> Result<Self, Error> {
        let init = arch::dispatch(arch).ok_or(Error::UnsupportedArch)?;
        Self::assemble(arch, mode, memory, |memory| init(mode, memory))
    }

    /// Open from raw family and mode numbers.
    pub fn open_raw(arch: u32, mode: u32) -> Result<Self, Error> {
        let arch = Arch::try_from(arch)?;
        let mode = Mode::from_bits(mode).ok_or(Error::InvalidMode)?;
        Self::open(arch, mode)
    }

    /// Allocate the session, then let `init` wire the family. Nothing leaks
    /// when `init` fails.
    pub(crate) fn assemble(
        arch: Arch,
        mode: Mode,
        memory: Arc<dyn MemoryProvider>,
        init: impl FnOnce(&Arc<dyn MemoryProvider>) -> Result<Capabilities, Error>,
    ) -> Result<Self, Error> {
        let grant = Grant::zeroed(&memory, 1, mem::size_of::<Session>())?;
        let Capabilities { backend, side_table } = init(&memory)?;

        debug!("opened {} session, mode {:?}", arch, mode);
        Ok(Self {
            arch,
            mode,
            big_endian: mode.is_big_endian(),
            detail: false,
            syntax: Syntax::Default,
            backend,
            side_table,
            errnum: Cell::new(None),
            memory,
            _grant: grant,
        })
    }

    /// Apply a runtime option. Failures are also recorded as the last error.
    pub fn set_option(&mut self, opt: Opt) -> Result<(), Error> {
        debug!("{} session option {:?}", self.arch, opt);
        let result = match opt {
            Opt::Memory(provider) => {
                memory::registry().install(provider);
                Ok(())
            }
            Opt::Detail(on) => {
                self.detail = on;
                Ok(())
            }
            Opt::Syntax(syntax) => match self.backend.set_syntax(syntax) {
                Ok(()) => {
                    self.syntax = syntax;
                    Ok(())
                }
                Err(err) => Err(err),
            },
        };

        if let Err(err) = result {
            self.set_error(err);
        }
        result
    }

    /// Release the side table, then the session itself.
    pub fn close(mut self) {
        debug!("closing {} session", self.arch);
        drop(self.side_table.take());
    }

    /// Code of the last failed operation on this session
    pub fn last_error(&self) -> Option<Error> {
        self.errnum.get()
    }

    pub(crate) fn set_error(&self, err: Error) {
        self.errnum.set(Some(err));
    }

    pub(crate) fn clear_error(&self) {
        self.errnum.set(None);
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn detail(&self) -> bool {
        self.detail
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// Register table built at open, for families that keep one
    pub fn register_table(&self) -> Option<&RegisterTable> {
        self.side_table.as_deref()
    }

    /// Name of register `reg`.
    pub fn reg_name(&self, reg: u32) -> Option<String> {
        if let Some(name) = self.register_table().and_then(|table| table.get(reg)) {
            return Some(name.to_owned());
        }
        self.backend.reg_name(reg)
    }

    /// Name of public instruction id `id`.
    pub fn insn_name(&self, id: u32) -> Option<String> {
        self.backend.insn_name(id)
    }

    fn check<T>(&self, insn: &Insn, query: impl FnOnce(&Insn) -> Result<T, Error>) -> Result<T, Error> {
        let result = if self.detail {
            query(insn)
        } else {
            Err(Error::DetailUnavailable)
        };
        match result.as_ref() {
            Ok(_) => self.clear_error(),
            Err(err) => self.set_error(*err),
        }
        result
    }

    /// Whether `insn` belongs to `group`; `false` on error.
    pub fn insn_group(&self, insn: &Insn, group: u32) -> bool {
        self.check(insn, |insn| insn.in_group(group)).unwrap_or(false)
    }

    /// Whether `insn` implicitly reads `reg`; `false` on error.
    pub fn reg_read(&self, insn: &Insn, reg: u32) -> bool {
        self.check(insn, |insn| insn.reads_reg(reg)).unwrap_or(false)
    }

    /// Whether `insn` implicitly writes `reg`; `false` on error.
    pub fn reg_write(&self, insn: &Insn, reg: u32) -> bool {
        self.check(insn, |insn| insn.writes_reg(reg)).unwrap_or(false)
    }

    /// Number of operands of `kind`; `-1` on error.
    pub fn op_count(&self, insn: &Insn, kind: impl Into<OpType>) -> i32 {
        let kind = kind.into();
        self.check(insn, |insn| insn.op_count(kind))
            .map_or(-1, |count| i32::try_from(count).unwrap_or(i32::MAX))
    }

    /// Position of the `post`-th operand of `kind`; `-1` if there is none or
    /// on error.
    pub fn op_index(&self, insn: &Insn, kind: impl Into<OpType>, post: usize) -> i32 {
        let kind = kind.into();
        match self.check(insn, |insn| insn.op_index(kind, post)) {
            Ok(Some(idx)) => i32::try_from(idx).unwrap_or(-1),
            Ok(None) | Err(_) => -1,
        }
    }
}
