//! Architecture-agnostic disassembly engine core.
//!
//! The engine turns a byte buffer into a sequence of [`Insn`] records for a
//! chosen instruction-set family and mode. Per-family decoding, printing and
//! naming come from capstone; this crate owns the session lifecycle, the
//! decode loops, the growable output buffer, record normalization and the
//! pluggable memory accounting every engine allocation goes through.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use decay_engine::{Arch, Mode, Opt, Session};
//!
//! let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
//! session.set_option(Opt::Detail(true)).unwrap();
//!
//! let code = [0x55, 0x48, 0x8b, 0x05, 0xb8, 0x13, 0x00, 0x00];
//! let insns = session.disasm_all(&code, 0x1000, 0).unwrap();
//! for insn in &insns {
//!     println!("0x{:x}:\t{}", insn.address, insn);
//! }
//!
//! decay_engine::free(insns);
//! session.close();
//! ```

pub mod arch;
pub mod config;
pub mod decoder;
pub mod detail;
pub mod disasm;
pub mod error;
pub mod format;
pub mod insn;
pub mod memory;
pub mod normalize;
pub mod session;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod testing;

pub use arch::{support, support_raw, Arch, Mode, Syntax, ARCH_ALL};
pub use config::{ConfigError, SessionConfig};
pub use detail::{Detail, OpType};
pub use disasm::{Instructions, CHUNK_SIZE};
pub use error::{strerror, Error};
pub use insn::Insn;
pub use memory::{registry, MemoryProvider, MemoryRegistry, SystemMemory, TrackingMemory};
pub use session::{Opt, Session};

/// Major API version
pub const API_MAJOR: u32 = 2;
/// Minor API version
pub const API_MINOR: u32 = 1;

/// API version as (major, minor)
pub fn version() -> (u32, u32) {
    (API_MAJOR, API_MINOR)
}

/// API version packed as `(major << 8) | minor`
pub fn version_packed() -> u32 {
    (API_MAJOR << 8) | API_MINOR
}

/// Open a session through the process-wide memory provider.
pub fn open(arch: Arch, mode: Mode) -> Result<Session, Error> {
    Session::open(arch, mode)
}

/// Close the session held in `handle`, leaving `None` behind.
///
/// Closing an empty handle fails with [`Error::InvalidHandle`].
pub fn close(handle: &mut Option<Session>) -> Result<(), Error> {
    let session = handle.take().ok_or(Error::InvalidHandle)?;
    session.close();
    Ok(())
}

/// Apply `opt` to `session`. [`Opt::Memory`] is the only option accepted
/// without a session.
pub fn option(session: Option<&mut Session>, opt: Opt) -> Result<(), Error> {
    match (session, opt) {
        (Some(session), opt) => session.set_option(opt),
        (None, Opt::Memory(provider)) => {
            registry().install(provider);
            Ok(())
        }
        (None, _) => Err(Error::InvalidHandle),
    }
}

/// Last error recorded on `session`; no session reports [`Error::InvalidHandle`].
pub fn errno(session: Option<&Session>) -> Option<Error> {
    match session {
        Some(session) => session.last_error(),
        None => Some(Error::InvalidHandle),
    }
}

/// Release engine-produced records.
pub fn free(insns: Instructions) {
    insns.free();
}
