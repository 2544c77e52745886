//! Decode loops: fixed-capacity and dynamically growing.
//!
//! Both loops walk the input front to back: decode one instruction from the
//! remaining suffix, render it, normalize it into a record and advance by the
//! decoded size. The first undecodable position ends the loop; that is where
//! decoding stops, not an error.

mod buffer;

pub use buffer::{InsnTail, Instructions, CHUNK_SIZE, RECORD_SIZE};

use log::{trace, warn};

use crate::normalize::fill_insn;
use crate::{Error, Insn, Session};

use buffer::InsnBuffer;

/// Initial capacity of the render buffer
const TEXT_CAPACITY: usize = 160;

impl Session {
    /// Decode, render and normalize the instruction at the head of `code`.
    /// `Ok(None)` marks the end of decodable input.
    fn next_insn(&self, code: &[u8], address: u64, text: &mut String) -> Result<Option<Insn>, Error> {
        let Some(raw) = self.backend.decode(code, address, self.detail) else {
            return Ok(None);
        };
        // A zero-length or overlong result would stall or overrun the cursor
        if raw.size == 0 || usize::from(raw.size) > code.len() {
            return Ok(None);
        }

        text.clear();
        self.backend.render(&raw, text, self.memory.as_ref());

        let mut insn = Insn::default();
        fill_insn(self.backend.as_ref(), &self.memory, self.detail, &mut insn, raw, text, code)?;
        trace!("0x{:x}: {}", insn.address, insn);
        Ok(Some(insn))
    }

    /// Decode into the caller's slots.
    ///
    /// Fills at most `out.len()` records and returns how many were produced.
    /// Decoding stops early at the first invalid encoding.
    pub fn disasm(&self, code: &[u8], address: u64, out: &mut [Insn]) -> usize {
        self.clear_error();

        let mut produced = 0;
        let mut offset = 0;
        let mut text = String::with_capacity(TEXT_CAPACITY);

        while offset < code.len() && produced < out.len() {
            let at = address.wrapping_add(offset as u64);
            match self.next_insn(&code[offset..], at, &mut text) {
                Ok(Some(insn)) => {
                    offset += usize::from(insn.size);
                    out[produced] = insn;
                    produced += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    self.set_error(err);
                    break;
                }
            }
        }

        produced
    }

    /// Decode into an engine-grown sequence.
    ///
    /// `count == 0` means no limit. Any allocation refusal aborts the whole
    /// call, releases all partial storage and records
    /// [`Error::OutOfMemory`] on the session.
    pub fn disasm_all(&self, code: &[u8], address: u64, count: usize) -> Result<Instructions, Error> {
        self.clear_error();

        let result = self.sweep(code, address, count);
        if let Err(err) = result.as_ref() {
            warn!("dynamic decode at 0x{:x} aborted: {}", address, err);
            self.set_error(*err);
        }
        result
    }

    fn sweep(&self, code: &[u8], address: u64, count: usize) -> Result<Instructions, Error> {
        let mut buffer = InsnBuffer::new(&self.memory);
        let mut produced = 0;
        let mut offset = 0;
        let mut text = String::with_capacity(TEXT_CAPACITY);

        while offset < code.len() {
            let at = address.wrapping_add(offset as u64);
            let Some(mut insn) = self.next_insn(&code[offset..], at, &mut text)? else {
                break;
            };
            offset += usize::from(insn.size);

            if self.backend.combine(&mut insn, &mut buffer) {
                trace!("0x{:x} folded into its predecessor", at);
            } else {
                buffer.push(insn)?;
                produced += 1;
            }

            if count > 0 && produced == count {
                break;
            }
        }

        debug_assert_eq!(buffer.len(), produced);
        buffer.finish()
    }
}
