//! Chunked output buffer for the dynamic decode loop.
//!
//! Records are staged in a fixed-size chunk. A full chunk is flushed into the
//! region, which grows by exactly one chunk of records per flush; the final
//! partial chunk is flushed with its exact length. Every growth step goes
//! through the session's memory provider.

use std::mem;
use std::ops::Deref;
use std::sync::Arc;

use log::trace;

use crate::memory::{Grant, MemoryProvider};
use crate::{Error, Insn};

/// Number of records staged before a flush
pub const CHUNK_SIZE: usize = 64;

/// Size of one record in the region, as accounted to the memory provider
pub const RECORD_SIZE: usize = mem::size_of::<Insn>();

/// "The sequence built so far", as seen by a combiner.
///
/// Implementations hide where the previous record lives; combiners only ever
/// see the last record.
pub trait InsnTail {
    /// The most recent record, if any
    fn last(&self) -> Option<&Insn>;

    /// The most recent record, for in-place merging
    fn last_mut(&mut self) -> Option<&mut Insn>;
}

impl InsnTail for Vec<Insn> {
    fn last(&self) -> Option<&Insn> {
        self.as_slice().last()
    }

    fn last_mut(&mut self) -> Option<&mut Insn> {
        self.as_mut_slice().last_mut()
    }
}

/// Staging chunk plus the heap region it flushes into.
#[derive(Debug)]
pub(crate) struct InsnBuffer {
    // Field order matters: records (and their detail payloads) are released
    // before the region grant.
    staging: Vec<Insn>,
    region: Vec<Insn>,
    grant: Grant,
}

impl InsnBuffer {
    pub(crate) fn new(memory: &Arc<dyn MemoryProvider>) -> Self {
        Self {
            staging: Vec::with_capacity(CHUNK_SIZE),
            region: Vec::new(),
            grant: Grant::empty(memory),
        }
    }

    /// Records produced so far
    pub(crate) fn len(&self) -> usize {
        self.region.len() + self.staging.len()
    }

    /// Append a record, flushing the staging chunk when it fills up.
    pub(crate) fn push(&mut self, insn: Insn) -> Result<(), Error> {
        self.staging.push(insn);
        if self.staging.len() == CHUNK_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Move every staged record into the region, growing it by exactly the
    /// staged count.
    fn flush(&mut self) -> Result<(), Error> {
        let staged = self.staging.len();
        if staged == 0 {
            return Ok(());
        }

        let new_size = self.grant.size() + staged * RECORD_SIZE;
        self.grant.resize(new_size)?;
        self.region.try_reserve_exact(staged).map_err(|_| Error::OutOfMemory)?;
        self.region.append(&mut self.staging);

        trace!("flushed {} records, region now {} records", staged, self.region.len());
        Ok(())
    }

    /// Flush the partial chunk and hand the region over.
    pub(crate) fn finish(mut self) -> Result<Instructions, Error> {
        self.flush()?;
        Ok(Instructions {
            insns: mem::take(&mut self.region),
            grant: self.grant,
        })
    }
}

impl InsnTail for InsnBuffer {
    fn last(&self) -> Option<&Insn> {
        self.staging.last().or_else(|| self.region.last())
    }

    fn last_mut(&mut self) -> Option<&mut Insn> {
        match self.staging.last_mut() {
            Some(insn) => Some(insn),
            None => self.region.last_mut(),
        }
    }
}

/// Engine-produced records, owned by the caller.
///
/// Dropping the value (or passing it to [`crate::free`]) releases every
/// record's detail payload and then the region itself.
#[derive(Debug)]
pub struct Instructions {
    insns: Vec<Insn>,
    grant: Grant,
}

impl Instructions {
    /// Bytes of region storage accounted to the memory provider
    pub fn allocated_bytes(&self) -> usize {
        self.grant.size()
    }

    /// Release the records explicitly.
    pub fn free(self) {
        drop(self);
    }
}

impl Deref for Instructions {
    type Target = [Insn];

    fn deref(&self) -> &[Insn] {
        &self.insns
    }
}

impl<'a> IntoIterator for &'a Instructions {
    type Item = &'a Insn;
    type IntoIter = std::slice::Iter<'a, Insn>;

    fn into_iter(self) -> Self::IntoIter {
        self.insns.iter()
    }
}
