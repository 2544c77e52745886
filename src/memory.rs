//! Pluggable memory providers and the process-wide registry.
//!
//! Every allocation the engine makes on behalf of a caller (the session
//! itself, architecture side tables, the growing output region and per-record
//! detail payloads) is requested from a [`MemoryProvider`] first. Providers
//! can account for those requests or refuse them; a refusal surfaces as
//! [`Error::OutOfMemory`].
//!
//! The registry must be configured before sessions are opened and must not be
//! swapped while sessions are live. Sessions capture the provider at open
//! time, so a later swap only affects sessions opened afterwards.

use std::fmt::{self, Write};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::Error;

/// The five memory primitives an engine consumer can plug in.
pub trait MemoryProvider: Send + Sync + fmt::Debug {
    /// Request a new block of `size` bytes.
    fn allocate(&self, size: usize) -> Result<(), Error>;

    /// Request a zero-filled block of `count * size` bytes.
    fn allocate_zeroed(&self, count: usize, size: usize) -> Result<(), Error> {
        let total = count.checked_mul(size).ok_or(Error::OutOfMemory)?;
        self.allocate(total)
    }

    /// Grow or shrink a block. `old_size == 0` behaves like a fresh allocation.
    fn reallocate(&self, old_size: usize, new_size: usize) -> Result<(), Error>;

    /// Return a block of `size` bytes.
    fn release(&self, size: usize);

    /// Formatted write into a text buffer, used by the instruction printers.
    fn format(&self, out: &mut String, args: fmt::Arguments<'_>) -> fmt::Result {
        out.write_fmt(args)
    }
}

/// Provider backed by the platform allocator. Never refuses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryProvider for SystemMemory {
    fn allocate(&self, _size: usize) -> Result<(), Error> {
        Ok(())
    }

    fn reallocate(&self, _old_size: usize, _new_size: usize) -> Result<(), Error> {
        Ok(())
    }

    fn release(&self, _size: usize) {}
}

/// Provider that keeps live block/byte counters and can enforce a byte limit.
#[derive(Debug, Default)]
pub struct TrackingMemory {
    limit: Option<usize>,
    live_bytes: AtomicUsize,
    live_blocks: AtomicUsize,
    calls: AtomicUsize,
}

impl TrackingMemory {
    /// Unlimited tracking provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracking provider that refuses to hold more than `limit` bytes at once
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Bytes currently granted and not yet released
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }

    /// Blocks currently granted and not yet released
    pub fn live_blocks(&self) -> usize {
        self.live_blocks.load(Ordering::SeqCst)
    }

    /// Total number of primitive calls seen
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True when every granted block has been released
    pub fn is_balanced(&self) -> bool {
        self.live_bytes() == 0 && self.live_blocks() == 0
    }

    fn admit(&self, extra: usize) -> Result<(), Error> {
        match self.limit {
            Some(limit) if self.live_bytes().saturating_add(extra) > limit => Err(Error::OutOfMemory),
            _ => Ok(()),
        }
    }
}

impl MemoryProvider for TrackingMemory {
    fn allocate(&self, size: usize) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.admit(size)?;
        self.live_bytes.fetch_add(size, Ordering::SeqCst);
        self.live_blocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reallocate(&self, old_size: usize, new_size: usize) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if new_size > old_size {
            self.admit(new_size - old_size)?;
            self.live_bytes.fetch_add(new_size - old_size, Ordering::SeqCst);
        } else {
            self.live_bytes.fetch_sub(old_size - new_size, Ordering::SeqCst);
        }
        if old_size == 0 {
            self.live_blocks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn release(&self, size: usize) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.live_bytes.fetch_sub(size, Ordering::SeqCst);
        self.live_blocks.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A slot holding the currently installed provider.
#[derive(Debug)]
pub struct MemoryRegistry {
    slot: RwLock<Option<Arc<dyn MemoryProvider>>>,
}

impl MemoryRegistry {
    /// Registry with nothing installed
    pub const fn empty() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Install `provider`, replacing any previous one.
    pub fn install(&self, provider: Arc<dyn MemoryProvider>) {
        let mut slot = match self.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(provider);
    }

    /// The installed provider.
    pub fn current(&self) -> Result<Arc<dyn MemoryProvider>, Error> {
        let slot = match self.slot.read() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.clone().ok_or(Error::MemoryNotConfigured)
    }

    /// Whether a provider has been installed
    pub fn is_configured(&self) -> bool {
        self.current().is_ok()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

static REGISTRY: MemoryRegistry = MemoryRegistry::empty();

/// The process-wide registry consulted by [`crate::Session::open`].
pub fn registry() -> &'static MemoryRegistry {
    &REGISTRY
}

/// Provider for a session opened through the global registry, honouring the
/// `system-memory` build-time fallback.
pub(crate) fn configured() -> Result<Arc<dyn MemoryProvider>, Error> {
    match REGISTRY.current() {
        Ok(provider) => Ok(provider),
        Err(_) if cfg!(feature = "system-memory") => Ok(Arc::new(SystemMemory)),
        Err(err) => Err(err),
    }
}

/// A block granted by a provider, released when dropped.
#[derive(Debug)]
pub struct Grant {
    memory: Arc<dyn MemoryProvider>,
    size: usize,
    held: bool,
}

impl Grant {
    /// Empty grant; the first [`Grant::resize`] acts as an allocation.
    pub(crate) fn empty(memory: &Arc<dyn MemoryProvider>) -> Self {
        Self {
            memory: Arc::clone(memory),
            size: 0,
            held: false,
        }
    }

    pub(crate) fn allocate(memory: &Arc<dyn MemoryProvider>, size: usize) -> Result<Self, Error> {
        memory.allocate(size)?;
        Ok(Self {
            memory: Arc::clone(memory),
            size,
            held: true,
        })
    }

    pub(crate) fn zeroed(memory: &Arc<dyn MemoryProvider>, count: usize, size: usize) -> Result<Self, Error> {
        memory.allocate_zeroed(count, size)?;
        Ok(Self {
            memory: Arc::clone(memory),
            size: count * size,
            held: true,
        })
    }

    /// Resize through the provider; on refusal the grant keeps its old size.
    pub(crate) fn resize(&mut self, new_size: usize) -> Result<(), Error> {
        self.memory.reallocate(self.size, new_size)?;
        self.size = new_size;
        self.held = true;
        Ok(())
    }

    /// Granted size in bytes
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Grant {
    fn drop(&mut self) {
        if self.held {
            self.memory.release(self.size);
        }
    }
}

/// Storage a value owns behind pointers, on top of its inline size.
pub trait Footprint {
    fn heap_bytes(&self) -> usize;
}

impl<T: Copy, const N: usize> Footprint for [T; N] {
    fn heap_bytes(&self) -> usize {
        0
    }
}

/// A boxed value whose storage was granted by a provider.
#[derive(Debug)]
pub struct Payload<T> {
    value: Box<T>,
    _grant: Grant,
}

impl<T: Footprint> Payload<T> {
    /// Box `value`, accounting its inline size plus everything it owns.
    pub(crate) fn new(memory: &Arc<dyn MemoryProvider>, value: T) -> Result<Self, Error> {
        let grant = Grant::allocate(memory, std::mem::size_of::<T>() + value.heap_bytes())?;
        Ok(Self {
            value: Box::new(value),
            _grant: grant,
        })
    }
}

impl<T> Deref for Payload<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Payload<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: PartialEq> PartialEq for Payload<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
