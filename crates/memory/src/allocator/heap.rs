//! Heap-backed allocator with batch release
//!
//! Every pointer handed out is recorded in a log together with the
//! primitive that produced it. `close` frees the whole log with a single
//! [`RawMemory::batch_release`] call.

use core::fmt;
use core::ptr::NonNull;

use vmarena_system::{LibcMemory, MAX_NATURAL_ALIGN, RawAllocation, RawMemory, SystemError};

use super::ScopedAllocator;
use crate::config::HeapConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::utils::check_alignment;

#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// Allocator over the C heap that frees everything in one batch.
///
/// Alignments up to [`MAX_NATURAL_ALIGN`] use plain `malloc`; larger ones
/// use the aligned primitive and are tagged as such in the log.
///
/// # Examples
///
/// ```
/// use vmarena_memory::allocator::{HeapAllocator, ScopedAllocator};
///
/// # fn main() -> vmarena_memory::MemoryResult<()> {
/// let mut heap = HeapAllocator::new();
/// let _small = heap.allocate(16, 8)?;
/// let _wide = heap.allocate(64, 64)?;
/// assert_eq!(heap.len(), 2);
/// heap.close()?;
/// # Ok(())
/// # }
/// ```
pub struct HeapAllocator {
    raw: &'static dyn RawMemory,
    log: Vec<RawAllocation>,
    closed: bool,
}

impl HeapAllocator {
    /// Allocator over the process C heap
    pub fn new() -> Self {
        Self::from_validated(LibcMemory::global(), &HeapConfig::default())
    }

    /// Allocator over the process C heap with custom tuning
    pub fn with_config(config: HeapConfig) -> MemoryResult<Self> {
        Self::with_raw(LibcMemory::global(), config)
    }

    /// Allocator over an explicit raw memory backend
    pub fn with_raw(raw: &'static dyn RawMemory, config: HeapConfig) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(raw, &config))
    }

    pub(super) fn from_validated(raw: &'static dyn RawMemory, config: &HeapConfig) -> Self {
        Self { raw, log: Vec::with_capacity(config.log_capacity), closed: false }
    }

    /// Number of live allocations
    #[inline]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    /// Whether nothing has been allocated since creation
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Logged allocations in allocation order
    #[inline]
    pub fn entries(&self) -> &[RawAllocation] {
        &self.log
    }

    fn ensure_log_capacity(&mut self) {
        if self.log.len() == self.log.capacity() {
            let grow = self.log.len().max(1);
            self.log.reserve_exact(grow);
        }
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopedAllocator for HeapAllocator {
    fn allocate(&mut self, size: usize, align: usize) -> MemoryResult<NonNull<[u8]>> {
        check_alignment(align)?;
        if self.closed {
            return Err(MemoryError::invalid_state("heap allocator is closed"));
        }
        self.ensure_log_capacity();

        let entry = if align <= MAX_NATURAL_ALIGN {
            self.raw.allocate(size).map(RawAllocation::plain)
        } else {
            self.raw.aligned_allocate(size, align).map(RawAllocation::aligned)
        }
        .map_err(|err| match err {
            SystemError::AllocationFailed { .. } => MemoryError::allocation_failed(size, align),
            other => MemoryError::from(other),
        })?;

        #[cfg(feature = "logging")]
        trace!(size, align, kind = ?entry.kind, "heap allocation");

        self.log.push(entry);
        Ok(NonNull::slice_from_raw_parts(entry.addr, size))
    }

    fn close(&mut self) -> MemoryResult<()> {
        if self.closed {
            return Err(MemoryError::invalid_state("heap allocator already closed"));
        }
        self.closed = true;
        let log = std::mem::take(&mut self.log);
        if !log.is_empty() {
            // SAFETY: every entry came from `self.raw`, is logged once, and
            // the log is dropped right after so nothing frees it again.
            unsafe { self.raw.batch_release(&log) };
        }
        Ok(())
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for HeapAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapAllocator")
            .field("len", &self.log.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for HeapAllocator {
    fn drop(&mut self) {
        if !self.closed {
            #[cfg(feature = "logging")]
            if !self.log.is_empty() {
                warn!(allocations = self.log.len(), "heap allocator dropped without close, releasing");
            }
            let _ = self.close();
        }
    }
}
