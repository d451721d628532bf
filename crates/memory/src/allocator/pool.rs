//! Region-backed allocator
//!
//! Takes one checkpoint on its first allocation and slices everything out
//! of the shared region. `close` rolls the region back to that checkpoint,
//! freeing all spans with a single cursor reset.

use core::fmt;
use core::ptr::NonNull;
use std::rc::Rc;

use super::ScopedAllocator;
use crate::error::{MemoryError, MemoryResult};
use crate::region::{Checkpoint, ReservedRegion};

#[cfg(feature = "logging")]
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    /// No allocation yet, no checkpoint taken
    Fresh,
    Active(Checkpoint),
    Closed,
}

/// Allocator over a shared [`ReservedRegion`].
///
/// Several pool allocators may use the same region one after another (or
/// nested, closing in reverse order), never interleaved out of order.
pub struct PoolAllocator {
    region: Rc<ReservedRegion>,
    state: PoolState,
}

impl PoolAllocator {
    /// Allocator slicing from `region`
    pub fn new(region: Rc<ReservedRegion>) -> Self {
        Self { region, state: PoolState::Fresh }
    }

    /// Region this allocator slices from
    #[inline]
    pub fn region(&self) -> &Rc<ReservedRegion> {
        &self.region
    }

    /// Checkpoint taken by the first allocation, if any
    #[inline]
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        match self.state {
            PoolState::Active(checkpoint) => Some(checkpoint),
            _ => None,
        }
    }
}

impl ScopedAllocator for PoolAllocator {
    fn allocate(&mut self, size: usize, align: usize) -> MemoryResult<NonNull<[u8]>> {
        match self.state {
            PoolState::Closed => Err(MemoryError::invalid_state("pool allocator is closed")),
            PoolState::Active(_) => self.region.slice(size, align),
            PoolState::Fresh => {
                let checkpoint = self.region.checkpoint()?;
                self.state = PoolState::Active(checkpoint);
                self.region.slice(size, align)
            }
        }
    }

    fn close(&mut self) -> MemoryResult<()> {
        match std::mem::replace(&mut self.state, PoolState::Closed) {
            PoolState::Closed => Err(MemoryError::invalid_state("pool allocator already closed")),
            PoolState::Fresh => Ok(()),
            PoolState::Active(checkpoint) => self.region.rollback(checkpoint),
        }
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.state == PoolState::Closed
    }
}

impl fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("state", &self.state)
            .field("region", &self.region.snapshot())
            .finish()
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        if self.state != PoolState::Closed {
            let result = self.close();
            #[cfg(feature = "logging")]
            if let Err(err) = result {
                warn!(error = %err, "pool allocator rollback on drop failed");
            }
            #[cfg(not(feature = "logging"))]
            let _ = result;
        }
    }
}
