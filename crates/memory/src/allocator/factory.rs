//! Strategy selection
//!
//! [`AllocatorFactory`] returns a [`PoolAllocator`] when a region is
//! available and a [`HeapAllocator`] otherwise, wrapped in the closed set
//! [`AnyAllocator`].

use core::ptr::NonNull;
use std::rc::Rc;

use vmarena_system::{LibcMemory, RawMemory};

use super::{HeapAllocator, PoolAllocator, ScopedAllocator};
use crate::config::HeapConfig;
use crate::error::MemoryResult;
use crate::region::ReservedRegion;
use crate::scope::RegionScope;

/// One of the two allocation strategies
#[derive(Debug)]
pub enum AnyAllocator {
    /// C heap with batch release
    Heap(HeapAllocator),
    /// Checkpointed slices of a region
    Pool(PoolAllocator),
}

impl AnyAllocator {
    /// Whether this is the heap strategy
    #[inline]
    pub fn is_heap(&self) -> bool {
        matches!(self, Self::Heap(_))
    }

    /// Whether this is the pool strategy
    #[inline]
    pub fn is_pool(&self) -> bool {
        matches!(self, Self::Pool(_))
    }
}

impl ScopedAllocator for AnyAllocator {
    #[inline]
    fn allocate(&mut self, size: usize, align: usize) -> MemoryResult<NonNull<[u8]>> {
        match self {
            Self::Heap(heap) => heap.allocate(size, align),
            Self::Pool(pool) => pool.allocate(size, align),
        }
    }

    #[inline]
    fn close(&mut self) -> MemoryResult<()> {
        match self {
            Self::Heap(heap) => heap.close(),
            Self::Pool(pool) => pool.close(),
        }
    }

    #[inline]
    fn is_closed(&self) -> bool {
        match self {
            Self::Heap(heap) => heap.is_closed(),
            Self::Pool(pool) => pool.is_closed(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Heap(heap) => heap.type_name(),
            Self::Pool(pool) => pool.type_name(),
        }
    }
}

impl From<HeapAllocator> for AnyAllocator {
    fn from(heap: HeapAllocator) -> Self {
        Self::Heap(heap)
    }
}

impl From<PoolAllocator> for AnyAllocator {
    fn from(pool: PoolAllocator) -> Self {
        Self::Pool(pool)
    }
}

/// Creates allocators for the current context.
///
/// # Examples
///
/// ```no_run
/// use std::rc::Rc;
/// use vmarena_memory::allocator::{AllocatorFactory, ScopedAllocator};
/// use vmarena_memory::region::ReservedRegion;
/// use vmarena_memory::scope::RegionScope;
///
/// # fn main() -> vmarena_memory::MemoryResult<()> {
/// let factory = AllocatorFactory::new();
/// assert!(factory.new_instance().is_heap());
///
/// let region = Rc::new(ReservedRegion::new(1 << 20)?);
/// let _scope = RegionScope::enter(Rc::clone(&region));
/// let mut alloc = factory.new_instance();
/// assert!(alloc.is_pool());
/// alloc.allocate(64, 8)?;
/// alloc.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AllocatorFactory {
    raw: &'static dyn RawMemory,
    heap: HeapConfig,
}

impl AllocatorFactory {
    /// Factory whose heap allocators use the process C heap
    pub fn new() -> Self {
        Self { raw: LibcMemory::global(), heap: HeapConfig::default() }
    }

    /// Factory whose heap allocators use `raw` with `config`
    pub fn with_heap(raw: &'static dyn RawMemory, config: HeapConfig) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self { raw, heap: config })
    }

    /// Allocator for the region bound to this thread by [`RegionScope`], if any
    pub fn new_instance(&self) -> AnyAllocator {
        self.for_region(RegionScope::current())
    }

    /// Pool allocator over `region`, or a heap allocator when there is none
    pub fn for_region(&self, region: Option<Rc<ReservedRegion>>) -> AnyAllocator {
        match region {
            Some(region) => AnyAllocator::Pool(PoolAllocator::new(region)),
            None => AnyAllocator::Heap(self.heap_allocator()),
        }
    }

    fn heap_allocator(&self) -> HeapAllocator {
        HeapAllocator::from_validated(self.raw, &self.heap)
    }
}

impl Default for AllocatorFactory {
    fn default() -> Self {
        Self::new()
    }
}
