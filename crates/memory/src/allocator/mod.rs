//! Scoped allocation strategies
//!
//! - [`HeapAllocator`]: C heap, every pointer logged and freed in one batch
//! - [`PoolAllocator`]: bump slices of a [`ReservedRegion`](crate::region::ReservedRegion),
//!   freed by one rollback
//! - [`AllocatorFactory`]: picks between them depending on whether a region
//!   is available

mod factory;
mod heap;
mod pool;
pub mod sealed;

pub use factory::{AllocatorFactory, AnyAllocator};
pub use heap::HeapAllocator;
pub use pool::PoolAllocator;
pub use sealed::ScopedAllocator;
