//! # vmarena-memory
//!
//! Scoped virtual-memory allocation for single-owner runtimes such as an
//! event loop, where each unit of work gets a cheap, bulk-releasable
//! memory region instead of paying per-object allocation cost.
//!
//! The crate is layered:
//! - [`platform`]: reserve/commit/decommit/release of address ranges
//! - [`region`]: a bump pool over one reservation with LIFO checkpoints
//!   and idle-page decommit
//! - [`allocator`]: the heap and pool strategies behind one sealed trait,
//!   plus the factory choosing between them
//! - [`scope`]: binding a region to the current thread
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::rc::Rc;
//! use vmarena_memory::prelude::*;
//!
//! fn main() -> MemoryResult<()> {
//!     vmarena_memory::init()?;
//!
//!     let region = Rc::new(ReservedRegion::new(16 << 20)?);
//!     let factory = AllocatorFactory::new();
//!
//!     for _turn in 0..3 {
//!         let _scope = RegionScope::enter(Rc::clone(&region));
//!         let mut alloc = factory.new_instance();
//!         let span = alloc.allocate(128, 16)?;
//!         assert_eq!(span.len(), 128);
//!         alloc.close()?; // one rollback frees the whole turn
//!     }
//!
//!     region.close()
//! }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)] // Virtual memory syscalls and raw spans require unsafe
#![warn(rust_2018_idioms)]
// Pointer/integer casts are the point of address bookkeeping
#![allow(clippy::cast_ptr_alignment)]

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod config;
pub mod platform;
pub mod region;
pub mod scope;
pub mod utils;

// Re-export core types for convenience
pub use crate::config::MemoryConfig;
pub use crate::error::{MemoryError, MemoryResult};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::allocator::{
        AllocatorFactory, AnyAllocator, HeapAllocator, PoolAllocator, ScopedAllocator,
    };
    pub use crate::config::{HeapConfig, MemoryConfig, RegionConfig};
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::platform::PlatformMemoryOps;
    pub use crate::region::{Checkpoint, RegionSnapshot, ReservedRegion};
    pub use crate::scope::RegionScope;

    // Utility traits for safe arithmetic
    pub use crate::utils::CheckedArithmetic;
}

/// Select the virtual memory backend for this process.
///
/// Selection happens once; later calls return the same backend. Calling
/// this at startup surfaces an unsupported OS early instead of on the
/// first region use.
///
/// # Examples
///
/// ```rust
/// fn main() -> vmarena_memory::MemoryResult<()> {
///     let platform = vmarena_memory::init()?;
///     assert!(platform.page_size().is_power_of_two());
///     Ok(())
/// }
/// ```
pub fn init() -> MemoryResult<&'static dyn platform::PlatformMemoryOps> {
    let platform = platform::current()?;

    #[cfg(feature = "logging")]
    tracing::debug!(
        backend = platform.name(),
        page_size = platform.page_size(),
        granularity = platform.granularity(),
        "vmarena-memory initialized"
    );

    Ok(platform)
}
