#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![allow(unsafe_code)] // Raw allocator calls and OS queries require unsafe
//! # vmarena-system
//!
//! The host-facing layer under `vmarena-memory`:
//! - [`Os`]: which operating system the process runs on
//! - [`page`]: page size and reservation granularity
//! - [`raw`]: the C allocator and `mem*` calls behind [`RawMemory`]
//!
//! ## Features
//!
//! - `logging` (default): structured events through `tracing`
//!
//! ## Example
//!
//! ```no_run
//! use vmarena_system::{Os, RawMemory, LibcMemory};
//!
//! fn main() -> vmarena_system::SystemResult<()> {
//!     let os = Os::current()?;
//!     println!("{os}: page {} bytes", vmarena_system::page::page_size());
//!
//!     let raw = LibcMemory::global();
//!     let ptr = raw.allocate(64)?;
//!     // SAFETY: `ptr` was just allocated by `raw` and is released once.
//!     unsafe { raw.release(ptr) };
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod os;
pub mod page;
pub mod raw;

// Re-exports
pub use error::{SystemError, SystemResult};
pub use os::Os;
pub use raw::{AllocationKind, LibcMemory, MAX_NATURAL_ALIGN, RawAllocation, RawMemory};
