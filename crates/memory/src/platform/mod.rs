//! Virtual memory backends
//!
//! [`PlatformMemoryOps`] reserves, commits, decommits and releases
//! address ranges. One backend per OS family; the process-wide instance is
//! chosen once from [`Os::current`] and returned by [`current`].
//!
//! # Safety
//!
//! `commit`, `uncommit` and `release` operate on raw address ranges.
//! Callers must ensure:
//! 1. **Origin**: the range lies inside a reservation made by `reserve` on
//!    the same backend and not yet released
//! 2. **Alignment**: the start and length are multiples of [`PlatformMemoryOps::page_size`]
//! 3. **Access**: nothing reads or writes a range after it is uncommitted
//!    or released

use std::fmt;
use std::ptr::NonNull;

use once_cell::sync::Lazy;
use vmarena_system::{Os, page};

use crate::error::{MemoryError, MemoryResult};

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(unix)]
pub use posix::PosixMemory;
#[cfg(windows)]
pub use windows::WindowsMemory;

mod private {
    /// Seals [`super::PlatformMemoryOps`] to the backends in this module
    pub trait Sealed {}

    #[cfg(unix)]
    impl Sealed for super::PosixMemory {}
    #[cfg(windows)]
    impl Sealed for super::WindowsMemory {}
    #[cfg(test)]
    impl Sealed for super::testing::RecordingPlatform {}
}

/// Reserve/commit/decommit/release of virtual address ranges.
///
/// This trait is sealed: the crate ships one implementation per supported
/// OS family and callers cannot add their own.
pub trait PlatformMemoryOps: private::Sealed + fmt::Debug + Send + Sync {
    /// Reserve `size` bytes of address space with no access and no backing
    fn reserve(&self, size: usize) -> MemoryResult<NonNull<u8>>;

    /// Back `[addr, addr + len)` with memory and make it read/write
    ///
    /// # Safety
    ///
    /// See the [module documentation](self).
    unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()>;

    /// Drop backing and access for `[addr, addr + len)`, keeping the reservation
    ///
    /// # Safety
    ///
    /// See the [module documentation](self).
    unsafe fn uncommit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()>;

    /// Free the whole reservation starting at `addr` of `len` bytes
    ///
    /// # Safety
    ///
    /// `addr` must be the base returned by `reserve` and `len` the size
    /// passed to it. The range is invalid afterwards.
    unsafe fn release(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()>;

    /// Alignment and size unit of reservations
    fn granularity(&self) -> usize;

    /// Unit of commit and decommit
    fn page_size(&self) -> usize;

    /// Backend name for diagnostics
    fn name(&self) -> &'static str;
}

static PLATFORM: Lazy<MemoryResult<&'static dyn PlatformMemoryOps>> = Lazy::new(select);

/// The backend for the running OS, selected on first call
pub fn current() -> MemoryResult<&'static dyn PlatformMemoryOps> {
    PLATFORM.clone()
}

fn select() -> MemoryResult<&'static dyn PlatformMemoryOps> {
    let os = Os::current()?;
    // Commit ranges need the queried page size, not the 4 KiB fallback.
    page::try_page_size()?;
    page::try_allocation_granularity()?;
    let platform: &'static dyn PlatformMemoryOps = match os {
        #[cfg(unix)]
        Os::Linux | Os::MacOs => PosixMemory::global(),
        #[cfg(windows)]
        Os::Windows => WindowsMemory::global(),
        #[allow(unreachable_patterns)]
        other => {
            #[cfg(feature = "logging")]
            tracing::error!(os = %other, "no virtual memory backend compiled for this OS");
            return Err(MemoryError::UnsupportedPlatform { os: other.to_string() });
        }
    };

    #[cfg(feature = "logging")]
    tracing::debug!(
        %os,
        backend = platform.name(),
        page_size = platform.page_size(),
        granularity = platform.granularity(),
        "selected virtual memory backend"
    );

    Ok(platform)
}
