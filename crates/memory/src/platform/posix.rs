//! Linux and macOS backend on the `mmap` family

use std::ptr::{self, NonNull};

use libc::{
    MADV_DONTNEED, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE,
    madvise, mmap, mprotect, munmap,
};
use vmarena_system::page;

use super::PlatformMemoryOps;
use crate::error::{MemoryError, MemoryResult};

/// `mmap`/`mprotect`/`madvise`/`munmap` backend.
///
/// Reservations are `PROT_NONE` anonymous private mappings. Decommit drops
/// protection back to `PROT_NONE` and advises `MADV_DONTNEED`, which frees
/// the pages immediately on Linux and is only a hint on macOS.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixMemory;

static POSIX: PosixMemory = PosixMemory;

impl PosixMemory {
    /// The process-wide instance
    pub fn global() -> &'static Self {
        &POSIX
    }
}

impl PlatformMemoryOps for PosixMemory {
    fn reserve(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        // SAFETY: FFI call to libc mmap. We pass:
        // - addr: null, the OS chooses the placement
        // - prot: PROT_NONE, nothing is accessible until committed
        // - fd=-1, offset=0: anonymous mapping (no file)
        // OS validates all parameters and returns MAP_FAILED on error.
        let addr = unsafe {
            mmap(ptr::null_mut(), size, PROT_NONE, MAP_PRIVATE | MAP_ANONYMOUS, -1, 0)
        };
        if addr == MAP_FAILED {
            return Err(MemoryError::last_os_error("mmap"));
        }
        NonNull::new(addr.cast::<u8>()).ok_or_else(|| MemoryError::os_operation("mmap", 0))
    }

    unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        // SAFETY: caller guarantees the range is inside a live reservation.
        let rc = unsafe { mprotect(addr.as_ptr().cast(), len, PROT_READ | PROT_WRITE) };
        if rc != 0 {
            return Err(MemoryError::last_os_error("mprotect"));
        }
        Ok(())
    }

    unsafe fn uncommit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        // SAFETY: caller guarantees the range is inside a live reservation
        // and that nothing accesses it afterwards.
        let rc = unsafe { mprotect(addr.as_ptr().cast(), len, PROT_NONE) };
        if rc != 0 {
            return Err(MemoryError::last_os_error("mprotect"));
        }
        // SAFETY: same range, now inaccessible. Advice only affects backing.
        let rc = unsafe { madvise(addr.as_ptr().cast(), len, MADV_DONTNEED) };
        if rc != 0 {
            return Err(MemoryError::last_os_error("madvise"));
        }
        Ok(())
    }

    unsafe fn release(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        // SAFETY: FFI call to libc munmap. Caller guarantees addr/len are from mmap.
        let rc = unsafe { munmap(addr.as_ptr().cast(), len) };
        if rc != 0 {
            return Err(MemoryError::last_os_error("munmap"));
        }
        Ok(())
    }

    fn granularity(&self) -> usize {
        page::allocation_granularity()
    }

    fn page_size(&self) -> usize {
        page::page_size()
    }

    fn name(&self) -> &'static str {
        "posix"
    }
}
