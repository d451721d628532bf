//! Windows backend on `VirtualAlloc`/`VirtualFree`

use std::ptr::{self, NonNull};

use vmarena_system::page;
use winapi::ctypes::c_void;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::winnt::{MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE};

use super::PlatformMemoryOps;
use crate::error::{MemoryError, MemoryResult};

/// `VirtualAlloc`/`VirtualFree` backend.
///
/// Reservations are aligned to the allocation granularity (typically
/// 64 KiB); commits and decommits happen in page units.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsMemory;

static WINDOWS: WindowsMemory = WindowsMemory;

impl WindowsMemory {
    /// The process-wide instance
    pub fn global() -> &'static Self {
        &WINDOWS
    }
}

impl PlatformMemoryOps for WindowsMemory {
    fn reserve(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        // SAFETY: FFI call to Windows VirtualAlloc. We pass:
        // - addr: null, the OS chooses the placement
        // - MEM_RESERVE: address space only, no backing
        // OS validates parameters and returns null on error.
        let addr = unsafe { VirtualAlloc(ptr::null_mut(), size, MEM_RESERVE, PAGE_READWRITE) };
        NonNull::new(addr.cast::<u8>()).ok_or_else(|| MemoryError::last_os_error("VirtualAlloc"))
    }

    unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        // SAFETY: caller guarantees the range is inside a live reservation.
        let committed =
            unsafe { VirtualAlloc(addr.as_ptr().cast::<c_void>(), len, MEM_COMMIT, PAGE_READWRITE) };
        if committed.is_null() {
            return Err(MemoryError::last_os_error("VirtualAlloc"));
        }
        Ok(())
    }

    unsafe fn uncommit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        // SAFETY: caller guarantees the range is committed memory of a live
        // reservation that nothing accesses afterwards.
        let ok = unsafe { VirtualFree(addr.as_ptr().cast::<c_void>(), len, MEM_DECOMMIT) };
        if ok == 0 {
            return Err(MemoryError::last_os_error("VirtualFree"));
        }
        Ok(())
    }

    unsafe fn release(&self, addr: NonNull<u8>, _len: usize) -> MemoryResult<()> {
        // MEM_RELEASE requires a size of zero and the reservation base
        // SAFETY: caller guarantees `addr` is the base returned by VirtualAlloc.
        let ok = unsafe { VirtualFree(addr.as_ptr().cast::<c_void>(), 0, MEM_RELEASE) };
        if ok == 0 {
            return Err(MemoryError::last_os_error("VirtualFree"));
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
        "windows"
    }
}
