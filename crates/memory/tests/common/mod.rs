//! Shared helpers for integration tests

#![allow(dead_code)]

use std::ptr::NonNull;
use std::sync::Mutex;

use vmarena_system::{
    AllocationKind, LibcMemory, RawAllocation, RawMemory, SystemError, SystemResult,
};

/// Raw memory that forwards to libc and records releases
#[derive(Debug, Default)]
pub struct CountingRaw {
    batches: Mutex<Vec<Vec<(usize, AllocationKind)>>>,
    plain_releases: Mutex<usize>,
    aligned_releases: Mutex<usize>,
    fail_after: Mutex<Option<usize>>,
}

impl CountingRaw {
    pub fn leaked() -> &'static Self {
        Box::leak(Box::default())
    }

    /// Entries passed to each `batch_release` call
    pub fn batches(&self) -> Vec<Vec<(usize, AllocationKind)>> {
        self.batches.lock().expect("lock").clone()
    }

    pub fn plain_releases(&self) -> usize {
        *self.plain_releases.lock().expect("lock")
    }

    pub fn aligned_releases(&self) -> usize {
        *self.aligned_releases.lock().expect("lock")
    }

    /// Make every allocation after the next `n` fail
    pub fn fail_after(&self, n: usize) {
        *self.fail_after.lock().expect("lock") = Some(n);
    }

    fn admit(&self, size: usize, align: usize) -> SystemResult<()> {
        let mut budget = self.fail_after.lock().expect("lock");
        match budget.as_mut() {
            Some(0) => Err(SystemError::AllocationFailed { size, align }),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl RawMemory for CountingRaw {
    fn allocate(&self, size: usize) -> SystemResult<NonNull<u8>> {
        self.admit(size, vmarena_system::MAX_NATURAL_ALIGN)?;
        LibcMemory::global().allocate(size)
    }

    fn aligned_allocate(&self, size: usize, align: usize) -> SystemResult<NonNull<u8>> {
        self.admit(size, align)?;
        LibcMemory::global().aligned_allocate(size, align)
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_size: usize) -> SystemResult<NonNull<u8>> {
        // SAFETY: forwarded caller contract.
        unsafe { LibcMemory::global().resize(ptr, new_size) }
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        *self.plain_releases.lock().expect("lock") += 1;
        // SAFETY: forwarded caller contract.
        unsafe { LibcMemory::global().release(ptr) }
    }

    unsafe fn aligned_release(&self, ptr: NonNull<u8>) {
        *self.aligned_releases.lock().expect("lock") += 1;
        // SAFETY: forwarded caller contract.
        unsafe { LibcMemory::global().aligned_release(ptr) }
    }

    unsafe fn batch_release(&self, entries: &[RawAllocation]) {
        self.batches
            .lock()
            .expect("lock")
            .push(entries.iter().map(|e| (e.addr.as_ptr() as usize, e.kind)).collect());
        for entry in entries {
            // SAFETY: forwarded caller contract for each entry.
            unsafe {
                match entry.kind {
                    AllocationKind::Plain => self.release(entry.addr),
                    AllocationKind::Aligned => self.aligned_release(entry.addr),
                }
            }
        }
    }
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
