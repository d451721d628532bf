//! Call-recording backend for unit tests

use std::ptr::NonNull;
use std::sync::Mutex;

use super::PlatformMemoryOps;
use crate::error::{MemoryError, MemoryResult};

/// One recorded backend call: operation, offset from the reservation base, length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Reserve(usize),
    Commit(usize, usize),
    Uncommit(usize, usize),
    Release(usize),
}

/// Forwards to the real backend and records every call
#[derive(Debug)]
pub(crate) struct RecordingPlatform {
    inner: &'static dyn PlatformMemoryOps,
    calls: Mutex<Vec<Call>>,
    base: Mutex<Option<usize>>,
    fail_commit: Mutex<bool>,
    fail_uncommit: Mutex<bool>,
}

impl RecordingPlatform {
    /// A leaked recorder so regions can hold it as `&'static dyn`
    pub(crate) fn leaked() -> &'static Self {
        let inner = super::current().expect("supported platform");
        Box::leak(Box::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
            base: Mutex::new(None),
            fail_commit: Mutex::new(false),
            fail_uncommit: Mutex::new(false),
        }))
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().expect("lock").iter().filter(|c| matches(c)).count()
    }

    pub(crate) fn fail_next_commit(&self) {
        *self.fail_commit.lock().expect("lock") = true;
    }

    pub(crate) fn fail_next_uncommit(&self) {
        *self.fail_uncommit.lock().expect("lock") = true;
    }

    fn offset(&self, addr: NonNull<u8>) -> usize {
        let base = self.base.lock().expect("lock").unwrap_or(0);
        addr.as_ptr() as usize - base
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("lock").push(call);
    }

    fn take_failure(flag: &Mutex<bool>) -> bool {
        std::mem::take(&mut *flag.lock().expect("lock"))
    }
}

impl PlatformMemoryOps for RecordingPlatform {
    fn reserve(&self, size: usize) -> MemoryResult<NonNull<u8>> {
        let base = self.inner.reserve(size)?;
        *self.base.lock().expect("lock") = Some(base.as_ptr() as usize);
        self.record(Call::Reserve(size));
        Ok(base)
    }

    unsafe fn commit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        self.record(Call::Commit(self.offset(addr), len));
        if Self::take_failure(&self.fail_commit) {
            return Err(MemoryError::os_operation("commit", 12));
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.commit(addr, len) }
    }

    unsafe fn uncommit(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        self.record(Call::Uncommit(self.offset(addr), len));
        if Self::take_failure(&self.fail_uncommit) {
            return Err(MemoryError::os_operation("uncommit", 22));
        }
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.uncommit(addr, len) }
    }

    unsafe fn release(&self, addr: NonNull<u8>, len: usize) -> MemoryResult<()> {
        self.record(Call::Release(len));
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.release(addr, len) }
    }

    fn granularity(&self) -> usize {
        self.inner.granularity()
    }

    fn page_size(&self) -> usize {
        self.inner.page_size()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
