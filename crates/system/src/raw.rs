//! Raw memory calls
//!
//! [`RawMemory`] is the narrow surface over the C allocator and the
//! `mem*` family. [`LibcMemory`] is the process-wide implementation on
//! top of `libc`; other implementations exist mainly to observe calls in
//! tests.

use std::cmp::Ordering;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{SystemError, SystemResult};

/// Largest alignment plain `malloc` is guaranteed to satisfy
#[cfg(target_pointer_width = "64")]
pub const MAX_NATURAL_ALIGN: usize = 16;

/// Largest alignment plain `malloc` is guaranteed to satisfy
#[cfg(not(target_pointer_width = "64"))]
pub const MAX_NATURAL_ALIGN: usize = 8;

/// Which allocation primitive produced a pointer, and so which one frees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationKind {
    /// From [`RawMemory::allocate`], freed with [`RawMemory::release`]
    Plain,
    /// From [`RawMemory::aligned_allocate`], freed with [`RawMemory::aligned_release`]
    Aligned,
}

/// A pointer together with the primitive that must free it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAllocation {
    /// Start of the allocation
    pub addr: NonNull<u8>,
    /// Primitive that produced it
    pub kind: AllocationKind,
}

impl RawAllocation {
    /// Entry for a plain allocation
    pub fn plain(addr: NonNull<u8>) -> Self {
        Self { addr, kind: AllocationKind::Plain }
    }

    /// Entry for an over-aligned allocation
    pub fn aligned(addr: NonNull<u8>) -> Self {
        Self { addr, kind: AllocationKind::Aligned }
    }
}

/// Raw allocator and byte-level memory calls.
///
/// Allocation methods return uninitialized memory. Every pointer handed
/// out must be freed exactly once through the matching release method or
/// through [`RawMemory::batch_release`].
pub trait RawMemory: fmt::Debug + Send + Sync {
    /// Allocate `size` bytes aligned to at least [`MAX_NATURAL_ALIGN`]
    fn allocate(&self, size: usize) -> SystemResult<NonNull<u8>>;

    /// Allocate `size` bytes aligned to `align`, which must be a power of two
    fn aligned_allocate(&self, size: usize, align: usize) -> SystemResult<NonNull<u8>>;

    /// Resize a plain allocation.
    ///
    /// If the resize fails the original allocation is released and
    /// `AllocationFailed` is returned.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`RawMemory::allocate`] on `self` and not have been freed.
    unsafe fn resize(&self, ptr: NonNull<u8>, new_size: usize) -> SystemResult<NonNull<u8>>;

    /// Free a plain allocation
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`RawMemory::allocate`] or [`RawMemory::resize`]
    /// on `self` and not have been freed.
    unsafe fn release(&self, ptr: NonNull<u8>);

    /// Free an over-aligned allocation
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`RawMemory::aligned_allocate`] on `self` and not
    /// have been freed.
    unsafe fn aligned_release(&self, ptr: NonNull<u8>);

    /// Free every entry with the primitive its kind names, in one call.
    ///
    /// # Safety
    ///
    /// Every entry must be live, distinct, and owned by the caller.
    unsafe fn batch_release(&self, entries: &[RawAllocation]) {
        for entry in entries {
            // SAFETY: forwarded from the caller's contract for each entry.
            unsafe {
                match entry.kind {
                    AllocationKind::Plain => self.release(entry.addr),
                    AllocationKind::Aligned => self.aligned_release(entry.addr),
                }
            }
        }
    }

    /// Lexicographic comparison of `len` bytes
    ///
    /// # Safety
    ///
    /// Both pointers must be valid for reads of `len` bytes.
    unsafe fn compare(&self, a: *const u8, b: *const u8, len: usize) -> Ordering {
        // SAFETY: caller guarantees both ranges are readable.
        let result = unsafe { libc::memcmp(a.cast(), b.cast(), len) };
        result.cmp(&0)
    }

    /// Copy `len` bytes between non-overlapping ranges
    ///
    /// # Safety
    ///
    /// `src` must be readable and `dst` writable for `len` bytes, and the
    /// ranges must not overlap.
    unsafe fn copy(&self, dst: *mut u8, src: *const u8, len: usize) {
        debug_assert!(
            (dst as usize).abs_diff(src as usize) >= len,
            "copy called with overlapping ranges"
        );
        // SAFETY: caller guarantees validity and disjointness.
        unsafe {
            libc::memcpy(dst.cast(), src.cast(), len);
        }
    }

    /// Copy `len` bytes between possibly overlapping ranges
    ///
    /// # Safety
    ///
    /// `src` must be readable and `dst` writable for `len` bytes.
    unsafe fn move_bytes(&self, dst: *mut u8, src: *const u8, len: usize) {
        // SAFETY: caller guarantees validity; memmove handles overlap.
        unsafe {
            libc::memmove(dst.cast(), src.cast(), len);
        }
    }

    /// Set `len` bytes at `dst` to `byte`
    ///
    /// # Safety
    ///
    /// `dst` must be writable for `len` bytes.
    unsafe fn fill(&self, dst: *mut u8, byte: u8, len: usize) {
        // SAFETY: caller guarantees the range is writable.
        unsafe {
            libc::memset(dst.cast(), libc::c_int::from(byte), len);
        }
    }

    /// Offset of the first `byte` in the `len` bytes at `haystack`
    ///
    /// # Safety
    ///
    /// `haystack` must be readable for `len` bytes.
    unsafe fn find_byte(&self, haystack: *const u8, byte: u8, len: usize) -> Option<usize> {
        // SAFETY: caller guarantees the range is readable.
        let found = unsafe { libc::memchr(haystack.cast(), libc::c_int::from(byte), len) };
        if found.is_null() { None } else { Some(found as usize - haystack as usize) }
    }
}

/// [`RawMemory`] over the C runtime allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcMemory;

static LIBC: LibcMemory = LibcMemory;

impl LibcMemory {
    /// The process-wide instance
    pub fn global() -> &'static Self {
        &LIBC
    }
}

fn validate_alignment(align: usize) -> SystemResult<()> {
    if align == 0 || !align.is_power_of_two() {
        #[cfg(feature = "logging")]
        tracing::error!(align, "rejected non power-of-two alignment");
        return Err(SystemError::InvalidAlignment { alignment: align });
    }
    Ok(())
}

impl RawMemory for LibcMemory {
    fn allocate(&self, size: usize) -> SystemResult<NonNull<u8>> {
        // malloc(0) may legally return null
        let request = size.max(1);
        // SAFETY: malloc has no preconditions.
        let ptr = unsafe { libc::malloc(request) };
        NonNull::new(ptr.cast::<u8>())
            .ok_or(SystemError::AllocationFailed { size, align: MAX_NATURAL_ALIGN })
    }

    fn aligned_allocate(&self, size: usize, align: usize) -> SystemResult<NonNull<u8>> {
        validate_alignment(align)?;
        let request = size.max(1);
        aligned_alloc_impl(request, align).ok_or(SystemError::AllocationFailed { size, align })
    }

    unsafe fn resize(&self, ptr: NonNull<u8>, new_size: usize) -> SystemResult<NonNull<u8>> {
        // SAFETY: caller guarantees `ptr` is a live malloc allocation.
        let resized = unsafe { libc::realloc(ptr.as_ptr().cast(), new_size.max(1)) };
        match NonNull::new(resized.cast::<u8>()) {
            Some(resized) => Ok(resized),
            None => {
                // SAFETY: realloc failure leaves `ptr` live and still ours.
                unsafe { self.release(ptr) };
                Err(SystemError::AllocationFailed { size: new_size, align: MAX_NATURAL_ALIGN })
            }
        }
    }

    unsafe fn release(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` is a live malloc allocation.
        unsafe { libc::free(ptr.as_ptr().cast()) }
    }

    unsafe fn aligned_release(&self, ptr: NonNull<u8>) {
        // SAFETY: caller guarantees `ptr` is a live aligned allocation.
        unsafe { aligned_free_impl(ptr) }
    }
}

#[cfg(unix)]
fn aligned_alloc_impl(size: usize, align: usize) -> Option<NonNull<u8>> {
    // posix_memalign requires a multiple of the pointer size
    let align = align.max(size_of::<*const ()>());
    let mut out: *mut libc::c_void = std::ptr::null_mut();
    // SAFETY: `out` is a valid place to write, `align` is a power of two
    // multiple of the pointer size.
    let rc = unsafe { libc::posix_memalign(&mut out, align, size) };
    if rc == 0 { NonNull::new(out.cast::<u8>()) } else { None }
}

#[cfg(unix)]
unsafe fn aligned_free_impl(ptr: NonNull<u8>) {
    // SAFETY: posix_memalign memory is released with free.
    unsafe { libc::free(ptr.as_ptr().cast()) }
}

#[cfg(windows)]
fn aligned_alloc_impl(size: usize, align: usize) -> Option<NonNull<u8>> {
    // SAFETY: `align` is a power of two; _aligned_malloc has no other preconditions.
    let ptr = unsafe { libc::aligned_malloc(size, align) };
    NonNull::new(ptr.cast::<u8>())
}

#[cfg(windows)]
unsafe fn aligned_free_impl(ptr: NonNull<u8>) {
    // SAFETY: caller guarantees `ptr` came from _aligned_malloc.
    unsafe { libc::aligned_free(ptr.as_ptr().cast()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn plain_allocation_is_naturally_aligned() {
        let raw = LibcMemory::global();
        let ptr = raw.allocate(24).expect("malloc");
        assert_eq!(ptr.as_ptr() as usize % MAX_NATURAL_ALIGN, 0);
        // SAFETY: allocated above.
        unsafe { raw.release(ptr) };
    }

    #[rstest]
    #[case(32)]
    #[case(64)]
    #[case(4096)]
    fn aligned_allocation_honours_alignment(#[case] align: usize) {
        let raw = LibcMemory::global();
        let ptr = raw.aligned_allocate(100, align).expect("aligned alloc");
        assert_eq!(ptr.as_ptr() as usize % align, 0);
        // SAFETY: allocated above.
        unsafe { raw.aligned_release(ptr) };
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(48)]
    fn aligned_allocation_rejects_bad_alignment(#[case] align: usize) {
        let err = LibcMemory::global().aligned_allocate(16, align).unwrap_err();
        assert_eq!(err, SystemError::InvalidAlignment { alignment: align });
    }

    #[test]
    fn zero_sized_allocation_is_non_null() {
        let raw = LibcMemory::global();
        let ptr = raw.allocate(0).expect("malloc(0)");
        // SAFETY: allocated above.
        unsafe { raw.release(ptr) };
    }

    #[test]
    fn resize_preserves_contents() {
        let raw = LibcMemory::global();
        let ptr = raw.allocate(4).expect("malloc");
        // SAFETY: 4 writable bytes; resize target is the live allocation.
        unsafe {
            raw.fill(ptr.as_ptr(), 0xAB, 4);
            let grown = raw.resize(ptr, 64).expect("realloc");
            let bytes = std::slice::from_raw_parts(grown.as_ptr(), 4);
            assert_eq!(bytes, &[0xAB; 4]);
            raw.release(grown);
        }
    }

    #[test]
    fn batch_release_frees_mixed_kinds() {
        let raw = LibcMemory::global();
        let entries = vec![
            RawAllocation::plain(raw.allocate(8).expect("malloc")),
            RawAllocation::aligned(raw.aligned_allocate(8, 64).expect("aligned")),
            RawAllocation::plain(raw.allocate(128).expect("malloc")),
        ];
        // SAFETY: every entry is live and released once.
        unsafe { raw.batch_release(&entries) };
    }

    #[test]
    fn byte_helpers() {
        let raw = LibcMemory::global();
        let mut a = *b"hello world";
        let b = *b"hello there";
        // SAFETY: all ranges are within the local arrays.
        unsafe {
            assert_eq!(raw.compare(a.as_ptr(), b.as_ptr(), 5), Ordering::Equal);
            assert_eq!(raw.compare(a.as_ptr(), b.as_ptr(), 11), Ordering::Greater);
            assert_eq!(raw.find_byte(a.as_ptr(), b'w', a.len()), Some(6));
            assert_eq!(raw.find_byte(a.as_ptr(), b'z', a.len()), None);

            raw.move_bytes(a.as_mut_ptr().add(1), a.as_ptr(), 4);
            assert_eq!(&a[..5], b"hhell");

            let mut dst = [0u8; 5];
            raw.copy(dst.as_mut_ptr(), b.as_ptr(), 5);
            assert_eq!(&dst, b"hello");
        }
    }
}
