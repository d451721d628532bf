//! Sealed allocator contract
//!
//! [`ScopedAllocator`] is only implementable within `vmarena-memory`.
//! External crates can use it as a bound but cannot add strategies, so
//! code can match exhaustively over [`AnyAllocator`](super::AnyAllocator).

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::MemoryResult;

// ============================================================================
// Sealing Mechanism
// ============================================================================

mod private {
    /// Private sealing trait - cannot be named or implemented outside this module
    pub trait Sealed {}

    impl Sealed for crate::allocator::HeapAllocator {}
    impl Sealed for crate::allocator::PoolAllocator {}
    impl Sealed for crate::allocator::AnyAllocator {}

    impl<T: ?Sized + Sealed> Sealed for &mut T {}
}

// ============================================================================
// Sealed Allocator Trait
// ============================================================================

/// A single-use allocator released in one bulk operation.
///
/// An instance allocates zero or more spans and is then closed exactly
/// once, which frees everything it handed out. Closing twice, or
/// allocating after close, fails with
/// [`MemoryError::InvalidState`](crate::MemoryError::InvalidState).
///
/// # Safety
///
/// Spans are valid until `close` (or drop). The returned memory is
/// uninitialized.
pub trait ScopedAllocator: private::Sealed {
    /// Allocate `size` bytes aligned to `align` (a power of two)
    fn allocate(&mut self, size: usize, align: usize) -> MemoryResult<NonNull<[u8]>>;

    /// Release every span this instance handed out
    fn close(&mut self) -> MemoryResult<()>;

    /// Whether `close` has run
    fn is_closed(&self) -> bool;

    /// Allocate for a [`Layout`]
    #[inline]
    fn allocate_layout(&mut self, layout: Layout) -> MemoryResult<NonNull<[u8]>> {
        self.allocate(layout.size(), layout.align())
    }

    /// Allocate and zero `size` bytes
    fn allocate_zeroed(&mut self, size: usize, align: usize) -> MemoryResult<NonNull<[u8]>> {
        let span = self.allocate(size, align)?;
        // SAFETY: `span` was just returned for exclusive use and is `size` bytes long.
        unsafe { span.cast::<u8>().as_ptr().write_bytes(0, span.len()) };
        Ok(span)
    }

    /// Get allocator type name for debugging
    fn type_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl<T: ScopedAllocator + ?Sized> ScopedAllocator for &mut T {
    #[inline]
    fn allocate(&mut self, size: usize, align: usize) -> MemoryResult<NonNull<[u8]>> {
        (**self).allocate(size, align)
    }

    #[inline]
    fn close(&mut self) -> MemoryResult<()> {
        (**self).close()
    }

    #[inline]
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
