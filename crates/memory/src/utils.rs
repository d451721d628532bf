//! Alignment and checked address arithmetic

use crate::error::{MemoryError, MemoryResult};

/// Validate that `alignment` is a non-zero power of two
#[inline]
pub fn check_alignment(alignment: usize) -> MemoryResult<()> {
    if alignment == 0 || !alignment.is_power_of_two() {
        return Err(MemoryError::invalid_alignment(alignment));
    }
    Ok(())
}

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Overflow is reported as
/// [`MemoryError::SizeOverflow`].
///
/// ```
/// use vmarena_memory::utils::align_up;
///
/// assert_eq!(align_up(10, 4096).unwrap(), 4096);
/// assert_eq!(align_up(4096, 4096).unwrap(), 4096);
/// assert!(align_up(usize::MAX, 16).is_err());
/// ```
#[inline(always)]
pub fn align_up(value: usize, alignment: usize) -> MemoryResult<usize> {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    value
        .checked_add(mask)
        .map(|v| v & !mask)
        .ok_or_else(|| MemoryError::size_overflow("align_up"))
}

/// Whether `value` is a multiple of `alignment` (a power of two)
#[inline(always)]
pub fn is_aligned(value: usize, alignment: usize) -> bool {
    value & (alignment - 1) == 0
}

/// Checked arithmetic that reports overflow as [`MemoryError::SizeOverflow`]
pub trait CheckedArithmetic: Sized {
    /// Checked addition
    fn try_add(self, rhs: Self) -> MemoryResult<Self>;

    /// Checked subtraction
    fn try_sub(self, rhs: Self) -> MemoryResult<Self>;

    /// Checked multiplication
    fn try_mul(self, rhs: Self) -> MemoryResult<Self>;
}

impl CheckedArithmetic for usize {
    #[inline]
    fn try_add(self, rhs: Self) -> MemoryResult<Self> {
        self.checked_add(rhs).ok_or_else(|| MemoryError::size_overflow("add"))
    }

    #[inline]
    fn try_sub(self, rhs: Self) -> MemoryResult<Self> {
        self.checked_sub(rhs).ok_or_else(|| MemoryError::size_overflow("sub"))
    }

    #[inline]
    fn try_mul(self, rhs: Self) -> MemoryResult<Self> {
        self.checked_mul(rhs).ok_or_else(|| MemoryError::size_overflow("mul"))
    }
}
