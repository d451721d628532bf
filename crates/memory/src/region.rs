//! Reserved virtual memory regions
//!
//! A [`ReservedRegion`] owns one address range reserved from the OS. It
//! hands out bump-allocated slices, commits pages lazily as the cursor
//! moves forward, and supports nested LIFO checkpoints that rewind the
//! cursor in O(1).
//!
//! ## Lifecycle
//!
//! Creating a region performs no syscalls. The first [`checkpoint`] or
//! [`slice`] reserves the full range. [`close`] releases it; every call
//! after that fails with [`MemoryError::InvalidState`].
//!
//! ## Decommit
//!
//! On rollback, if more than `decommit_threshold_pages` committed pages sit
//! above the cursor and at least `decommit_cooldown` has passed since the
//! last decommit, the top `decommit_pages` committed pages are returned to
//! the OS. Both conditions must hold.
//!
//! [`checkpoint`]: ReservedRegion::checkpoint
//! [`slice`]: ReservedRegion::slice
//! [`close`]: ReservedRegion::close

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;
use std::time::Instant;

use crate::config::RegionConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::platform::{self, PlatformMemoryOps};
use crate::utils::{CheckedArithmetic, align_up, check_alignment};

#[cfg(feature = "logging")]
use tracing::{debug, info, warn};

/// Handle for a saved cursor position.
///
/// Handles are dense stack indices. Only the most recent live checkpoint
/// can be rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checkpoint(usize);

impl Checkpoint {
    /// Position of this checkpoint on the region's stack
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Bookkeeping of a region at one point in time.
///
/// `cursor` and `committed` are byte offsets from `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSnapshot {
    /// Reservation base address, `None` before first use and after close
    pub base: Option<usize>,
    /// Bump cursor offset
    pub cursor: usize,
    /// Committed bytes from the base
    pub committed: usize,
    /// Reserved bytes
    pub total_size: usize,
    /// Live checkpoints
    pub checkpoint_depth: usize,
    /// Whether the region has been closed
    pub closed: bool,
}

impl RegionSnapshot {
    /// `0 <= cursor <= committed <= total_size`
    pub fn is_consistent(&self) -> bool {
        self.cursor <= self.committed && self.committed <= self.total_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionBase {
    Unreserved,
    Reserved(NonNull<u8>),
    Closed,
}

/// A fixed-capacity bump pool over one virtual memory reservation.
///
/// The region is single-owner: it is neither `Send` nor `Sync`, and is
/// shared between sequential allocators through `Rc`.
///
/// # Examples
///
/// ```no_run
/// use vmarena_memory::region::ReservedRegion;
///
/// # fn main() -> vmarena_memory::MemoryResult<()> {
/// let region = ReservedRegion::new(1 << 20)?;
///
/// let checkpoint = region.checkpoint()?;
/// let span = region.slice(256, 16)?;
/// assert_eq!(span.len(), 256);
/// region.rollback(checkpoint)?;
///
/// region.close()?;
/// # Ok(())
/// # }
/// ```
pub struct ReservedRegion {
    platform: &'static dyn PlatformMemoryOps,
    config: RegionConfig,
    total_size: usize,
    base: Cell<RegionBase>,
    cursor: Cell<usize>,
    committed: Cell<usize>,
    checkpoints: RefCell<Vec<usize>>,
    last_decommit: Cell<Instant>,
}

impl ReservedRegion {
    /// Region of at least `size` bytes with default tuning
    pub fn new(size: usize) -> MemoryResult<Self> {
        Self::with_config(size, RegionConfig::default())
    }

    /// Region of at least `size` bytes
    pub fn with_config(size: usize, config: RegionConfig) -> MemoryResult<Self> {
        Self::with_platform(size, config, platform::current()?)
    }

    /// Region of at least `size` bytes on an explicit backend.
    ///
    /// `size` is rounded up to the backend's granularity. No memory is
    /// reserved until first use.
    pub fn with_platform(
        size: usize,
        config: RegionConfig,
        platform: &'static dyn PlatformMemoryOps,
    ) -> MemoryResult<Self> {
        config.validate()?;
        if size == 0 {
            return Err(MemoryError::invalid_layout("region size must be greater than 0"));
        }
        let total_size = align_up(size, platform.granularity())?;
        let checkpoints = Vec::with_capacity(config.checkpoint_capacity);

        Ok(Self {
            platform,
            config,
            total_size,
            base: Cell::new(RegionBase::Unreserved),
            cursor: Cell::new(0),
            committed: Cell::new(0),
            checkpoints: RefCell::new(checkpoints),
            last_decommit: Cell::new(Instant::now()),
        })
    }

    /// Reserved size in bytes (the requested size rounded to granularity)
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Whether [`close`](Self::close) has run or a failed syscall closed the region
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.base.get() == RegionBase::Closed
    }

    /// Number of live checkpoints
    #[inline]
    pub fn checkpoint_depth(&self) -> usize {
        self.checkpoints.borrow().len()
    }

    /// Current bookkeeping
    pub fn snapshot(&self) -> RegionSnapshot {
        let base = self.base.get();
        RegionSnapshot {
            base: match base {
                RegionBase::Reserved(ptr) => Some(ptr.as_ptr() as usize),
                _ => None,
            },
            cursor: self.cursor.get(),
            committed: self.committed.get(),
            total_size: self.total_size,
            checkpoint_depth: self.checkpoint_depth(),
            closed: base == RegionBase::Closed,
        }
    }

    /// Save the cursor and return a handle to it.
    ///
    /// Reserves the region on first use.
    pub fn checkpoint(&self) -> MemoryResult<Checkpoint> {
        self.ensure_reserved()?;
        let mut checkpoints = self.checkpoints.borrow_mut();
        if checkpoints.len() == checkpoints.capacity() {
            let grow = checkpoints.len().max(1);
            checkpoints.reserve_exact(grow);
        }
        checkpoints.push(self.cursor.get());
        Ok(Checkpoint(checkpoints.len() - 1))
    }

    /// Rewind the cursor to `checkpoint`.
    ///
    /// `checkpoint` must be the most recent live checkpoint; anything else
    /// is a corrupted checkpoint stack and fails with `InvalidState`. May
    /// decommit idle pages. If that decommit fails the region is closed and
    /// the error returned.
    pub fn rollback(&self, checkpoint: Checkpoint) -> MemoryResult<()> {
        self.reserved_base()?;
        let restored = {
            let mut checkpoints = self.checkpoints.borrow_mut();
            let depth = checkpoints.len();
            let restored = match checkpoints.last() {
                Some(&cursor) if depth == checkpoint.0 + 1 => cursor,
                _ => {
                    return Err(MemoryError::invalid_state(format!(
                        "corrupted checkpoint index {} (depth {depth})",
                        checkpoint.0
                    )));
                }
            };
            checkpoints.pop();
            restored
        };

        #[cfg(feature = "logging")]
        debug!(
            index = checkpoint.0,
            from = self.cursor.get(),
            to = restored,
            "region rollback"
        );

        self.cursor.set(restored);
        self.maybe_decommit()
    }

    /// Bump-allocate `size` bytes aligned to `align`.
    ///
    /// Reserves the region on first use and commits pages as needed. A
    /// request past the end of the region fails with `OutOfBounds` and
    /// changes nothing. A failed commit closes the region.
    pub fn slice(&self, size: usize, align: usize) -> MemoryResult<NonNull<[u8]>> {
        check_alignment(align)?;
        let base = self.ensure_reserved()?;
        let base_addr = base.as_ptr() as usize;

        let cursor_addr = base_addr.try_add(self.cursor.get())?;
        let aligned = align_up(cursor_addr, align)?.try_sub(base_addr)?;
        let new_cursor = aligned.try_add(size)?;
        if new_cursor > self.total_size {
            return Err(MemoryError::out_of_bounds(new_cursor, self.total_size));
        }

        if size > 0 {
            if new_cursor > self.committed.get() {
                self.grow_commit(base, new_cursor)?;
            }
            self.cursor.set(new_cursor);
        }

        // SAFETY: `aligned <= new_cursor <= total_size`, inside the reservation.
        let start = unsafe { base.add(aligned) };
        Ok(NonNull::slice_from_raw_parts(start, size))
    }

    /// Release the reservation.
    ///
    /// A region that was never used closes without syscalls. Closing twice
    /// fails with `InvalidState`.
    pub fn close(&self) -> MemoryResult<()> {
        match self.base.replace(RegionBase::Closed) {
            RegionBase::Closed => Err(MemoryError::invalid_state("region already closed")),
            RegionBase::Unreserved => Ok(()),
            RegionBase::Reserved(base) => {
                self.checkpoints.borrow_mut().clear();
                #[cfg(feature = "logging")]
                debug!(
                    base = ?base,
                    size = self.total_size,
                    committed = self.committed.get(),
                    "releasing region"
                );
                // SAFETY: `base`/`total_size` are exactly the reservation and
                // the state is now Closed, so nothing hands out spans again.
                unsafe { self.platform.release(base, self.total_size) }
            }
        }
    }

    fn reserved_base(&self) -> MemoryResult<NonNull<u8>> {
        match self.base.get() {
            RegionBase::Reserved(base) => Ok(base),
            RegionBase::Closed => Err(MemoryError::invalid_state("region is closed")),
            RegionBase::Unreserved => Err(MemoryError::invalid_state("region has no checkpoints")),
        }
    }

    fn ensure_reserved(&self) -> MemoryResult<NonNull<u8>> {
        match self.base.get() {
            RegionBase::Reserved(base) => Ok(base),
            RegionBase::Closed => Err(MemoryError::invalid_state("region is closed")),
            RegionBase::Unreserved => {
                let base = self.platform.reserve(self.total_size)?;
                // base + total must be addressable
                (base.as_ptr() as usize).try_add(self.total_size)?;
                self.base.set(RegionBase::Reserved(base));
                self.cursor.set(0);
                self.committed.set(0);
                self.last_decommit.set(Instant::now());

                #[cfg(feature = "logging")]
                debug!(base = ?base, size = self.total_size, backend = self.platform.name(), "reserved region");

                Ok(base)
            }
        }
    }

    fn grow_commit(&self, base: NonNull<u8>, new_cursor: usize) -> MemoryResult<()> {
        let from = self.committed.get();
        let to = align_up(new_cursor, self.platform.page_size())?.min(self.total_size);
        let len = to.try_sub(from)?;

        // SAFETY: `from..to` lies inside the reservation and both ends are
        // page aligned (`total_size` is a granularity multiple).
        let result = unsafe { self.platform.commit(base.add(from), len) };
        if let Err(err) = result {
            self.close_after_failure();
            return Err(err);
        }

        #[cfg(feature = "logging")]
        debug!(from, to, "committed region pages");

        self.committed.set(to);
        Ok(())
    }

    fn maybe_decommit(&self) -> MemoryResult<()> {
        let page = self.platform.page_size();
        let threshold = self.config.decommit_threshold_pages.try_mul(page)?;
        let committed = self.committed.get();
        let idle = committed.try_sub(self.cursor.get())?;
        if idle <= threshold || self.last_decommit.get().elapsed() < self.config.decommit_cooldown {
            return Ok(());
        }

        let len = self.config.decommit_pages.try_mul(page)?;
        let new_committed = committed.try_sub(len)?;
        let base = self.reserved_base()?;

        // SAFETY: `new_committed..committed` is committed memory above the
        // cursor, page aligned, and no live span reaches past the cursor.
        let result = unsafe { self.platform.uncommit(base.add(new_committed), len) };
        if let Err(err) = result {
            self.close_after_failure();
            return Err(err);
        }

        #[cfg(feature = "logging")]
        info!(bytes = len, committed = new_committed, "decommitted idle region pages");

        self.committed.set(new_committed);
        self.last_decommit.set(Instant::now());
        Ok(())
    }

    fn close_after_failure(&self) {
        if let RegionBase::Reserved(base) = self.base.replace(RegionBase::Closed) {
            self.checkpoints.borrow_mut().clear();
            // SAFETY: exactly the reservation; state is Closed from here on.
            let released = unsafe { self.platform.release(base, self.total_size) };
            #[cfg(feature = "logging")]
            if let Err(err) = released {
                warn!(error = %err, "failed to release region after OS failure");
            }
            #[cfg(not(feature = "logging"))]
            let _ = released;
        }
    }
}

impl fmt::Debug for ReservedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReservedRegion")
            .field("platform", &self.platform.name())
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Drop for ReservedRegion {
    fn drop(&mut self) {
        if let RegionBase::Reserved(_) = self.base.get() {
            #[cfg(feature = "logging")]
            warn!(size = self.total_size, "region dropped without close, releasing");
            let result = self.close();
            #[cfg(feature = "logging")]
            if let Err(err) = result {
                warn!(error = %err, "best-effort region release failed");
            }
            #[cfg(not(feature = "logging"))]
            let _ = result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{Call, RecordingPlatform};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn eager_config() -> RegionConfig {
        RegionConfig::default().with_decommit_cooldown(Duration::ZERO)
    }

    #[test]
    fn unused_region_makes_no_syscalls() {
        let platform = RecordingPlatform::leaked();
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        region.close().unwrap();
        assert!(platform.calls().is_empty());
    }

    #[test]
    fn first_slice_reserves_and_commits_one_page() {
        let platform = RecordingPlatform::leaked();
        let page = platform.page_size();
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        assert_eq!(region.total_size(), platform.granularity());

        let span = region.slice(8, 8).unwrap();
        assert_eq!(span.len(), 8);
        let snapshot = region.snapshot();
        assert_eq!(snapshot.base, Some(span.cast::<u8>().as_ptr() as usize));
        assert_eq!(snapshot.cursor, 8);
        assert_eq!(snapshot.committed, page);
        assert_eq!(platform.calls(), vec![Call::Reserve(region.total_size()), Call::Commit(0, page)]);

        region.close().unwrap();
    }

    #[test]
    fn decommit_fires_past_threshold() {
        let platform = RecordingPlatform::leaked();
        let page = platform.page_size();
        let region = ReservedRegion::with_platform(128 * page, eager_config(), platform).unwrap();

        let checkpoint = region.checkpoint().unwrap();
        region.slice(70 * page, 1).unwrap();
        assert_eq!(region.snapshot().committed, 70 * page);

        region.rollback(checkpoint).unwrap();
        assert_eq!(region.snapshot().committed, 38 * page);
        assert_eq!(platform.count(|c| matches!(c, Call::Uncommit(..))), 1);
        assert!(platform.calls().contains(&Call::Uncommit(38 * page, 32 * page)));

        // 38 idle pages is under the threshold
        let checkpoint = region.checkpoint().unwrap();
        region.rollback(checkpoint).unwrap();
        assert_eq!(platform.count(|c| matches!(c, Call::Uncommit(..))), 1);

        region.close().unwrap();
    }

    #[test]
    fn threshold_is_strict() {
        let platform = RecordingPlatform::leaked();
        let page = platform.page_size();
        let region = ReservedRegion::with_platform(128 * page, eager_config(), platform).unwrap();

        let checkpoint = region.checkpoint().unwrap();
        region.slice(64 * page, 1).unwrap();
        region.rollback(checkpoint).unwrap();
        assert_eq!(platform.count(|c| matches!(c, Call::Uncommit(..))), 0);
        assert_eq!(region.snapshot().committed, 64 * page);

        region.close().unwrap();
    }

    #[test]
    fn cooldown_suppresses_decommit() {
        let platform = RecordingPlatform::leaked();
        let page = platform.page_size();
        let config = RegionConfig::default().with_decommit_cooldown(Duration::from_secs(3600));
        let region = ReservedRegion::with_platform(256 * page, config, platform).unwrap();

        for _ in 0..3 {
            let checkpoint = region.checkpoint().unwrap();
            region.slice(200 * page, 1).unwrap();
            region.rollback(checkpoint).unwrap();
        }
        assert_eq!(platform.count(|c| matches!(c, Call::Uncommit(..))), 0);

        region.close().unwrap();
    }

    #[test]
    fn back_to_back_rollbacks_decommit_once() {
        let platform = RecordingPlatform::leaked();
        let page = platform.page_size();
        let config = RegionConfig::default().with_decommit_cooldown(Duration::from_millis(300));
        let region = ReservedRegion::with_platform(256 * page, config, platform).unwrap();

        let checkpoint = region.checkpoint().unwrap();
        region.slice(200 * page, 1).unwrap();
        std::thread::sleep(Duration::from_millis(350));
        region.rollback(checkpoint).unwrap();
        assert_eq!(region.snapshot().committed, 168 * page);

        let checkpoint = region.checkpoint().unwrap();
        region.rollback(checkpoint).unwrap();
        assert_eq!(platform.count(|c| matches!(c, Call::Uncommit(..))), 1);
        assert_eq!(region.snapshot().committed, 168 * page);

        region.close().unwrap();
    }

    #[test]
    fn failed_commit_closes_region() {
        let platform = RecordingPlatform::leaked();
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        region.checkpoint().unwrap();

        platform.fail_next_commit();
        let err = region.slice(16, 8).unwrap_err();
        assert_eq!(err, MemoryError::OsOperation { operation: "commit", code: 12 });
        assert!(region.is_closed());
        assert_eq!(platform.count(|c| matches!(c, Call::Release(_))), 1);
        assert!(region.slice(16, 8).unwrap_err().is_invalid_state());
    }

    #[test]
    fn failed_uncommit_closes_region() {
        let platform = RecordingPlatform::leaked();
        let page = platform.page_size();
        let region = ReservedRegion::with_platform(128 * page, eager_config(), platform).unwrap();
        let checkpoint = region.checkpoint().unwrap();
        region.slice(100 * page, 1).unwrap();

        platform.fail_next_uncommit();
        let err = region.rollback(checkpoint).unwrap_err();
        assert_eq!(err.code(), "MEM:OS:FAILED");
        assert!(region.is_closed());
        assert!(region.close().unwrap_err().is_invalid_state());
    }

    #[test]
    fn drop_releases_unclosed_region() {
        let platform = RecordingPlatform::leaked();
        {
            let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
            region.slice(1, 1).unwrap();
        }
        assert_eq!(platform.count(|c| matches!(c, Call::Release(_))), 1);
    }

    #[test]
    fn checkpoint_stack_grows_past_initial_capacity() {
        let platform = RecordingPlatform::leaked();
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        let handles: Vec<_> = (0..9).map(|_| region.checkpoint().unwrap()).collect();
        assert_eq!(handles.last().unwrap().index(), 8);
        for handle in handles.into_iter().rev() {
            region.rollback(handle).unwrap();
        }
        assert_eq!(region.checkpoint_depth(), 0);
        region.close().unwrap();
    }

    #[test]
    fn zero_sized_slice_does_not_move_cursor() {
        let platform = RecordingPlatform::leaked();
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        region.slice(3, 1).unwrap();
        let span = region.slice(0, 64).unwrap();
        assert_eq!(span.len(), 0);
        assert_eq!(span.cast::<u8>().as_ptr() as usize % 64, 0);
        assert_eq!(region.snapshot().cursor, 3);
        region.close().unwrap();
    }

    #[test]
    fn rejects_zero_size_and_bad_alignment() {
        let platform = RecordingPlatform::leaked();
        assert!(matches!(
            ReservedRegion::with_platform(0, RegionConfig::default(), platform),
            Err(MemoryError::InvalidLayout { .. })
        ));
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        assert_eq!(region.slice(8, 12).unwrap_err(), MemoryError::InvalidAlignment { alignment: 12 });
        region.close().unwrap();
    }

    #[test]
    fn rollback_before_first_use_is_invalid() {
        let platform = RecordingPlatform::leaked();
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        assert!(region.rollback(Checkpoint(0)).unwrap_err().is_invalid_state());
        assert!(platform.calls().is_empty());
        region.close().unwrap();
    }

    #[test]
    fn rollback_on_empty_stack_keeps_the_cursor() {
        let platform = RecordingPlatform::leaked();
        let region = ReservedRegion::with_platform(10, RegionConfig::default(), platform).unwrap();
        let checkpoint = region.checkpoint().unwrap();
        region.rollback(checkpoint).unwrap();

        region.slice(48, 16).unwrap();
        let before = region.snapshot();
        assert_eq!(before.checkpoint_depth, 0);

        let err = region.rollback(checkpoint).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(region.snapshot(), before);
        assert_eq!(region.snapshot().cursor, 48);
        region.close().unwrap();
    }
}
