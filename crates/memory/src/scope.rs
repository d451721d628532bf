//! Thread-local region binding
//!
//! [`RegionScope::enter`] binds a region to the current thread until the
//! returned guard drops, at which point the previous binding (if any) is
//! restored. Guards nest and must drop in reverse order of creation.
//! [`AllocatorFactory::new_instance`](crate::allocator::AllocatorFactory::new_instance)
//! reads the binding.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::region::ReservedRegion;

thread_local! {
    static BOUND_REGION: RefCell<Option<Rc<ReservedRegion>>> = const { RefCell::new(None) };
}

/// Guard for a thread-local region binding
#[must_use = "the region is unbound as soon as the guard drops"]
#[derive(Debug)]
pub struct RegionScope {
    previous: Option<Rc<ReservedRegion>>,
    // bound to the creating thread
    _not_send: PhantomData<*const ()>,
}

impl RegionScope {
    /// Bind `region` to the current thread
    pub fn enter(region: Rc<ReservedRegion>) -> Self {
        let previous = BOUND_REGION.with(|bound| bound.replace(Some(region)));
        Self { previous, _not_send: PhantomData }
    }

    /// Region bound to the current thread
    pub fn current() -> Option<Rc<ReservedRegion>> {
        BOUND_REGION.with(|bound| bound.borrow().clone())
    }

    /// Whether a region is bound to the current thread
    pub fn is_bound() -> bool {
        BOUND_REGION.with(|bound| bound.borrow().is_some())
    }
}

impl Drop for RegionScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // thread-local may already be gone during thread teardown
        let _ = BOUND_REGION.try_with(|bound| bound.replace(previous));
    }
}
