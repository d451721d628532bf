//! Page geometry of the host
//!
//! Both values are queried once and cached. On POSIX the allocation
//! granularity is the page size; on Windows reservations are aligned to
//! `dwAllocationGranularity` (typically 64 KiB) while commits happen in
//! `dwPageSize` units.
//!
//! [`try_page_size`] and [`try_allocation_granularity`] report a failed
//! query; [`page_size`] and [`allocation_granularity`] fall back to 4 KiB.

use once_cell::sync::Lazy;

use crate::error::{SystemError, SystemResult};

#[derive(Debug, Clone, Copy)]
struct Geometry {
    page_size: usize,
    granularity: usize,
}

const FALLBACK_PAGE_SIZE: usize = 4096;

static GEOMETRY: Lazy<SystemResult<Geometry>> = Lazy::new(|| {
    let geometry = query();
    #[cfg(feature = "logging")]
    if let Err(err) = &geometry {
        tracing::warn!(error = %err, fallback = FALLBACK_PAGE_SIZE, "page size query failed");
    }
    geometry
});

/// Size of a virtual memory page in bytes, or the query failure
pub fn try_page_size() -> SystemResult<usize> {
    GEOMETRY.clone().map(|g| g.page_size)
}

/// Reservation granularity in bytes, or the query failure
pub fn try_allocation_granularity() -> SystemResult<usize> {
    GEOMETRY.clone().map(|g| g.granularity)
}

/// Size of a virtual memory page in bytes
#[inline]
pub fn page_size() -> usize {
    try_page_size().unwrap_or(FALLBACK_PAGE_SIZE)
}

/// Alignment and size unit of address-space reservations
#[inline]
pub fn allocation_granularity() -> usize {
    try_allocation_granularity().unwrap_or(FALLBACK_PAGE_SIZE)
}

#[cfg(any(unix, windows))]
fn checked_page_size(raw: i64, call: &str) -> SystemResult<usize> {
    match usize::try_from(raw) {
        Ok(size) if size.is_power_of_two() => Ok(size),
        _ => Err(SystemError::PlatformError {
            message: format!("{call} reported page size {raw}"),
            code: None,
        }),
    }
}

#[cfg(unix)]
fn query() -> SystemResult<Geometry> {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw == -1 {
        return Err(SystemError::last_os_error("sysconf(_SC_PAGESIZE)"));
    }
    let page_size = checked_page_size(i64::from(raw), "sysconf(_SC_PAGESIZE)")?;
    Ok(Geometry { page_size, granularity: page_size })
}

#[cfg(windows)]
fn query() -> SystemResult<Geometry> {
    use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};

    // SAFETY: SYSTEM_INFO is a plain C struct, zeroed is a valid bit pattern,
    // and GetSystemInfo only writes into the struct we own.
    let info = unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info
    };
    let page_size = checked_page_size(i64::from(info.dwPageSize), "GetSystemInfo")?;
    let granularity = (info.dwAllocationGranularity as usize).max(page_size);
    Ok(Geometry { page_size, granularity })
}

#[cfg(not(any(unix, windows)))]
fn query() -> SystemResult<Geometry> {
    Err(SystemError::PlatformError { message: "no page size query for this target".into(), code: None })
}
