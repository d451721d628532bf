//! Error types for vmarena-memory
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;
use vmarena_system::SystemError;

#[cfg(feature = "logging")]
use tracing::error;

// ============================================================================
// Main Error Type
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Invalid memory layout: {reason}")]
    InvalidLayout { reason: String },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    #[error("Invalid alignment: {alignment}")]
    InvalidAlignment { alignment: usize },

    // --- Region Errors ---
    #[error("Region capacity exceeded: cursor would reach {requested} bytes of {capacity}")]
    OutOfBounds { requested: usize, capacity: usize },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    // --- Platform Errors ---
    #[error("OS operation '{operation}' failed (code {code})")]
    OsOperation { operation: &'static str, code: i32 },

    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    System(#[from] SystemError),
}

impl MemoryError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::InvalidLayout { .. } => "MEM:ALLOC:LAYOUT",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::OutOfBounds { .. } => "MEM:REGION:BOUNDS",
            Self::InvalidState { .. } => "MEM:SYSTEM:STATE",
            Self::OsOperation { .. } => "MEM:OS:FAILED",
            Self::UnsupportedPlatform { .. } => "MEM:OS:UNSUPPORTED",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::System(_) => "MEM:SYSTEM",
        }
    }

    /// Use of a closed object, double close, or out-of-order rollback
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// A slice request that would run past the end of its region
    #[must_use]
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. })
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, align, "memory allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create invalid layout error
    pub fn invalid_layout(reason: &str) -> Self {
        Self::InvalidLayout { reason: reason.to_string() }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        #[cfg(feature = "logging")]
        error!(operation, "address arithmetic overflowed");

        Self::SizeOverflow { operation: operation.to_string() }
    }

    /// Create invalid alignment error
    pub fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Create out of bounds error
    pub fn out_of_bounds(requested: usize, capacity: usize) -> Self {
        Self::OutOfBounds { requested, capacity }
    }

    /// Create invalid state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        #[cfg(feature = "logging")]
        error!(reason = %reason, "invalid allocator state");

        Self::InvalidState { reason }
    }

    /// Create OS operation error from the calling thread's last OS error
    pub fn last_os_error(operation: &'static str) -> Self {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        Self::os_operation(operation, code)
    }

    /// Create OS operation error with an explicit platform code
    pub fn os_operation(operation: &'static str, code: i32) -> Self {
        #[cfg(feature = "logging")]
        error!(operation, code, "OS memory operation failed");

        Self::OsOperation { operation, code }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig { reason: reason.to_string() }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

// ============================================================================
// Tests
// ============================================================================
