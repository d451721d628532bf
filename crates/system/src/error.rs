//! Error types for system queries and raw memory calls

use thiserror::Error;

/// Main error type for system operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SystemError {
    /// The running OS is not one the memory layer has a backend for
    #[error("Unsupported operating system: {os}")]
    UnsupportedOs {
        /// OS name as reported by the target
        os: String,
    },

    /// A query to the OS failed
    #[error("Platform error: {message}")]
    PlatformError {
        /// Error message
        message: String,
        /// OS error code if available
        code: Option<i32>,
    },

    /// Raw allocation call returned null
    #[error("Raw allocation of {size} bytes (align {align}) failed")]
    AllocationFailed {
        /// Requested size in bytes
        size: usize,
        /// Requested alignment in bytes
        align: usize,
    },

    /// Alignment is zero, not a power of two, or not a multiple of the pointer size
    #[error("Invalid alignment: {alignment}")]
    InvalidAlignment {
        /// Rejected alignment
        alignment: usize,
    },
}

/// Result type for system operations
pub type SystemResult<T> = Result<T, SystemError>;

impl SystemError {
    /// Create a platform error from the last OS error of the calling thread
    pub fn last_os_error(message: impl Into<String>) -> Self {
        let err = std::io::Error::last_os_error();
        Self::PlatformError { message: format!("{}: {err}", message.into()), code: err.raw_os_error() }
    }

    /// Create an unsupported OS error
    pub fn unsupported_os(os: impl Into<String>) -> Self {
        let os = os.into();
        #[cfg(feature = "logging")]
        tracing::error!(os = %os, "unsupported operating system");
        Self::UnsupportedOs { os }
    }

    /// Get error code for categorization
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedOs { .. } => "SYS:UNSUPPORTED_OS",
            Self::PlatformError { .. } => "SYS:PLATFORM",
            Self::AllocationFailed { .. } => "SYS:ALLOC_FAILED",
            Self::InvalidAlignment { .. } => "SYS:INVALID_ALIGN",
        }
    }

    /// OS error code carried by the error, if any
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::PlatformError { code, .. } => *code,
            _ => None,
        }
    }
}
