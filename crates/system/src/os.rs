//! Operating system detection
//!
//! The OS is identified once per process from its name and cached. The
//! memory layer uses it to pick a virtual-memory backend.

use std::fmt;

use once_cell::sync::Lazy;

use crate::error::{SystemError, SystemResult};

/// Operating systems with a virtual-memory backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    /// Microsoft Windows
    Windows,
    /// Linux
    Linux,
    /// Apple macOS
    MacOs,
}

static CURRENT: Lazy<SystemResult<Os>> = Lazy::new(|| Os::detect(os_name()));

impl Os {
    /// Parse an OS name, case-insensitively.
    ///
    /// Names containing "windows" map to [`Os::Windows`], "linux" to
    /// [`Os::Linux`], and names containing both "mac" and "os" to
    /// [`Os::MacOs`]. Anything else is unsupported.
    ///
    /// ```
    /// use vmarena_system::Os;
    ///
    /// assert_eq!(Os::detect("Windows 11").unwrap(), Os::Windows);
    /// assert_eq!(Os::detect("Mac OS X").unwrap(), Os::MacOs);
    /// assert!(Os::detect("FreeBSD").is_err());
    /// ```
    pub fn detect(name: &str) -> SystemResult<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.contains("windows") {
            Ok(Self::Windows)
        } else if lower.contains("linux") {
            Ok(Self::Linux)
        } else if lower.contains("mac") && lower.contains("os") {
            Ok(Self::MacOs)
        } else {
            Err(SystemError::unsupported_os(name))
        }
    }

    /// The OS of the running process, detected on first call
    pub fn current() -> SystemResult<Self> {
        CURRENT.clone()
    }

    /// Whether this OS uses the POSIX `mmap` family
    pub fn is_posix(self) -> bool {
        matches!(self, Self::Linux | Self::MacOs)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
        };
        f.write_str(name)
    }
}

fn os_name() -> &'static str {
    std::env::consts::OS
}
