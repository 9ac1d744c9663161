//! Error reporting.
//!
//! [`OsError`] is a snapshot of `errno` taken right after a failing syscall.
//! [`Error`] wraps it with the operation that failed, and
//! [`Error::category`] sorts failures into the classes callers build retry
//! policies on.

use std::{fmt, io};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// An OS error code and its description, captured at the failure site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsError {
    code: i32,
    message: String,
}

impl OsError {
    /// Captures the calling thread's last OS error.
    ///
    /// Must run immediately after the failing call; any syscall in between
    /// may overwrite the value.
    pub fn last() -> Self {
        let err = io::Error::last_os_error();
        Self::from_code(err.raw_os_error().unwrap_or(0))
    }

    pub fn from_code(code: i32) -> Self {
        let described = io::Error::from_raw_os_error(code).to_string();
        let suffix = format!(" (os error {code})");
        let message = match described.strip_suffix(&suffix) {
            Some(m) => m.to_owned(),
            None => described,
        };
        Self { code, message }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `EAGAIN`/`EWOULDBLOCK`: retry once the descriptor is ready.
    pub fn is_would_block(&self) -> bool {
        self.code == libc::EAGAIN || self.code == libc::EWOULDBLOCK
    }

    pub fn is_in_progress(&self) -> bool {
        self.code == libc::EINPROGRESS
    }

    pub fn is_interrupted(&self) -> bool {
        self.code == libc::EINTR
    }

    fn is_exhaustion(&self) -> bool {
        matches!(
            self.code,
            libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM
        )
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.message, self.code)
    }
}

impl std::error::Error for OsError {}

impl From<OsError> for io::Error {
    fn from(e: OsError) -> Self {
        io::Error::from_raw_os_error(e.code)
    }
}

/// Failure classes a caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The OS ran out of descriptors or buffers. Back off and retry.
    ResourceExhaustion,
    /// Address text did not parse, or the kernel handed back a foreign
    /// address family.
    AddressTranslation,
    /// Would-block, interrupted or in-progress. Retry when ready.
    Transient,
    /// The socket's state or the peer made the call fail.
    ConnectionState,
    /// A socket option the platform should always accept was rejected.
    /// Indicates a logic or portability bug; callers should fail fast.
    Platform,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        source: OsError,
    },

    #[error("invalid IPv6 address {text:?}")]
    Address { text: String },

    #[error("unexpected address family {family}")]
    AddressFamily { family: i32 },

    #[error("platform rejected socket option {option}: {source}")]
    Platform {
        option: &'static str,
        source: OsError,
    },

    #[error("server is not running")]
    NotRunning,
}

impl Error {
    pub(crate) fn os(op: &'static str) -> impl FnOnce(OsError) -> Error {
        move |source| Error::Os { op, source }
    }

    pub(crate) fn platform(option: &'static str) -> impl FnOnce(OsError) -> Error {
        move |source| Error::Platform { option, source }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Os { source, .. } if source.is_exhaustion() => {
                ErrorCategory::ResourceExhaustion
            }
            Error::Os { source, .. }
                if source.is_would_block()
                    || source.is_interrupted()
                    || source.is_in_progress() =>
            {
                ErrorCategory::Transient
            }
            Error::Os { .. } | Error::NotRunning => ErrorCategory::ConnectionState,
            Error::Address { .. } | Error::AddressFamily { .. } => {
                ErrorCategory::AddressTranslation
            }
            Error::Platform { .. } => ErrorCategory::Platform,
        }
    }

    /// The OS error behind this failure, if one exists.
    pub fn os_error(&self) -> Option<&OsError> {
        match self {
            Error::Os { source, .. } | Error::Platform { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn os_code(&self) -> Option<i32> {
        self.os_error().map(OsError::code)
    }

    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::Os { source, .. } if source.is_would_block())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Os { source, .. } | Error::Platform { source, .. } => {
                io::Error::from_raw_os_error(source.code()).kind()
            }
            Error::Address { .. } | Error::AddressFamily { .. } => {
                io::ErrorKind::InvalidInput
            }
            Error::NotRunning => io::ErrorKind::NotConnected,
        };
        io::Error::new(kind, e)
    }
}
