//! Error types for gridio.

use crate::plugin::PluginError;
use rustix::io::Errno;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using gridio's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type returned by backend actions.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Main error type for dispatch, registry and bookkeeping operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// No loaded backend claims the URL for this operation.
    #[error("[{operation}] protocol not supported or url invalid: {url}")]
    ProtocolNotSupported {
        /// Dispatching operation.
        operation: &'static str,
        /// The URL that nobody claimed.
        url: String,
    },

    /// Unknown descriptor key or a handle whose owner is not registered.
    #[error("bad file descriptor: {0}")]
    BadFileDescriptor(String),

    /// Empty URL, empty read/write buffer, or another unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The descriptor table reached its size limit.
    #[error("too many open files")]
    TooManyOpenFiles,

    /// Cache miss or unknown plugin name.
    #[error("not found: {0}")]
    NotFound(String),

    /// A two-URL operation resolved to two different backends.
    #[error(
        "[{operation}] source and destination are served by different plugins \
         ({source_plugin} -> {destination_plugin})"
    )]
    CrossBackend {
        /// Dispatching operation.
        operation: &'static str,
        /// Backend serving the first URL.
        source_plugin: String,
        /// Backend serving the second URL.
        destination_plugin: String,
    },

    /// The seek of an emulated positioned I/O landed somewhere else.
    #[error("[{operation}] inconsistent seek: requested offset {requested}, backend returned {actual}")]
    Overflow {
        /// Dispatching operation.
        operation: &'static str,
        /// Offset the caller asked for.
        requested: u64,
        /// Offset the backend reported.
        actual: u64,
    },

    /// Plugin discovery failed. The failure is sticky for the registry.
    #[error("plugin discovery failed: {0}")]
    Discovery(#[source] Arc<PluginError>),

    /// Error reported by the backend itself.
    #[error("[{operation}] {source}")]
    Backend {
        /// Dispatching operation.
        operation: &'static str,
        /// The backend's error, unmodified.
        #[source]
        source: BackendError,
    },
}

impl Error {
    /// Wrap a backend error with the name of the dispatching operation.
    pub fn backend(operation: &'static str, source: BackendError) -> Self {
        Error::Backend { operation, source }
    }

    /// POSIX errno equivalent, for callers exposing a C-like surface.
    pub fn errno(&self) -> Errno {
        match self {
            Error::ProtocolNotSupported { .. } => Errno::PROTONOSUPPORT,
            Error::BadFileDescriptor(_) => Errno::BADF,
            Error::InvalidArgument(_) => Errno::INVAL,
            Error::TooManyOpenFiles => Errno::MFILE,
            Error::NotFound(_) => Errno::NOENT,
            Error::CrossBackend { .. } => Errno::XDEV,
            Error::Overflow { .. } => Errno::OVERFLOW,
            Error::Discovery(_) => Errno::INVAL,
            Error::Backend { source, .. } => source.errno(),
        }
    }

    /// The backend error, if this error came from a backend.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Error::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error returned by a backend action: an errno and a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    errno: Errno,
    message: String,
}

impl BackendError {
    /// Create a new backend error.
    pub fn new(errno: Errno, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
        }
    }

    /// The action is not implemented by this backend.
    pub fn unsupported(action: &str) -> Self {
        Self::new(Errno::NOSYS, format!("{action} is not implemented"))
    }

    /// The errno reported by the backend.
    pub fn errno(&self) -> Errno {
        self.errno
    }

    /// The backend's message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error reports a missing action.
    pub fn is_unsupported(&self) -> bool {
        self.errno == Errno::NOSYS
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.message, self.errno.raw_os_error())
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        let errno = Errno::from_io_error(&err).unwrap_or(Errno::IO);
        Self::new(errno, err.to_string())
    }
}
