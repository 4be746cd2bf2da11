//! Error types for the scd channel service

use std::io;

/// Result type alias for scd operations
pub type Result<T> = std::result::Result<T, ScdError>;

/// Failures returned by channel, session and relay operations.
///
/// Every failure is returned to the immediate caller; none of them leave a
/// partially applied cursor or counter change behind.
#[derive(Debug, thiserror::Error)]
pub enum ScdError {
    /// A non-blocking call could not make progress
    #[error("operation would block")]
    WouldBlock,

    /// A blocking wait was aborted through an interrupter
    #[error("blocking wait interrupted")]
    Interrupted,

    /// Bytes could not be moved to or from the caller buffer
    #[error("bad caller buffer: {requested} bytes requested, buffer holds {available}")]
    Fault { requested: usize, available: usize },

    /// Malformed control request or configuration value
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Channel storage could not be allocated
    #[error("cannot allocate {capacity}-byte channel buffer")]
    ResourceExhausted { capacity: usize },

    /// Session was not opened with the access mode the call needs
    #[error("session not opened for {operation}")]
    BadMode { operation: &'static str },

    /// No channel behind the requested node or index
    #[error("no such device: {name}")]
    NoDevice { name: String },

    /// I/O failure outside the channel (source files, inotify)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },
}

impl ScdError {
    /// Create an I/O error with context
    pub fn from_io(source: io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a no-device error
    pub fn no_device(name: impl Into<String>) -> Self {
        Self::NoDevice { name: name.into() }
    }

    /// `true` for the two conditions a caller may retry: `WouldBlock` and `Interrupted`
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WouldBlock | Self::Interrupted)
    }
}

impl From<io::Error> for ScdError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<ScdError> for io::Error {
    fn from(err: ScdError) -> Self {
        let kind = match &err {
            ScdError::WouldBlock => io::ErrorKind::WouldBlock,
            ScdError::Interrupted => io::ErrorKind::Interrupted,
            ScdError::Fault { .. } | ScdError::InvalidArgument { .. } => {
                io::ErrorKind::InvalidInput
            }
            ScdError::ResourceExhausted { .. } => io::ErrorKind::OutOfMemory,
            ScdError::BadMode { .. } => io::ErrorKind::PermissionDenied,
            ScdError::NoDevice { .. } => io::ErrorKind::NotFound,
            ScdError::Io { source, .. } => source.kind(),
        };
        match err {
            ScdError::Io { source, .. } => source,
            other => io::Error::new(kind, other),
        }
    }
}
