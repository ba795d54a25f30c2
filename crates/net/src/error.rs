//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
///
/// Every session operation resolves to `Ok` or one of these.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out")]
    Timeout,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists")]
    AlreadyExists,

    #[error("Not found")]
    NotFound,

    #[error("Limit reached: {0}")]
    LimitReached(usize),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),
}

/// Broad error classes, for callers deciding how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The link is unusable (IO, closed stream, garbled frames)
    Connection,
    /// No answer in time
    Timeout,
    /// Rejected locally before anything was sent
    Validation,
    /// The server said no
    Application,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::ConnectionClosed | Error::Protocol(_) | Error::NotConnected => {
                ErrorKind::Connection
            }
            Error::Timeout => ErrorKind::Timeout,
            Error::InvalidArgument(_) => ErrorKind::Validation,
            Error::AlreadyExists
            | Error::NotFound
            | Error::LimitReached(_)
            | Error::IllegalState(_)
            | Error::Rejected(_) => ErrorKind::Application,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

impl From<bship_core::Error> for Error {
    fn from(e: bship_core::Error) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}
