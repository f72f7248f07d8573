//! Error types for kvlua.
//!
//! Every failure a command can end in is an [`Error`]. Errors are `Clone` so
//! that a single batch-level failure can be handed to every group of the
//! affected round trip.

use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// The result type used throughout kvlua.
pub type Result<T> = std::result::Result<T, Error>;

/// Error code the server uses when an identity is not in its script cache.
pub const NO_SCRIPT_CODE: &str = "NOSCRIPT";

/// The error type for kvlua operations.
#[derive(Debug, Clone, ThisError)]
pub enum Error {
    /// The server replied with an error.
    #[error("{0}")]
    Server(ServerError),

    /// An I/O error occurred while talking to the server.
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),

    /// The caller's deadline passed before the command completed.
    #[error("Deadline exceeded")]
    Timeout,

    /// The caller canceled the command.
    #[error("Operation canceled")]
    Canceled,

    /// The server (or the client adapter) broke the request/reply contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The connection or server has been closed.
    #[error("Client closed")]
    Closed,

    /// An invalid argument or configuration was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Coarse classification of an [`Error`], used to decide whether a fallback
/// call is warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server does not recognize the script identity.
    CacheMiss,
    /// Any other server-reported failure, e.g. a runtime error in the script.
    Script,
    /// Connection, timeout, cancellation or protocol failure.
    Transport,
    /// Local misuse detected before anything was sent.
    Config,
}

impl Error {
    /// Creates a server error from the raw error text.
    pub fn server(msg: impl Into<String>) -> Self {
        Error::Server(ServerError::new(msg))
    }

    /// Creates a new protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Server(e) if e.is_no_script() => ErrorKind::CacheMiss,
            Error::Server(_) => ErrorKind::Script,
            Error::Io(_) | Error::Timeout | Error::Canceled | Error::Protocol(_) | Error::Closed => {
                ErrorKind::Transport
            }
            Error::InvalidArgument(_) => ErrorKind::Config,
        }
    }

    /// Returns true if the server reported an unknown script identity.
    pub fn is_cache_miss(&self) -> bool {
        self.kind() == ErrorKind::CacheMiss
    }

    /// Returns the server error, if this is one.
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

/// An error reply sent by the server, kept verbatim.
///
/// By convention the first word is an upper-case error code (`ERR`,
/// `NOSCRIPT`, `WRONGTYPE`, ...) followed by a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    message: String,
}

impl ServerError {
    /// Wraps raw server error text.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// The full error text as sent by the server.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The leading error code.
    pub fn code(&self) -> &str {
        self.message.split_whitespace().next().unwrap_or("")
    }

    /// Returns true if this is the server's script cache-miss reply.
    pub fn is_no_script(&self) -> bool {
        self.code() == NO_SCRIPT_CODE
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ServerError {}
