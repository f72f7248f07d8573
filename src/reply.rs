//! Server replies.
//!
//! The script subsystem treats a [`Reply`] as opaque: it only ever looks at
//! whether an [`Outcome`] is an error and, if so, what kind.

use crate::{Error, Result};
use bytes::Bytes;

/// The result of executing one command.
pub type Outcome = Result<Reply>;

/// A successful server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// No value. This is a success, not an error.
    Nil,
    /// A simple status string such as `OK`.
    Status(String),
    /// An integer.
    Int(i64),
    /// A binary-safe string.
    Bulk(Bytes),
    /// An ordered list of replies.
    Array(Vec<Reply>),
}

impl Reply {
    /// Creates a bulk reply from anything byte-like.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Creates a status reply.
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// The conventional `OK` status.
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Returns true for [`Reply::Nil`].
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Borrows a status or UTF-8 bulk reply as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(s) => Some(s),
            Reply::Bulk(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the integer value, parsing numeric strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Int(i) => Some(*i),
            other => other.as_str().and_then(|s| s.parse().ok()),
        }
    }

    /// Converts a scalar reply to a string.
    pub fn to_string_value(&self) -> Result<String> {
        match self {
            Reply::Int(i) => Ok(i.to_string()),
            Reply::Status(s) => Ok(s.clone()),
            Reply::Bulk(b) => String::from_utf8(b.to_vec())
                .map_err(|_| Error::protocol("bulk reply is not valid UTF-8")),
            Reply::Nil => Err(Error::protocol("nil reply has no string value")),
            Reply::Array(_) => Err(Error::protocol("array reply has no string value")),
        }
    }

    /// Unwraps an array reply.
    pub fn into_array(self) -> Result<Vec<Reply>> {
        match self {
            Reply::Array(items) => Ok(items),
            other => Err(Error::protocol(format!("expected array reply, got {:?}", other))),
        }
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for Reply {
    fn from(i: i64) -> Self {
        Reply::Int(i)
    }
}
