//! The five abstract error kinds of the configuration pipeline and daemon.
//!
//! Every fallible path in this crate returns one of these variants rather
//! than propagating a foreign error type, so callers (CLI exit-code mapping,
//! RPC status mapping) can match on kind without knowing which library
//! raised it.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed user input: bad mount/port/volume shape, unknown directive,
    /// empty destination, unparseable memory string, checked-overflow, bad
    /// platform string.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced resource does not exist: env file, host bind source,
    /// named volume, kernel artifact, default kernel.
    #[error("not found: {0}")]
    NotFound(String),

    /// The system is not in a state that allows the requested operation:
    /// network not running, host OS too old for non-default networks,
    /// container not stopped.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The operation would collide with existing state: a published host
    /// socket path already in use.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else: archive extraction failure, unexpected filesystem
    /// error, RPC transport failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_argument(msg: impl fmt::Display) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    pub fn not_found(msg: impl fmt::Display) -> Self {
        Error::NotFound(msg.to_string())
    }

    pub fn invalid_state(msg: impl fmt::Display) -> Self {
        Error::InvalidState(msg.to_string())
    }

    pub fn conflict(msg: impl fmt::Display) -> Self {
        Error::Conflict(msg.to_string())
    }

    pub fn internal(msg: impl fmt::Display) -> Self {
        Error::Internal(msg.to_string())
    }

    /// Process exit code mapping: 0 is reserved for success, so all error
    /// kinds currently map to 1. Kept as a method rather than inlined at
    /// call sites so a future split (e.g. distinct codes per kind) touches
    /// one place.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(e.to_string()),
            _ => Error::Internal(e.to_string()),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Internal(format!("database error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
