//! Crate-wide error kinds.
//!
//! Mirrors the error kinds in spec.md §7: construction-time errors are
//! fatal to the caller, per-frame decode errors are handled locally by the
//! component that discovers them (see `transport::listener`).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for `meshcast`.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad parameter at construction (connection, descriptor, log writer/reader).
    #[error("config error: {0}")]
    Config(String),

    /// Operation attempted on a closed resource, or a duplicate open.
    #[error("state error: {0}")]
    State(String),

    /// Socket or filesystem I/O failure.
    #[error("transport/io error: {0}")]
    Io(#[from] std::io::Error),

    /// Header, frame, or record line could not be parsed.
    #[error("format error: {0}")]
    Format(String),

    /// Message instance missing mandatory fields or violating key invariants.
    #[error("schema error: {0}")]
    Schema(String),

    /// A startup or shutdown barrier was exceeded.
    #[error("timeout after {0:?} waiting for {1}")]
    Timeout(std::time::Duration, &'static str),

    /// Wraps codec (de)serialization failures.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by `LogWriter`/`LogReader`/`DirectoryReader` construction
/// and iteration, kept distinct from the top-level `Error` the way
/// `hdds-recording::recorder::RecorderError` is kept distinct from
/// `hdds-recording::format::FormatError` — callers that only touch the log
/// layer don't need to match on transport variants.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("path already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<LogError> for Error {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Io(e) => Error::Io(e),
            LogError::Config(s) => Error::Config(s),
            LogError::Format(s) => Error::Format(s),
            LogError::AlreadyExists(p) => Error::Config(format!("path already exists: {}", p.display())),
            LogError::Codec(e) => Error::Codec(e),
        }
    }
}
