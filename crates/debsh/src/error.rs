//! Error types for debsh
//!
//! The variants follow the shell's failure taxonomy:
//! - parse errors abort the whole line before anything runs
//! - validation and filesystem errors abort a single command
//! - identity errors carry the cause of a rolled-back account transaction
//!
//! Command handlers report ordinary failures through
//! [`ExecResult`](crate::ExecResult) (stderr text plus exit code), the way
//! coreutils do. `Error` is reserved for conditions the dispatcher itself
//! has to act on.

use crate::identity::IdentityError;
use crate::limits::LimitExceeded;
use thiserror::Error;

/// Result type alias using debsh's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for virtual filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// debsh error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A quote opened on the line was never closed.
    #[error("unexpected EOF while looking for matching `{quote}'")]
    UnterminatedQuote { quote: char },

    /// Malformed redirection or pipeline syntax.
    #[error("syntax error: {0}")]
    Parse(String),

    /// Invalid argument, mode, name or option.
    #[error("{0}")]
    Validation(String),

    /// Virtual filesystem failure.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Identity store failure, including rolled-back transactions.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// No builtin or handler registered under this name.
    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// Resource limit exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(#[from] LimitExceeded),

    /// I/O error from a host-side collaborator.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error for unexpected failures.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error aborts the whole line rather than a single command.
    pub fn aborts_line(&self) -> bool {
        matches!(
            self,
            Error::UnterminatedQuote { .. } | Error::Parse(_) | Error::ResourceLimit(_)
        )
    }
}

/// Virtual filesystem errors.
///
/// Display strings match the coreutils wording so handlers can splice them
/// straight into diagnostics (`cat: f: No such file or directory`).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("No such file or directory")]
    NotFound,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Is a directory")]
    IsADirectory,

    #[error("File exists")]
    AlreadyExists,

    #[error("Directory not empty")]
    NotEmpty,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid argument")]
    InvalidPath,

    #[error("filesystem unavailable")]
    Unavailable,
}
