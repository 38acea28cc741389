//! Error types for the maildir store.

use std::{io, path::PathBuf, time};

use thiserror::Error;

/// Maildir errors.
#[derive(Debug, Error)]
pub enum Error {
    /// No message with this key in `new/` or `cur/`.
    #[error("cannot find message {0}")]
    NotFound(String),
    /// A file name that is not valid UTF-8 or lacks a key.
    #[error("invalid message file name {0}")]
    InvalidName(PathBuf),

    #[error(transparent)]
    /// File system error.
    Io(#[from] io::Error),
    #[error(transparent)]
    /// Clock before the Unix epoch while naming a message.
    SystemTime(#[from] time::SystemTimeError),
}

impl Error {
    /// True for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
