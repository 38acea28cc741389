//! Error types for the synchronization engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from synchronization.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailmirror_imap::Error),

    /// Local store operation failed.
    #[error("Maildir error: {0}")]
    Maildir(#[from] mailmirror_maildir::Error),

    /// Token refresh failed.
    #[error("OAuth error: {0}")]
    OAuth(#[from] mailmirror_oauth::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A message could not be processed.
    #[error("Message error: {0}")]
    Message(String),

    /// Invalid account configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server renumbered a folder since the mapping was recorded.
    #[error("UIDVALIDITY mismatch for {folder}: stored {stored}, server reports {reported}")]
    UidValidityMismatch {
        /// Folder title.
        folder: String,
        /// Value in the sync state.
        stored: u32,
        /// Value from SELECT.
        reported: u32,
    },

    /// An archive shard path exists but is not a directory.
    #[error("Archive corrupt: {0} is not a directory")]
    ArchiveCorrupt(PathBuf),

    /// The persisted sync state could not be parsed.
    #[error("Sync state {path} is corrupt: {source}")]
    StateCorrupt {
        /// State file.
        path: PathBuf,
        /// Parse failure.
        source: serde_json::Error,
    },

    /// The server ended the session.
    #[error("Logged out by server: {0}")]
    LoggedOut(String),
}

impl Error {
    /// True if the process must stop instead of reconnecting.
    ///
    /// Corrupt state, a corrupt archive, a UIDVALIDITY change and bad
    /// configuration need an operator; anything else is retried with a new
    /// session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UidValidityMismatch { .. }
                | Self::ArchiveCorrupt(_)
                | Self::StateCorrupt { .. }
                | Self::Config(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
