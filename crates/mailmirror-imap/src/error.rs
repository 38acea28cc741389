//! Error types for the IMAP client.

use std::time::Duration;

use thiserror::Error;

/// Errors from IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host name unusable for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Malformed server response.
    #[error("Parse error at position {position}: {message}")]
    Parse {
        /// Byte offset of the failure.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// Authentication rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE and is closing the connection.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Command not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// True if the connection can no longer be used.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Tls(_) | Self::Bye(_) | Self::Timeout(_))
    }
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
