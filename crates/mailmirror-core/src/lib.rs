//! # mailmirror-core
//!
//! Bidirectional synchronization between IMAP folders and local maildirs.
//!
//! This crate provides:
//! - Account configuration with provider presets
//! - The persisted UID to key mapping
//! - Message transcoding to a canonical header set
//! - The four-phase reconciliation pass
//! - A content-addressed archive for oversized messages
//! - The connect, sync, idle session loop
//!
//! The remote side is abstracted by [`RemoteMailbox`], implemented over
//! IMAP by [`ImapRemote`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod config;
mod error;
pub mod flags;
pub mod memory;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod transcode;

pub use archive::Archive;
pub use config::{AccountType, Config, Credentials, FolderConfig};
pub use error::{Error, Result};
pub use flags::{Flag, FlagSet};
pub use memory::{FolderMapping, Memory, State};
pub use reconcile::{PassReport, Reconciler};
pub use remote::{
    Connector, IdleOutcome, ImapConnector, ImapRemote, RemoteMailbox, RemoteMessage,
    SelectedFolder,
};
pub use session::{RECONNECT_BACKOFF, Session, Signal, Wake, WakeReason};
