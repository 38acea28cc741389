//! The remote side of synchronization.
//!
//! [`RemoteMailbox`] is everything the reconciler and the session loop need
//! from a server connection. Methods take `&self` so that background tasks
//! can share one connection; implementations serialize commands
//! internally.

#[cfg(test)]
pub(crate) mod fake;
mod imap;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use mailmirror_imap::MAX_LITERAL_SIZE;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use self::imap::{ImapConnector, ImapRemote};
use crate::error::Result;
use crate::flags::FlagSet;

/// State of a folder right after selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedFolder {
    /// Message count.
    pub exists: u32,
    /// UIDVALIDITY.
    pub uid_validity: u32,
    /// UIDNEXT, if reported.
    pub uid_next: Option<u32>,
}

/// One message from a listing or body fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    /// Sequence number.
    pub seq: u32,
    /// UID.
    pub uid: u32,
    /// Synchronized flags.
    pub flags: FlagSet,
    /// `RFC822.SIZE`, when the server reported it.
    pub size: Option<u32>,
    /// Full message, when bodies were requested.
    pub body: Option<Vec<u8>>,
}

/// True if the body of `message` is too large to be fetched.
pub(crate) fn exceeds_fetch_limit(message: &RemoteMessage) -> bool {
    message
        .size
        .is_some_and(|size| usize::try_from(size).map_or(true, |size| size > MAX_LITERAL_SIZE))
}

/// Why an idle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The server reported new or removed messages.
    Changed,
    /// The stop token was canceled.
    Stopped,
}

/// Operations on a server session.
///
/// Listing and fetch methods operate on the most recently selected folder
/// and stream their results into `sink` in server order.
#[async_trait]
pub trait RemoteMailbox: Send + Sync + 'static {
    /// Selects `folder`.
    async fn select(&self, folder: &str) -> Result<SelectedFolder>;

    /// Current message count of `folder`.
    async fn message_count(&self, folder: &str) -> Result<u32>;

    /// UID the next appended message will receive.
    async fn uid_next(&self, folder: &str) -> Result<u32>;

    /// UID and flags of messages `1..=count`.
    async fn list(&self, count: u32, sink: mpsc::Sender<RemoteMessage>) -> Result<()>;

    /// UID, flags and body of the given UIDs.
    async fn fetch_uids(&self, uids: Vec<u32>, sink: mpsc::Sender<RemoteMessage>) -> Result<()>;

    /// UID, flags and body of messages `1..=count`.
    async fn fetch_all(&self, count: u32, sink: mpsc::Sender<RemoteMessage>) -> Result<()>;

    /// Appends a message. Returns the assigned UID when the server reports it.
    async fn append(
        &self,
        folder: &str,
        flags: FlagSet,
        date: Option<DateTime<FixedOffset>>,
        message: Vec<u8>,
    ) -> Result<Option<u32>>;

    /// Adds flags to the given UIDs.
    async fn add_flags(&self, uids: Vec<u32>, flags: FlagSet) -> Result<()>;

    /// Flags the given UIDs deleted and expunges.
    async fn delete_uids(&self, uids: Vec<u32>) -> Result<()>;

    /// Flags messages `1..=count` deleted and expunges.
    async fn delete_all(&self, count: u32) -> Result<()>;

    /// Selects `folder` and waits for a change or for `stop`.
    ///
    /// A server-initiated logout is [`crate::Error::LoggedOut`].
    async fn idle(&self, folder: &str, stop: CancellationToken) -> Result<IdleOutcome>;

    /// Ends the session.
    async fn logout(&self) -> Result<()>;
}

/// Opens authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type.
    type Remote: RemoteMailbox;

    /// Connects and authenticates.
    async fn connect(&self) -> Result<Arc<Self::Remote>>;
}
