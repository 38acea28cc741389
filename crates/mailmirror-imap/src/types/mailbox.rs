//! Mailbox names and the state reported when one is opened or queried.

use super::{Flags, Uid, UidValidity};

/// Mailbox name as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(String);

impl Mailbox {
    /// Creates a mailbox name. `inbox` in any case is normalized to `INBOX`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("INBOX") {
            Self("INBOX".to_string())
        } else {
            Self(name)
        }
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State announced by the server in response to SELECT.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// Number of messages (`EXISTS`).
    pub exists: u32,
    /// Number of recent messages (`RECENT`).
    pub recent: u32,
    /// Predicted next UID, from the `UIDNEXT` response code.
    pub uid_next: Option<Uid>,
    /// Mailbox generation, from the `UIDVALIDITY` response code.
    pub uid_validity: Option<UidValidity>,
    /// Flags applicable in this mailbox.
    pub flags: Flags,
    /// True if the server opened the mailbox read-only.
    pub read_only: bool,
}

/// Values returned by the STATUS command. Only requested items are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusInfo {
    /// `MESSAGES`
    pub messages: Option<u32>,
    /// `UIDNEXT`
    pub uid_next: Option<u32>,
    /// `UIDVALIDITY`
    pub uid_validity: Option<u32>,
    /// `UNSEEN`
    pub unseen: Option<u32>,
}
