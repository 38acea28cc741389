//! Per-server workarounds.
//!
//! Selected by configuration, never sniffed from the greeting.

use std::time::Duration;

/// RFC 2177 asks clients to re-issue IDLE at least every 29 minutes.
pub const DEFAULT_IDLE_REFRESH: Duration = Duration::from_secs(29 * 60);

/// Server families with known deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerType {
    /// Standards-following server.
    #[default]
    Generic,
    /// Gmail (imap.gmail.com).
    Gmail,
    /// Outlook / Office 365.
    Outlook,
}

impl ServerType {
    /// Workarounds for this server family.
    #[must_use]
    pub const fn quirks(self) -> ServerQuirks {
        match self {
            Self::Generic => ServerQuirks::standard(),
            // Gmail drops idling clients after about ten minutes.
            Self::Gmail => ServerQuirks {
                idle_refresh: Duration::from_secs(9 * 60),
                ..ServerQuirks::standard()
            },
            // STATUS UIDNEXT goes stale after APPEND until the mailbox is reselected.
            Self::Outlook => ServerQuirks {
                uid_next_requires_select: true,
                ..ServerQuirks::standard()
            },
        }
    }
}

/// Behavior switches for one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerQuirks {
    /// Read `UIDNEXT` by reselecting instead of STATUS.
    pub uid_next_requires_select: bool,
    /// How long one IDLE may last before it is re-issued.
    pub idle_refresh: Duration,
}

impl ServerQuirks {
    /// No workarounds.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            uid_next_requires_select: false,
            idle_refresh: DEFAULT_IDLE_REFRESH,
        }
    }
}

impl Default for ServerQuirks {
    fn default() -> Self {
        Self::standard()
    }
}
