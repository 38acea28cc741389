//! Parsed response data.

use crate::types::{Capability, Flag, ResponseCode, Status, StatusInfo, Uid};

/// Untagged server data (`* ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// `OK`, `NO`, `BAD`, `PREAUTH` or `BYE` with optional response code.
    Condition {
        /// Condition kind.
        status: Status,
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `CAPABILITY` listing.
    Capability(Vec<Capability>),
    /// `FLAGS` defined for the selected mailbox.
    Flags(Vec<Flag>),
    /// `n EXISTS`
    Exists(u32),
    /// `n RECENT`
    Recent(u32),
    /// `n EXPUNGE`
    Expunge(u32),
    /// `n FETCH (...)`
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Returned data items.
        items: Vec<FetchItem>,
    },
    /// `STATUS mailbox (...)`
    Status {
        /// Mailbox the values belong to.
        mailbox: String,
        /// Returned values.
        info: StatusInfo,
    },
    /// Any untagged data this client does not interpret, kept verbatim.
    Other(String),
}

impl UntaggedResponse {
    /// True for an untagged `BYE`.
    #[must_use]
    pub const fn is_bye(&self) -> bool {
        matches!(
            self,
            Self::Condition {
                status: Status::Bye,
                ..
            }
        )
    }
}

/// One data item of a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// `UID n`
    Uid(Uid),
    /// `FLAGS (...)`
    Flags(Vec<Flag>),
    /// `RFC822.SIZE n`
    Size(u32),
    /// `INTERNALDATE "..."`
    InternalDate(String),
    /// `BODY[section]` payload; `None` when the server sent NIL.
    Body {
        /// Section specifier, empty for the whole message.
        section: String,
        /// Payload bytes.
        data: Option<Vec<u8>>,
    },
}
