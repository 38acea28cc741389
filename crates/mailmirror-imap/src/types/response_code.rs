//! Bracketed response codes carried by condition responses.

use super::{Capability, Flag, Uid, UidValidity};

/// Response code, e.g. `[UIDNEXT 4392]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `ALERT`
    Alert,
    /// `CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `PERMANENTFLAGS (...)`
    PermanentFlags(Vec<Flag>),
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `TRYCREATE`
    TryCreate,
    /// `UIDNEXT n`
    UidNext(Uid),
    /// `UIDVALIDITY n`
    UidValidity(UidValidity),
    /// `UNSEEN n`
    Unseen(u32),
    /// `APPENDUID validity uid` (RFC 4315)
    AppendUid {
        /// Generation of the target mailbox.
        uid_validity: UidValidity,
        /// UID given to the appended message.
        uid: Uid,
    },
    /// Unrecognized code, kept verbatim.
    Unknown(String),
}
