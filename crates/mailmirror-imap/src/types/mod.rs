//! Core IMAP types.

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod message;
mod response_code;
mod sequence;

pub use capability::{Capability, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{Tag, Uid, UidValidity};
pub use mailbox::{Mailbox, MailboxStatus, StatusInfo};
pub use message::FetchedMessage;
pub use response_code::ResponseCode;
pub use sequence::SequenceSet;
