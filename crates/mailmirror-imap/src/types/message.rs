//! Messages delivered by streaming FETCH.

use super::{Flag, Uid};
use crate::parser::FetchItem;

/// One message from a FETCH response, built from its data items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedMessage {
    /// Message sequence number.
    pub seq: u32,
    /// UID, when requested or the command was `UID FETCH`.
    pub uid: Option<Uid>,
    /// Current flags.
    pub flags: Vec<Flag>,
    /// `RFC822.SIZE`
    pub size: Option<u32>,
    /// Full message bytes from `BODY[]`.
    pub body: Option<Vec<u8>>,
}

impl FetchedMessage {
    /// Collects FETCH data items into a message.
    #[must_use]
    pub fn from_items(seq: u32, items: Vec<FetchItem>) -> Self {
        let mut message = Self {
            seq,
            ..Self::default()
        };
        for item in items {
            match item {
                FetchItem::Uid(uid) => message.uid = Some(uid),
                FetchItem::Flags(flags) => message.flags = flags,
                FetchItem::Size(size) => message.size = Some(size),
                FetchItem::Body { section, data } if section.is_empty() => message.body = data,
                FetchItem::Body { .. } | FetchItem::InternalDate(_) => {}
            }
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_items() {
        let message = FetchedMessage::from_items(
            3,
            vec![
                FetchItem::Uid(Uid::new(42).unwrap_or_else(|| panic!("uid"))),
                FetchItem::Flags(vec![Flag::Seen]),
                FetchItem::Body {
                    section: String::new(),
                    data: Some(b"hi".to_vec()),
                },
                FetchItem::Body {
                    section: "HEADER".to_string(),
                    data: Some(b"ignored".to_vec()),
                },
            ],
        );
        assert_eq!(message.seq, 3);
        assert_eq!(message.uid.map(Uid::get), Some(42));
        assert_eq!(message.flags, vec![Flag::Seen]);
        assert_eq!(message.body.as_deref(), Some(&b"hi"[..]));
        assert_eq!(message.size, None);
    }
}
