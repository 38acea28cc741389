//! Command construction and serialization.

mod serialize;
mod tag_generator;

use crate::types::{Flag, Mailbox, SequenceSet};

pub use tag_generator::TagGenerator;

use serialize::{write_astring, write_flag_list, write_mailbox};

/// A FETCH data item to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAttr {
    /// `UID`
    Uid,
    /// `FLAGS`
    Flags,
    /// `RFC822.SIZE`
    Size,
    /// `BODY.PEEK[]`: the whole message without setting `\Seen`.
    BodyPeek,
}

impl FetchAttr {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Uid => "UID",
            Self::Flags => "FLAGS",
            Self::Size => "RFC822.SIZE",
            Self::BodyPeek => "BODY.PEEK[]",
        }
    }
}

/// How STORE changes the flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
    /// `FLAGS`
    Replace,
}

/// `STATUS` items this client asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttr {
    /// `MESSAGES`
    Messages,
    /// `UIDNEXT`
    UidNext,
    /// `UIDVALIDITY`
    UidValidity,
    /// `UNSEEN`
    Unseen,
}

impl StatusAttr {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// A client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CAPABILITY`
    Capability,
    /// `NOOP`
    Noop,
    /// `LOGOUT`
    Logout,
    /// `LOGIN user pass`
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// `AUTHENTICATE mech [initial-response]`
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
        /// Base64 initial response (SASL-IR).
        initial_response: Option<String>,
    },
    /// `SELECT mailbox`
    Select {
        /// Mailbox to open.
        mailbox: Mailbox,
    },
    /// `STATUS mailbox (items)`
    Status {
        /// Mailbox to query.
        mailbox: Mailbox,
        /// Requested items.
        items: Vec<StatusAttr>,
    },
    /// `APPEND mailbox (flags) "date" {size}`; the literal follows after
    /// the server's continuation.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Flags to set on the new message.
        flags: Vec<Flag>,
        /// Internal date in IMAP `date-time` form.
        date: Option<String>,
        /// Literal size in bytes.
        size: usize,
    },
    /// `[UID] FETCH set (items)`
    Fetch {
        /// Messages to fetch.
        set: SequenceSet,
        /// Requested items.
        items: Vec<FetchAttr>,
        /// Interpret `set` as UIDs.
        uid: bool,
    },
    /// `[UID] STORE set [+|-]FLAGS[.SILENT] (flags)`
    Store {
        /// Messages to change.
        set: SequenceSet,
        /// Kind of change.
        op: StoreOp,
        /// Flags to apply.
        flags: Vec<Flag>,
        /// Interpret `set` as UIDs.
        uid: bool,
        /// Suppress the untagged FETCH echo.
        silent: bool,
    },
    /// `EXPUNGE`
    Expunge,
    /// `IDLE`
    Idle,
    /// `DONE`, ends IDLE. Sent untagged.
    Done,
}

impl Command {
    /// Serializes the command line, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        if matches!(self, Self::Done) {
            buf.extend_from_slice(b"DONE\r\n");
            return buf;
        }
        buf.extend_from_slice(tag.as_bytes());
        buf.push(b' ');

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),
            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Done => {}
            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(ir) = initial_response {
                    buf.push(b' ');
                    // An empty initial response is sent as "=" (RFC 4959).
                    if ir.is_empty() {
                        buf.push(b'=');
                    } else {
                        buf.extend_from_slice(ir.as_bytes());
                    }
                }
            }
            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_mailbox(&mut buf, mailbox);
            }
            Self::Status { mailbox, items } => {
                buf.extend_from_slice(b"STATUS ");
                write_mailbox(&mut buf, mailbox);
                let names: Vec<&str> = items.iter().map(|i| i.as_str()).collect();
                buf.extend_from_slice(format!(" ({})", names.join(" ")).as_bytes());
            }
            Self::Append {
                mailbox,
                flags,
                date,
                size,
            } => {
                buf.extend_from_slice(b"APPEND ");
                write_mailbox(&mut buf, mailbox);
                if !flags.is_empty() {
                    buf.push(b' ');
                    write_flag_list(&mut buf, flags);
                }
                if let Some(date) = date {
                    buf.extend_from_slice(format!(" \"{date}\"").as_bytes());
                }
                buf.extend_from_slice(format!(" {{{size}}}").as_bytes());
            }
            Self::Fetch { set, items, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                let names: Vec<&str> = items.iter().map(|i| i.as_str()).collect();
                buf.extend_from_slice(format!("FETCH {set} ({})", names.join(" ")).as_bytes());
            }
            Self::Store {
                set,
                op,
                flags,
                uid,
                silent,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                let sign = match op {
                    StoreOp::Add => "+",
                    StoreOp::Remove => "-",
                    StoreOp::Replace => "",
                };
                let suffix = if *silent { ".SILENT" } else { "" };
                buf.extend_from_slice(format!("STORE {set} {sign}FLAGS{suffix} ").as_bytes());
                write_flag_list(&mut buf, flags);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Command name for logs. Never includes credentials.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Select { .. } => "SELECT",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::Fetch { .. } => "FETCH",
            Self::Store { .. } => "STORE",
            Self::Expunge => "EXPUNGE",
            Self::Idle => "IDLE",
            Self::Done => "DONE",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize("A0001")).unwrap()
    }

    #[test]
    fn login_quotes_when_needed() {
        let cmd = Command::Login {
            username: "me@example.com".to_string(),
            password: "two words".to_string(),
        };
        assert_eq!(line(&cmd), "A0001 LOGIN me@example.com \"two words\"\r\n");
    }

    #[test]
    fn authenticate_with_initial_response() {
        let cmd = Command::Authenticate {
            mechanism: "XOAUTH2".to_string(),
            initial_response: Some("dXNlcj0=".to_string()),
        };
        assert_eq!(line(&cmd), "A0001 AUTHENTICATE XOAUTH2 dXNlcj0=\r\n");
    }

    #[test]
    fn select_quotes_mailbox() {
        let cmd = Command::Select {
            mailbox: Mailbox::new("Sent Items"),
        };
        assert_eq!(line(&cmd), "A0001 SELECT \"Sent Items\"\r\n");
    }

    #[test]
    fn status_items() {
        let cmd = Command::Status {
            mailbox: Mailbox::new("INBOX"),
            items: vec![StatusAttr::Messages, StatusAttr::UidNext],
        };
        assert_eq!(line(&cmd), "A0001 STATUS INBOX (MESSAGES UIDNEXT)\r\n");
    }

    #[test]
    fn append_announces_literal() {
        let cmd = Command::Append {
            mailbox: Mailbox::new("sent"),
            flags: vec![Flag::Seen],
            date: Some("01-Feb-2024 10:00:00 +0000".to_string()),
            size: 42,
        };
        assert_eq!(
            line(&cmd),
            "A0001 APPEND sent (\\Seen) \"01-Feb-2024 10:00:00 +0000\" {42}\r\n"
        );
    }

    #[test]
    fn append_without_flags() {
        let cmd = Command::Append {
            mailbox: Mailbox::new("sent"),
            flags: vec![],
            date: None,
            size: 3,
        };
        assert_eq!(line(&cmd), "A0001 APPEND sent {3}\r\n");
    }

    #[test]
    fn uid_fetch() {
        let cmd = Command::Fetch {
            set: [3, 4, 5, 9].into_iter().collect(),
            items: vec![FetchAttr::Uid, FetchAttr::Flags, FetchAttr::BodyPeek],
            uid: true,
        };
        assert_eq!(
            line(&cmd),
            "A0001 UID FETCH 3:5,9 (UID FLAGS BODY.PEEK[])\r\n"
        );
    }

    #[test]
    fn sequence_fetch() {
        let cmd = Command::Fetch {
            set: SequenceSet::range(1, 20).unwrap(),
            items: vec![FetchAttr::Uid, FetchAttr::Flags],
            uid: false,
        };
        assert_eq!(line(&cmd), "A0001 FETCH 1:20 (UID FLAGS)\r\n");
    }

    #[test]
    fn uid_store_silent() {
        let cmd = Command::Store {
            set: SequenceSet::single(7).unwrap(),
            op: StoreOp::Add,
            flags: vec![Flag::Deleted],
            uid: true,
            silent: true,
        };
        assert_eq!(
            line(&cmd),
            "A0001 UID STORE 7 +FLAGS.SILENT (\\Deleted)\r\n"
        );
    }

    #[test]
    fn done_is_untagged() {
        assert_eq!(Command::Done.serialize("A0009"), b"DONE\r\n");
    }

    #[test]
    fn name_hides_credentials() {
        let cmd = Command::Login {
            username: "u".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(cmd.name(), "LOGIN");
    }
}
