//! # mailmirror-imap
//!
//! Async IMAP4rev1 client covering what a mirroring daemon needs: TLS
//! connect, LOGIN and SASL authentication, SELECT/STATUS/APPEND, streaming
//! FETCH, STORE, EXPUNGE and IDLE.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailmirror_imap::{Client, FetchAttr, SequenceSet, connection::connect_tls};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> mailmirror_imap::Result<()> {
//!     let stream = connect_tls("imap.example.com", 993).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.login("user@example.com", "password").await?;
//!     let mut client = client.select("INBOX").await?;
//!
//!     let (tx, mut rx) = mpsc::channel(10);
//!     let set = SequenceSet::range(1, 10).unwrap();
//!     let reader = tokio::spawn(async move {
//!         while let Some(message) = rx.recv().await {
//!             println!("{:?}", message.uid);
//!         }
//!     });
//!     client.fetch_stream(&set, &[FetchAttr::Uid, FetchAttr::Flags], &tx).await?;
//!     drop(tx);
//!     reader.await.ok();
//!
//!     client.logout().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! NotAuthenticated ── login()/authenticate() ──→ Authenticated
//! Authenticated    ── select() ──────────────────→ Selected
//! Selected         ── select() ──────────────────→ Selected
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command model and serialization
//! - [`connection`]: transports, framing, type-state client, IDLE
//! - [`parser`]: sans-I/O response parser
//! - [`quirks`]: per-server workarounds
//! - [`types`]: flags, identifiers, sequence sets, mailbox state

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod quirks;
pub mod types;

pub use command::{Command, FetchAttr, StatusAttr, StoreOp, TagGenerator};
pub use connection::{
    Authenticated, Client, FramedStream, IdleEvent, IdleHandle, ImapStream, LoggedIn,
    MAX_LITERAL_SIZE, NotAuthenticated, SelectOutcome, Selected, connect_tls,
};
pub use error::{Error, Result};
pub use parser::{Response, ResponseParser, UntaggedResponse};
pub use quirks::{ServerQuirks, ServerType};
pub use types::{
    Capability, FetchedMessage, Flag, Flags, Mailbox, MailboxStatus, ResponseCode, SequenceSet,
    StatusInfo, Status, Tag, Uid, UidValidity,
};
