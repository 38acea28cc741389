//! Commands on the selected mailbox.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::debug;

use super::{Client, Selected, check_status};
use crate::command::{Command, FetchAttr, StoreOp};
use crate::parser::{Response, UntaggedResponse};
use crate::types::{FetchedMessage, Flag, Mailbox, MailboxStatus, SequenceSet};
use crate::{Error, Result};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// The open mailbox.
    #[must_use]
    pub const fn mailbox(&self) -> &Mailbox {
        &self.state.mailbox
    }

    /// State reported when the mailbox was selected.
    #[must_use]
    pub const fn mailbox_status(&self) -> &MailboxStatus {
        &self.state.status
    }

    /// FETCH by sequence number, delivering each message to `sink` as it
    /// arrives.
    ///
    /// The response is drained to completion even if the receiver is dropped.
    pub async fn fetch_stream(
        &mut self,
        set: &SequenceSet,
        items: &[FetchAttr],
        sink: &mpsc::Sender<FetchedMessage>,
    ) -> Result<()> {
        self.fetch_into(set, items, false, sink).await
    }

    /// `UID FETCH`, streaming like [`Self::fetch_stream`].
    pub async fn uid_fetch_stream(
        &mut self,
        set: &SequenceSet,
        items: &[FetchAttr],
        sink: &mpsc::Sender<FetchedMessage>,
    ) -> Result<()> {
        self.fetch_into(set, items, true, sink).await
    }

    async fn fetch_into(
        &mut self,
        set: &SequenceSet,
        items: &[FetchAttr],
        uid: bool,
        sink: &mpsc::Sender<FetchedMessage>,
    ) -> Result<()> {
        if set.is_empty() {
            return Ok(());
        }
        let tag = self
            .send(&Command::Fetch {
                set: set.clone(),
                items: items.to_vec(),
                uid,
            })
            .await?;

        let mut delivered = 0usize;
        let mut receiver_open = true;
        loop {
            match self.next_response().await? {
                Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                    if receiver_open {
                        let message = FetchedMessage::from_items(seq, items);
                        if sink.send(message).await.is_err() {
                            receiver_open = false;
                        } else {
                            delivered += 1;
                        }
                    }
                }
                Response::Untagged(UntaggedResponse::Condition { status, text, .. })
                    if status == crate::types::Status::Bye =>
                {
                    return Err(Error::Bye(text));
                }
                Response::Untagged(_) => {}
                Response::Continuation { .. } => {
                    return Err(Error::Protocol("unexpected continuation during FETCH".to_string()));
                }
                Response::Tagged {
                    tag: got,
                    status,
                    text,
                    ..
                } => {
                    if got.as_str() != tag {
                        return Err(Error::Protocol(format!(
                            "expected completion for {tag}, got {got}"
                        )));
                    }
                    debug!(delivered, uid, "fetch complete");
                    return check_status(status, text);
                }
            }
        }
    }

    /// `UID STORE`.
    pub async fn uid_store(
        &mut self,
        set: &SequenceSet,
        op: StoreOp,
        flags: &[Flag],
        silent: bool,
    ) -> Result<()> {
        self.store_inner(set, op, flags, true, silent).await
    }

    /// STORE by sequence number.
    pub async fn store(
        &mut self,
        set: &SequenceSet,
        op: StoreOp,
        flags: &[Flag],
        silent: bool,
    ) -> Result<()> {
        self.store_inner(set, op, flags, false, silent).await
    }

    async fn store_inner(
        &mut self,
        set: &SequenceSet,
        op: StoreOp,
        flags: &[Flag],
        uid: bool,
        silent: bool,
    ) -> Result<()> {
        if set.is_empty() {
            return Ok(());
        }
        self.run(&Command::Store {
            set: set.clone(),
            op,
            flags: flags.to_vec(),
            uid,
            silent,
        })
        .await
        .map(|_| ())
    }

    /// EXPUNGE. Returns the expunged sequence numbers in server order.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        let completion = self.run(&Command::Expunge).await?;
        Ok(completion
            .untagged
            .into_iter()
            .filter_map(|untagged| match untagged {
                UntaggedResponse::Expunge(seq) => Some(seq),
                _ => None,
            })
            .collect())
    }
}
