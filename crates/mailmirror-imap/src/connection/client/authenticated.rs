//! Commands available once logged in.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite};

use super::{Authenticated, Client, Completion, LoggedIn, Selected};
use crate::command::{Command, StatusAttr};
use crate::parser::UntaggedResponse;
use crate::types::{Flag, Mailbox, MailboxStatus, ResponseCode, StatusInfo, Uid};
use crate::{Error, Result};

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
    State: LoggedIn,
{
    /// Opens a mailbox read-write.
    ///
    /// From `Selected` this reselects, which also refreshes `UIDNEXT`.
    pub async fn select(mut self, mailbox: &str) -> Result<Client<S, Selected>> {
        let mailbox = Mailbox::new(mailbox);
        let completion = self
            .run(&Command::Select {
                mailbox: mailbox.clone(),
            })
            .await?;
        Ok(self.into_state(selected_state(mailbox, completion)))
    }

    /// Like [`Self::select`], but a `NO` or `BAD` completion hands the
    /// client back in the authenticated state, where the server leaves it.
    pub async fn try_select(mut self, mailbox: &str) -> Result<SelectOutcome<S>> {
        let mailbox = Mailbox::new(mailbox);
        match self
            .run(&Command::Select {
                mailbox: mailbox.clone(),
            })
            .await
        {
            Ok(completion) => Ok(SelectOutcome::Selected(
                self.into_state(selected_state(mailbox, completion)),
            )),
            Err(err @ (Error::No(_) | Error::Bad(_))) => {
                Ok(SelectOutcome::Refused(self.into_state(Authenticated), err))
            }
            Err(err) => Err(err),
        }
    }

    /// Queries mailbox counters without selecting it.
    pub async fn status(&mut self, mailbox: &str, items: &[StatusAttr]) -> Result<StatusInfo> {
        let mailbox = Mailbox::new(mailbox);
        let completion = self
            .run(&Command::Status {
                mailbox: mailbox.clone(),
                items: items.to_vec(),
            })
            .await?;

        completion
            .untagged
            .into_iter()
            .find_map(|untagged| match untagged {
                UntaggedResponse::Status { mailbox: name, info }
                    if Mailbox::new(name.as_str()) == mailbox =>
                {
                    Some(info)
                }
                _ => None,
            })
            .ok_or_else(|| Error::Protocol(format!("no STATUS data for {mailbox}")))
    }

    /// Appends a message. Returns the assigned UID when the server reports
    /// `APPENDUID` (RFC 4315).
    pub async fn append(
        &mut self,
        mailbox: &str,
        flags: &[Flag],
        date: Option<String>,
        message: &[u8],
    ) -> Result<Option<Uid>> {
        let tag = self
            .send(&Command::Append {
                mailbox: Mailbox::new(mailbox),
                flags: flags.to_vec(),
                date,
                size: message.len(),
            })
            .await?;
        self.await_continuation(&tag).await?;

        let mut literal = Vec::with_capacity(message.len() + 2);
        literal.extend_from_slice(message);
        literal.extend_from_slice(b"\r\n");
        self.stream.write_all(&literal).await?;

        let completion = self.complete(&tag).await?;
        Ok(match completion.code {
            Some(ResponseCode::AppendUid { uid, .. }) => Some(uid),
            _ => None,
        })
    }
}

/// Result of [`Client::try_select`].
pub enum SelectOutcome<S> {
    /// The mailbox is open.
    Selected(Client<S, Selected>),
    /// The server refused the mailbox.
    Refused(Client<S, Authenticated>, Error),
}

fn selected_state(mailbox: Mailbox, completion: Completion) -> Selected {
    let mut status = MailboxStatus::default();
    for untagged in completion.untagged {
        match untagged {
            UntaggedResponse::Exists(n) => status.exists = n,
            UntaggedResponse::Recent(n) => status.recent = n,
            UntaggedResponse::Flags(flags) => status.flags = flags.into_iter().collect(),
            UntaggedResponse::Condition { code: Some(code), .. } => match code {
                ResponseCode::UidNext(uid) => status.uid_next = Some(uid),
                ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
                _ => {}
            },
            _ => {}
        }
    }
    status.read_only = matches!(completion.code, Some(ResponseCode::ReadOnly));
    Selected { mailbox, status }
}
