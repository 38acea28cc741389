//! IDLE (RFC 2177).
//!
//! The handle borrows the client for the whole IDLE. Waiting is cancel-safe:
//! a response that is still arriving when `wait` returns stays buffered.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use super::client::{Client, Selected, check_status};
use crate::command::Command;
use crate::parser::{Response, UntaggedResponse};
use crate::types::Status;
use crate::{Error, Result};

/// Outcome of waiting in IDLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// New message count (`EXISTS`).
    Exists(u32),
    /// New recent count (`RECENT`).
    Recent(u32),
    /// A message was removed (`EXPUNGE`), by sequence number.
    Expunge(u32),
    /// The caller's stop future completed.
    Stopped,
    /// The refresh interval elapsed without a mailbox change.
    Timeout,
}

impl IdleEvent {
    /// True for events that mean the mailbox contents changed.
    #[must_use]
    pub const fn is_mailbox_change(self) -> bool {
        matches!(self, Self::Exists(_) | Self::Recent(_) | Self::Expunge(_))
    }
}

/// An IDLE in progress. Finish it with [`IdleHandle::done`].
pub struct IdleHandle<'a, S> {
    client: &'a mut Client<S, Selected>,
    tag: String,
}

impl<S> IdleHandle<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Waits for a mailbox change, `stop`, or `refresh` to elapse.
    ///
    /// Flag updates (`FETCH`) and other untagged data are ignored. A server
    /// `BYE` is returned as [`Error::Bye`].
    pub async fn wait<F>(&mut self, refresh: Duration, stop: F) -> Result<IdleEvent>
    where
        F: Future<Output = ()>,
    {
        let deadline = tokio::time::sleep(refresh);
        tokio::pin!(deadline);
        tokio::pin!(stop);

        loop {
            let response = tokio::select! {
                biased;
                () = &mut stop => return Ok(IdleEvent::Stopped),
                () = &mut deadline => return Ok(IdleEvent::Timeout),
                response = self.client.next_response() => response?,
            };
            match response {
                Response::Untagged(UntaggedResponse::Exists(n)) => return Ok(IdleEvent::Exists(n)),
                Response::Untagged(UntaggedResponse::Recent(n)) => return Ok(IdleEvent::Recent(n)),
                Response::Untagged(UntaggedResponse::Expunge(n)) => {
                    return Ok(IdleEvent::Expunge(n));
                }
                Response::Untagged(UntaggedResponse::Condition {
                    status: Status::Bye,
                    text,
                    ..
                }) => return Err(Error::Bye(text)),
                Response::Untagged(other) => trace!(?other, "ignored during idle"),
                Response::Continuation { .. } => {}
                Response::Tagged {
                    tag, status, text, ..
                } => {
                    if tag.as_str() != self.tag {
                        return Err(Error::Protocol(format!("unexpected tag {tag} during IDLE")));
                    }
                    check_status(status, text)?;
                    return Err(Error::Protocol("server ended IDLE".to_string()));
                }
            }
        }
    }

    /// Sends DONE and waits for the IDLE completion.
    pub async fn done(self) -> Result<()> {
        self.client.stream.write_all(&Command::Done.serialize("")).await?;
        self.client.complete(&self.tag).await.map(|_| ())
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Enters IDLE.
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        if !self.supports_idle() {
            return Err(Error::InvalidState("server does not support IDLE".to_string()));
        }
        let tag = self.send(&Command::Idle).await?;
        self.await_continuation(&tag).await?;
        debug!(mailbox = %self.state.mailbox, "idle");
        Ok(IdleHandle { client: self, tag })
    }
}
