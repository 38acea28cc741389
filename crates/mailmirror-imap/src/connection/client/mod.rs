//! Type-state IMAP client.
//!
//! - `NotAuthenticated`: after the greeting
//! - `Authenticated`: after LOGIN or AUTHENTICATE
//! - `Selected`: after SELECT
//!
//! Each state only exposes the commands valid in it.

#![allow(clippy::missing_errors_doc)]

mod authenticated;
mod not_authenticated;
mod selected;
mod states;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

pub use self::authenticated::SelectOutcome;
pub use self::states::{Authenticated, LoggedIn, NotAuthenticated, Selected};
use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

/// IMAP client connection in state `State`.
pub struct Client<S, State> {
    pub(crate) stream: FramedStream<S>,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) state: State,
}

impl<S, State: std::fmt::Debug> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tag_gen", &self.tag_gen)
            .field("capabilities", &self.capabilities)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Result of a completed command.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    pub untagged: Vec<UntaggedResponse>,
    pub code: Option<ResponseCode>,
}

impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Server capabilities as last announced.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Checks for a capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// True if the server supports IDLE (RFC 2177).
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.has_capability(&Capability::Idle)
    }

    /// True if the server accepts an initial response with AUTHENTICATE (RFC 4959).
    #[must_use]
    pub fn supports_sasl_ir(&self) -> bool {
        self.has_capability(&Capability::SaslIr)
    }

    /// Sends NOOP.
    pub async fn noop(&mut self) -> Result<()> {
        self.run(&Command::Noop).await.map(|_| ())
    }

    /// Sends LOGOUT and closes the transport.
    pub async fn logout(mut self) -> Result<()> {
        match self.run(&Command::Logout).await {
            Ok(_) | Err(Error::Bye(_)) => {}
            Err(e) => return Err(e),
        }
        self.stream.shutdown().await
    }

    pub(crate) fn into_state<T>(self, state: T) -> Client<S, T> {
        Client {
            stream: self.stream,
            tag_gen: self.tag_gen,
            capabilities: self.capabilities,
            state,
        }
    }

    /// Writes a command and returns its tag.
    pub(crate) async fn send(&mut self, command: &Command) -> Result<String> {
        let tag = self.tag_gen.next_tag();
        debug!(tag = %tag, command = command.name(), "imap command");
        self.stream.write_all(&command.serialize(&tag)).await?;
        Ok(tag)
    }

    pub(crate) async fn next_response(&mut self) -> Result<Response> {
        let bytes: Bytes = self.stream.read_response().await?;
        trace!(len = bytes.len(), "imap response");
        ResponseParser::parse(&bytes)
    }

    /// Sends a command and collects responses until its completion.
    pub(crate) async fn run(&mut self, command: &Command) -> Result<Completion> {
        let tag = self.send(command).await?;
        self.complete(&tag).await
    }

    /// Reads until the tagged completion for `tag`, keeping untagged data.
    pub(crate) async fn complete(&mut self, tag: &str) -> Result<Completion> {
        let mut completion = Completion::default();
        let mut bye: Option<String> = None;
        loop {
            let response = match self.next_response().await {
                Ok(r) => r,
                Err(Error::Io(e)) => {
                    return Err(bye.map_or(Error::Io(e), Error::Bye));
                }
                Err(e) => return Err(e),
            };
            match response {
                Response::Untagged(untagged) => {
                    if let UntaggedResponse::Condition {
                        status: Status::Bye,
                        text,
                        ..
                    } = &untagged
                    {
                        bye = Some(text.clone());
                    }
                    if let UntaggedResponse::Capability(caps) = &untagged {
                        self.capabilities.clone_from(caps);
                    }
                    completion.untagged.push(untagged);
                }
                Response::Continuation { .. } => {
                    return Err(Error::Protocol("unexpected continuation request".to_string()));
                }
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } => {
                    if got.as_str() != tag {
                        return Err(Error::Protocol(format!(
                            "expected completion for {tag}, got {got}"
                        )));
                    }
                    if let Some(ResponseCode::Capability(caps)) = &code {
                        self.capabilities.clone_from(caps);
                    }
                    check_status(status, text)?;
                    completion.code = code;
                    return Ok(completion);
                }
            }
        }
    }

    /// Waits for a continuation request, failing if the command completes instead.
    pub(crate) async fn await_continuation(&mut self, tag: &str) -> Result<String> {
        loop {
            match self.next_response().await? {
                Response::Continuation { text } => return Ok(text),
                Response::Untagged(_) => {}
                Response::Tagged {
                    tag: got,
                    status,
                    text,
                    ..
                } => {
                    if got.as_str() != tag {
                        return Err(Error::Protocol(format!(
                            "expected continuation for {tag}, got completion for {got}"
                        )));
                    }
                    check_status(status, text)?;
                    return Err(Error::Protocol(
                        "command completed without continuation".to_string(),
                    ));
                }
            }
        }
    }
}

pub(crate) fn check_status(status: Status, text: String) -> Result<()> {
    match status {
        Status::Ok => Ok(()),
        Status::No => Err(Error::No(text)),
        Status::Bad => Err(Error::Bad(text)),
        Status::Bye => Err(Error::Bye(text)),
        Status::PreAuth => Err(Error::Protocol("unexpected PREAUTH completion".to_string())),
    }
}
