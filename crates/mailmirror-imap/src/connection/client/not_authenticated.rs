//! Greeting and authentication.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{Authenticated, Client, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::parser::{Response, UntaggedResponse};
use crate::types::{Capability, ResponseCode, Status};
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the server greeting from a fresh transport.
    ///
    /// Capabilities come from the greeting's response code when present,
    /// otherwise from an explicit CAPABILITY command.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            stream: FramedStream::new(stream),
            tag_gen: TagGenerator::default(),
            capabilities: Vec::new(),
            state: NotAuthenticated,
        };

        match client.next_response().await? {
            Response::Untagged(UntaggedResponse::Condition { status, code, text }) => {
                match status {
                    Status::Ok | Status::PreAuth => {}
                    Status::Bye => return Err(Error::Bye(text)),
                    Status::No | Status::Bad => {
                        return Err(Error::Protocol(format!("unexpected greeting: {text}")));
                    }
                }
                if let Some(ResponseCode::Capability(caps)) = code {
                    client.capabilities = caps;
                }
            }
            other => {
                return Err(Error::Protocol(format!("unexpected greeting: {other:?}")));
            }
        }

        if client.capabilities.is_empty() {
            client.run(&Command::Capability).await?;
        }
        debug!(capabilities = client.capabilities.len(), "imap greeting");
        Ok(client)
    }

    /// Authenticates with LOGIN.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<S, Authenticated>> {
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::Auth("server disabled LOGIN".to_string()));
        }
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.run(&command).await.map_err(auth_error)?;
        Ok(self.into_state(Authenticated))
    }

    /// Authenticates with a SASL mechanism and a base64 initial response.
    ///
    /// Uses SASL-IR when the server supports it, otherwise answers the first
    /// continuation. A second continuation (an error challenge) is answered
    /// with an empty line, after which the server fails the command.
    pub async fn authenticate(
        mut self,
        mechanism: &str,
        initial_response: &str,
    ) -> Result<Client<S, Authenticated>> {
        let sasl_ir = self.supports_sasl_ir();
        let command = Command::Authenticate {
            mechanism: mechanism.to_string(),
            initial_response: sasl_ir.then(|| initial_response.to_string()),
        };
        let tag = self.send(&command).await?;

        let mut answered = sasl_ir;
        loop {
            match self.next_response().await? {
                Response::Continuation { text } => {
                    if answered {
                        if let Some(detail) = mailmirror_oauth::sasl::decode_xoauth2_error(&text) {
                            debug!(mechanism, detail = %detail, "sasl error challenge");
                        }
                        self.stream.write_all(b"\r\n").await?;
                    } else {
                        let line = format!("{initial_response}\r\n");
                        self.stream.write_all(line.as_bytes()).await?;
                        answered = true;
                    }
                }
                Response::Untagged(UntaggedResponse::Capability(caps)) => self.capabilities = caps,
                Response::Untagged(_) => {}
                Response::Tagged {
                    tag: got,
                    status,
                    code,
                    text,
                } if got.as_str() == tag => {
                    return match status {
                        Status::Ok => {
                            if let Some(ResponseCode::Capability(caps)) = code {
                                self.capabilities = caps;
                            }
                            Ok(self.into_state(Authenticated))
                        }
                        _ => Err(Error::Auth(text)),
                    };
                }
                Response::Tagged { tag: got, .. } => {
                    return Err(Error::Protocol(format!(
                        "expected completion for {tag}, got {got}"
                    )));
                }
            }
        }
    }

    /// AUTHENTICATE PLAIN (RFC 4616).
    pub async fn authenticate_plain(
        self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let response = mailmirror_oauth::sasl::plain_response(username, password);
        self.authenticate("PLAIN", &response).await
    }

    /// AUTHENTICATE XOAUTH2 with an OAuth2 access token.
    pub async fn authenticate_xoauth2(
        self,
        username: &str,
        access_token: &str,
    ) -> Result<Client<S, Authenticated>> {
        let response = mailmirror_oauth::sasl::xoauth2_response(username, access_token);
        self.authenticate("XOAUTH2", &response).await
    }
}

fn auth_error(error: Error) -> Error {
    match error {
        Error::No(text) | Error::Bad(text) => Error::Auth(text),
        other => other,
    }
}
