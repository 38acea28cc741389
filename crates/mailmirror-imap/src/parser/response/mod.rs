//! Response parser.
//!
//! Turns one complete response (a line plus any literals it announced) into a
//! [`Response`].

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod helpers;
mod types;

pub use types::{FetchItem, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, Status, Tag};
use crate::Result;

use helpers::{parse_capabilities, parse_flag_list, parse_response_code, parse_status};

/// A parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command completion.
    Tagged {
        /// Tag of the completed command.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Server data.
    Untagged(UntaggedResponse),
    /// Continuation request (`+ ...`).
    Continuation {
        /// Text after the `+`, possibly base64 challenge data.
        text: String,
    },
}

/// Stateless response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one complete response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);
        match lexer.next_token()? {
            Token::Asterisk => {
                lexer.expect_space()?;
                Self::untagged(&mut lexer).map(Response::Untagged)
            }
            Token::Plus => {
                if lexer.peek() == Some(b' ') {
                    lexer.expect_space()?;
                }
                Ok(Response::Continuation {
                    text: lexer.rest_of_line(),
                })
            }
            Token::Atom(tag) => {
                let tag = Tag::new(tag);
                lexer.expect_space()?;
                let status = match lexer.next_token()? {
                    Token::Atom(s) => parse_status_word(s)
                        .ok_or_else(|| lexer.error(&format!("invalid completion status {s}")))?,
                    token => return Err(lexer.error(&format!("expected status, got {token:?}"))),
                };
                let (code, text) = Self::resp_text(&mut lexer)?;
                Ok(Response::Tagged {
                    tag,
                    status,
                    code,
                    text,
                })
            }
            token => Err(lexer.error(&format!("expected '*', '+' or tag, got {token:?}"))),
        }
    }

    fn untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
        match lexer.next_token()? {
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = match lexer.next_token()? {
                    Token::Atom(s) => s.to_ascii_uppercase(),
                    token => return Err(lexer.error(&format!("expected keyword, got {token:?}"))),
                };
                match keyword.as_str() {
                    "EXISTS" => Ok(UntaggedResponse::Exists(n)),
                    "RECENT" => Ok(UntaggedResponse::Recent(n)),
                    "EXPUNGE" => Ok(UntaggedResponse::Expunge(n)),
                    "FETCH" => {
                        lexer.expect_space()?;
                        let items = fetch::parse_fetch_items(lexer)?;
                        Ok(UntaggedResponse::Fetch { seq: n, items })
                    }
                    _ => Ok(UntaggedResponse::Other(format!(
                        "{n} {keyword} {}",
                        lexer.rest_of_line()
                    ))),
                }
            }
            Token::Atom(word) => {
                if let Some(status) = parse_status_word(word) {
                    let (code, text) = Self::resp_text(lexer)?;
                    return Ok(UntaggedResponse::Condition { status, code, text });
                }
                match word.to_ascii_uppercase().as_str() {
                    "CAPABILITY" => Ok(UntaggedResponse::Capability(parse_capabilities(lexer)?)),
                    "FLAGS" => {
                        lexer.expect_space()?;
                        Ok(UntaggedResponse::Flags(parse_flag_list(lexer)?))
                    }
                    "STATUS" => {
                        lexer.expect_space()?;
                        let (mailbox, info) = parse_status(lexer)?;
                        Ok(UntaggedResponse::Status { mailbox, info })
                    }
                    _ => Ok(UntaggedResponse::Other(format!(
                        "{word} {}",
                        lexer.rest_of_line()
                    ))),
                }
            }
            token => Err(lexer.error(&format!("unexpected {token:?} in untagged response"))),
        }
    }

    /// Parses ` [CODE] text` after a status word. The space is optional
    /// because some servers send a bare `OK`.
    fn resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        if lexer.peek() == Some(b' ') {
            lexer.expect_space()?;
        }
        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };
        Ok((code, lexer.rest_of_line()))
    }
}

fn parse_status_word(word: &str) -> Option<Status> {
    match word.to_ascii_uppercase().as_str() {
        "OK" => Some(Status::Ok),
        "NO" => Some(Status::No),
        "BAD" => Some(Status::Bad),
        "PREAUTH" => Some(Status::PreAuth),
        "BYE" => Some(Status::Bye),
        _ => None,
    }
}
