//! Shared pieces of the response grammar.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, Flag, ResponseCode, StatusInfo, Uid, UidValidity};
use crate::Result;

/// Parses `[CODE ...]`. The lexer must be positioned on the `[`.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;
    let name = match lexer.next_token()? {
        Token::Atom(s) => s.to_ascii_uppercase(),
        token => return Err(lexer.error(&format!("expected response code, got {token:?}"))),
    };

    let code = match name.as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "CAPABILITY" => ResponseCode::Capability(parse_capabilities(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?)
        }
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.number()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| lexer.error("UIDNEXT 0"))?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.number()?;
            ResponseCode::UidValidity(
                UidValidity::new(n).ok_or_else(|| lexer.error("UIDVALIDITY 0"))?,
            )
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            ResponseCode::Unseen(lexer.number()?)
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let validity = lexer.number()?;
            lexer.expect_space()?;
            let uid = lexer.number()?;
            ResponseCode::AppendUid {
                uid_validity: UidValidity::new(validity)
                    .ok_or_else(|| lexer.error("APPENDUID validity 0"))?,
                uid: Uid::new(uid).ok_or_else(|| lexer.error("APPENDUID uid 0"))?,
            }
        }
        _ => ResponseCode::Unknown(name),
    };

    // Tolerate trailing arguments of codes we only partly understand.
    while !matches!(lexer.peek(), Some(b']') | None) {
        lexer.skip_value()?;
    }
    lexer.expect(Token::RBracket)?;
    Ok(code)
}

/// Parses space-separated capability atoms up to the line end or `]`.
pub fn parse_capabilities(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.expect_space()?;
        match lexer.next_token()? {
            Token::Atom(s) => caps.push(Capability::parse(s)),
            token => return Err(lexer.error(&format!("expected capability, got {token:?}"))),
        }
    }
    Ok(caps)
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Vec<Flag>> {
    lexer.expect(Token::LParen)?;
    let mut flags = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(flags),
            Token::Space => {}
            // `\*` in PERMANENTFLAGS lexes as a lone backslash followed by `*`.
            Token::Atom("\\") if lexer.peek() == Some(b'*') => {
                lexer.next_token()?;
                flags.push(Flag::Keyword("\\*".to_string()));
            }
            Token::Atom(s) => flags.push(Flag::parse(s)),
            token => return Err(lexer.error(&format!("unexpected {token:?} in flag list"))),
        }
    }
}

/// Parses the body of `STATUS mailbox (ITEM n ...)`.
pub fn parse_status(lexer: &mut Lexer<'_>) -> Result<(String, StatusInfo)> {
    let mailbox = lexer.astring()?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;
    let mut info = StatusInfo::default();
    loop {
        let name = match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(s) => s.to_ascii_uppercase(),
            token => return Err(lexer.error(&format!("unexpected {token:?} in STATUS"))),
        };
        lexer.expect_space()?;
        let value = lexer.number()?;
        match name.as_str() {
            "MESSAGES" => info.messages = Some(value),
            "UIDNEXT" => info.uid_next = Some(value),
            "UIDVALIDITY" => info.uid_validity = Some(value),
            "UNSEEN" => info.unseen = Some(value),
            _ => {}
        }
    }
    Ok((mailbox, info))
}
