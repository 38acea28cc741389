//! FETCH data items.

use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;
use crate::Result;

use super::helpers::parse_flag_list;
use super::types::FetchItem;

/// Parses `(ITEM value ...)` following `n FETCH `. Items this client does not
/// request are skipped.
pub fn parse_fetch_items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;
    let mut items = Vec::new();
    loop {
        let name = match lexer.next_token()? {
            Token::RParen => return Ok(items),
            Token::Space => continue,
            Token::Atom(s) => s.to_ascii_uppercase(),
            token => return Err(lexer.error(&format!("unexpected {token:?} in FETCH"))),
        };
        match name.as_str() {
            "UID" => {
                lexer.expect_space()?;
                let n = lexer.number()?;
                items.push(FetchItem::Uid(
                    Uid::new(n).ok_or_else(|| lexer.error("UID 0 in FETCH"))?,
                ));
            }
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(parse_flag_list(lexer)?));
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Size(lexer.number()?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                items.push(FetchItem::InternalDate(lexer.astring()?));
            }
            "BODY" | "BODY.PEEK" | "RFC822" => {
                let section = parse_section(lexer)?;
                lexer.expect_space()?;
                let data = match lexer.next_token()? {
                    Token::Literal(bytes) => Some(bytes.to_vec()),
                    Token::Quoted(s) => Some(s.into_bytes()),
                    Token::Nil => None,
                    token => {
                        return Err(lexer.error(&format!("expected body payload, got {token:?}")));
                    }
                };
                items.push(FetchItem::Body { section, data });
            }
            _ => {
                lexer.expect_space()?;
                lexer.skip_value()?;
            }
        }
    }
}

/// Reads `[section]` and an optional `<origin>` after `BODY`.
fn parse_section(lexer: &mut Lexer<'_>) -> Result<String> {
    if lexer.peek() != Some(b'[') {
        return Ok(String::new());
    }
    lexer.expect(Token::LBracket)?;
    let mut section = String::new();
    loop {
        match lexer.next_token()? {
            Token::RBracket => break,
            Token::Atom(s) => section.push_str(s),
            Token::Number(n) => section.push_str(&n.to_string()),
            Token::Space => section.push(' '),
            Token::LParen => section.push('('),
            Token::RParen => section.push(')'),
            token => return Err(lexer.error(&format!("unexpected {token:?} in section"))),
        }
    }
    if lexer.peek() == Some(b'<') {
        // Partial origin, e.g. `<0>`; lexes as a single atom.
        lexer.next_token()?;
    }
    Ok(section)
}
