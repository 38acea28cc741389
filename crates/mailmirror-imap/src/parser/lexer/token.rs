//! Lexical tokens of a server response line.

/// A token borrowed from the response buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom, including flag names such as `\Seen`.
    Atom(&'a str),
    /// All-digit atom.
    Number(u32),
    /// Quoted string with escapes resolved.
    Quoted(String),
    /// Literal payload `{n}\r\n<n bytes>`; borrowed, never copied.
    Literal(&'a [u8]),
    /// `NIL`
    Nil,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// Single space.
    Space,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// Line terminator.
    Crlf,
    /// End of input.
    Eof,
}
