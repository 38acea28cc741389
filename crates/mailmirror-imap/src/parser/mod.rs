//! Sans-I/O parser for server responses.
//!
//! The [`lexer`] splits a buffered response into tokens; [`response`] builds
//! typed responses from them.
//!
//! ```
//! use mailmirror_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 12 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(12)));
//! ```

pub mod lexer;
pub mod response;

pub use lexer::{Lexer, Token};
pub use response::{FetchItem, Response, ResponseParser, UntaggedResponse};
