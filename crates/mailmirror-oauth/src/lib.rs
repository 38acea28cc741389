//! # mailmirror-oauth
//!
//! `OAuth2` support for IMAP login: refresh-token exchange against a
//! provider's token endpoint, and SASL initial responses.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailmirror_oauth::{OAuthClient, Provider, sasl::xoauth2_response};
//!
//! #[tokio::main]
//! async fn main() -> mailmirror_oauth::Result<()> {
//!     let client = OAuthClient::new("client-id", Provider::google()?)
//!         .with_client_secret("client-secret");
//!     let token = client.refresh_token("1//refresh-token").await?;
//!
//!     // Send: AUTHENTICATE XOAUTH2 {response}
//!     let response = xoauth2_response("user@gmail.com", &token.access_token);
//!     # let _ = response;
//!     Ok(())
//! }
//! ```
//!
//! Interactive authorization (code or device flow) is out of scope; the
//! refresh token comes from configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
pub mod provider;
pub mod sasl;
pub mod token;

pub use client::OAuthClient;
pub use error::{Error, Result};
pub use provider::Provider;
pub use token::Token;
