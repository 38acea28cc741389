//! SASL initial responses.
//!
//! - PLAIN (RFC 4616)
//! - XOAUTH2 (Google/Microsoft)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// PLAIN initial response: base64 of `\0<username>\0<password>`.
///
/// ```
/// use mailmirror_oauth::sasl::plain_response;
///
/// assert_eq!(plain_response("u", "p"), "AHUAcA==");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// XOAUTH2 initial response: base64 of
/// `user=<user>\x01auth=Bearer <token>\x01\x01`.
///
/// ```
/// use mailmirror_oauth::sasl::xoauth2_response;
///
/// let response = xoauth2_response("user@example.com", "ya29.a0...");
/// // AUTHENTICATE XOAUTH2 {response}
/// # assert!(!response.is_empty());
/// ```
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Decodes the JSON error a server sends as an XOAUTH2 challenge.
#[must_use]
pub fn decode_xoauth2_error(challenge: &str) -> Option<String> {
    let bytes = STANDARD.decode(challenge.trim()).ok()?;
    String::from_utf8(bytes).ok()
}
