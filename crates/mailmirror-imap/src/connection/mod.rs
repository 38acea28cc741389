//! Connection handling: transports, framing, the type-state client and IDLE.

mod client;
mod framed;
mod idle;
mod stream;

pub use client::{Authenticated, Client, LoggedIn, NotAuthenticated, SelectOutcome, Selected};
pub use framed::{FramedStream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE};
pub use idle::{IdleEvent, IdleHandle};
pub use stream::{CONNECT_TIMEOUT, ImapStream, connect_plain, connect_tls, tls_connector};
