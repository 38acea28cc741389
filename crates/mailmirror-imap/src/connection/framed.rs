//! Response framing.
//!
//! A response is one CRLF-terminated line, extended by every literal
//! (`{n}\r\n` + n bytes) the line announces. Partially received data lives in
//! [`FramedStream`] itself, so a dropped `read_response` future (for example
//! when an IDLE wait is canceled) never loses bytes.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

const READ_CHUNK: usize = 16 * 1024;

/// Longest response line accepted, literals excluded.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest literal accepted. Bounds memory for a single message body.
pub const MAX_LITERAL_SIZE: usize = 50 * 1024 * 1024;

/// Buffered, cancel-safe reader and writer over a transport.
pub struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
    /// Buffer length below which no complete response can exist yet.
    needed: usize,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a transport.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            needed: 0,
        }
    }

    /// Reads one complete response.
    ///
    /// Cancel-safe: bytes already read stay buffered for the next call.
    pub async fn read_response(&mut self) -> Result<Bytes> {
        loop {
            if self.buffer.len() >= self.needed {
                match scan_response(&self.buffer)? {
                    Scan::Complete(len) => {
                        self.needed = 0;
                        return Ok(self.buffer.split_to(len).freeze());
                    }
                    Scan::Incomplete(needed) => {
                        self.needed = needed;
                        self.buffer.reserve(needed.saturating_sub(self.buffer.len()));
                    }
                }
            }
            if self.buffer.capacity() == self.buffer.len() {
                self.buffer.reserve(READ_CHUNK);
            }
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
        }
    }

    /// Writes bytes and flushes.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Shuts the write half down.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Returns the transport, discarding buffered input.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// A full response occupies the first `n` bytes.
    Complete(usize),
    /// At least `n` bytes are needed before scanning again.
    Incomplete(usize),
}

fn scan_response(buf: &[u8]) -> Result<Scan> {
    let mut pos = 0;
    loop {
        let Some(eol) = find_crlf(&buf[pos..]) else {
            if buf.len() - pos > MAX_LINE_LENGTH {
                return Err(Error::Protocol("response line too long".to_string()));
            }
            return Ok(Scan::Incomplete(buf.len() + 1));
        };
        let line_end = pos + eol + 2;
        match literal_length(&buf[pos..line_end]) {
            None => return Ok(Scan::Complete(line_end)),
            Some(len) if len > MAX_LITERAL_SIZE => {
                return Err(Error::Protocol(format!(
                    "literal of {len} bytes exceeds limit of {MAX_LITERAL_SIZE}"
                )));
            }
            Some(len) => {
                let literal_end = line_end + len;
                if literal_end > buf.len() {
                    return Ok(Scan::Incomplete(literal_end));
                }
                pos = literal_end;
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Size announced by a trailing `{n}` or `{n+}` on a CRLF-terminated line.
fn literal_length(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"\r\n")?.strip_suffix(b"}")?;
    let body = body.strip_suffix(b"+").unwrap_or(body);
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::Builder;

    use super::*;

    mod scan_tests {
        use super::*;

        #[test]
        fn literal_length_forms() {
            assert_eq!(literal_length(b"BODY[] {123}\r\n"), Some(123));
            assert_eq!(literal_length(b"{0}\r\n"), Some(0));
            assert_eq!(literal_length(b"APPEND x {12+}\r\n"), Some(12));
            assert_eq!(literal_length(b"* OK {abc}\r\n"), None);
            assert_eq!(literal_length(b"* OK {}\r\n"), None);
            assert_eq!(literal_length(b"* OK done\r\n"), None);
            assert_eq!(literal_length(b"{5}"), None);
        }

        #[test]
        fn incomplete_line() {
            assert_eq!(scan_response(b"* OK").unwrap(), Scan::Incomplete(5));
        }

        #[test]
        fn waits_for_literal_then_trailer() {
            let buf = b"* 1 FETCH (BODY[] {5}\r\nhel";
            assert_eq!(scan_response(buf).unwrap(), Scan::Incomplete(28));
            let buf = b"* 1 FETCH (BODY[] {5}\r\nhello)\r\nA1 OK";
            assert_eq!(scan_response(buf).unwrap(), Scan::Complete(31));
        }

        #[test]
        fn oversized_literal_is_rejected() {
            let line = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
            let err = scan_response(line.as_bytes()).unwrap_err();
            assert!(err.to_string().contains("exceeds limit"));
        }
    }

    #[tokio::test]
    async fn reads_lines_across_chunks() {
        let mock = Builder::new()
            .read(b"* OK rea")
            .read(b"dy\r\n* 3 EXISTS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(&framed.read_response().await.unwrap()[..], b"* OK ready\r\n");
        assert_eq!(&framed.read_response().await.unwrap()[..], b"* 3 EXISTS\r\n");
    }

    #[tokio::test]
    async fn reads_literal_with_embedded_crlf() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {7}\r\n")
            .read(b"a\r\nb\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            &framed.read_response().await.unwrap()[..],
            b"* 1 FETCH (BODY[] {7}\r\na\r\nb\r\n)\r\n"
        );
    }

    #[tokio::test]
    async fn eof_is_an_error() {
        let mock = Builder::new().read(b"* OK").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(
            framed.read_response().await,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[tokio::test]
    async fn canceled_read_keeps_partial_line() {
        let mock = Builder::new()
            .read(b"* 4 EXI")
            .wait(Duration::from_millis(50))
            .read(b"STS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let first = tokio::time::timeout(Duration::from_millis(10), framed.read_response()).await;
        assert!(first.is_err());

        assert_eq!(&framed.read_response().await.unwrap()[..], b"* 4 EXISTS\r\n");
    }

    #[tokio::test]
    async fn write_flushes() {
        let mock = Builder::new().write(b"A0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_all(b"A0001 NOOP\r\n").await.unwrap();
    }
}
