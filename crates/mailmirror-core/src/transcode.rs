//! Message transcoder.
//!
//! Messages are stored locally in a canonical form: a fixed, ordered subset
//! of headers, one per line, a blank line, then the body with CRLF
//! normalized to LF. A CR not followed by LF is kept as a literal byte.
//! The wire form sent to the server is the canonical form with every LF
//! preceded by a CR, which [`canonicalize`] maps back exactly.

use std::io::{self, BufRead, BufReader, Read, Write};

use chrono::{DateTime, FixedOffset};

/// Headers kept in the canonical form, in output order.
pub const CANONICAL_HEADERS: [&str; 12] = [
    "From",
    "To",
    "Cc",
    "Subject",
    "In-Reply-To",
    "References",
    "Date",
    "Message-ID",
    "MIME-Version",
    "Content-Type",
    "Content-Disposition",
    "Content-Transfer-Encoding",
];

/// A parsed header block. Continuation lines are unfolded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, Vec<u8>)>,
}

impl Headers {
    /// Reads header lines up to and including the blank separator line,
    /// leaving `reader` at the first body byte.
    ///
    /// Lines that are neither `name: value` nor a continuation are skipped.
    pub fn parse(reader: &mut impl BufRead) -> io::Result<Self> {
        let mut fields: Vec<(String, Vec<u8>)> = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let content = strip_eol(&line);
            if content.is_empty() {
                break;
            }
            if content[0] == b' ' || content[0] == b'\t' {
                if let Some((_, value)) = fields.last_mut() {
                    let continued = content.trim_ascii();
                    if !continued.is_empty() {
                        if !value.is_empty() {
                            value.push(b' ');
                        }
                        value.extend_from_slice(continued);
                    }
                }
                continue;
            }
            let Some(colon) = content.iter().position(|&b| b == b':') else {
                continue;
            };
            let Ok(name) = std::str::from_utf8(content[..colon].trim_ascii()) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            fields.push((name.to_string(), content[colon + 1..].trim_ascii().to_vec()));
        }
        Ok(Self { fields })
    }

    /// First value of `name`, compared case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }

    /// The `Date` header, if present and valid RFC 2822.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        let raw = std::str::from_utf8(self.get("Date")?).ok()?;
        parse_date(raw)
    }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw).ok().or_else(|| {
        // Drop a trailing zone comment such as "(UTC)".
        let (head, _) = raw.rsplit_once('(')?;
        DateTime::parse_from_rfc2822(head.trim_end()).ok()
    })
}

/// Formats a date as an IMAP `date-time` for APPEND.
#[must_use]
pub fn imap_date(date: &DateTime<FixedOffset>) -> String {
    date.format("%d-%b-%Y %H:%M:%S %z").to_string()
}

/// Writes the canonical form of a message whose headers were already
/// parsed. Returns the number of bytes written.
pub fn rewrite(headers: &Headers, body: impl Read, mut writer: impl Write) -> io::Result<u64> {
    let mut written = 0u64;
    for name in CANONICAL_HEADERS {
        let Some(value) = headers.get(name) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        writer.write_all(name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(value)?;
        writer.write_all(b"\n")?;
        written += (name.len() + value.len() + 3) as u64;
    }
    writer.write_all(b"\n")?;
    written += 1;
    Ok(written + normalize_body(body, writer)?)
}

fn normalize_body(mut body: impl Read, mut writer: impl Write) -> io::Result<u64> {
    let mut input = [0u8; 8192];
    let mut output = Vec::with_capacity(input.len());
    let mut pending_cr = false;
    let mut written = 0u64;
    loop {
        let n = match body.read(&mut input) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        output.clear();
        for &byte in &input[..n] {
            if pending_cr {
                pending_cr = false;
                if byte != b'\n' {
                    output.push(b'\r');
                }
            }
            if byte == b'\r' {
                pending_cr = true;
            } else {
                output.push(byte);
            }
        }
        writer.write_all(&output)?;
        written += output.len() as u64;
    }
    if pending_cr {
        writer.write_all(b"\r")?;
        written += 1;
    }
    Ok(written)
}

/// A message read into canonical form.
#[derive(Debug, Clone)]
pub struct Canonical {
    /// Canonical bytes.
    pub bytes: Vec<u8>,
    /// Parsed `Date` header.
    pub date: Option<DateTime<FixedOffset>>,
}

/// Reads a whole message and returns its canonical form.
pub fn canonicalize(reader: impl Read) -> io::Result<Canonical> {
    let mut reader = BufReader::new(reader);
    let headers = Headers::parse(&mut reader)?;
    let mut bytes = Vec::new();
    rewrite(&headers, reader, &mut bytes)?;
    Ok(Canonical {
        bytes,
        date: headers.date(),
    })
}

/// Wire form of canonical bytes: every LF becomes CRLF.
#[must_use]
pub fn to_wire(canonical: &[u8]) -> Vec<u8> {
    let newlines = canonical.iter().filter(|&&b| b == b'\n').count();
    let mut wire = Vec::with_capacity(canonical.len() + newlines);
    for &byte in canonical {
        if byte == b'\n' {
            wire.push(b'\r');
        }
        wire.push(byte);
    }
    wire
}
