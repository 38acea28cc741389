//! # mailmirror-maildir
//!
//! A maildir (`cur/`, `new/`, `tmp/`) message store addressed by opaque keys.
//!
//! A key is the unique part of a file name. Flags live in the `:2,` info
//! suffix of files in `cur/`, as single letters (`S` seen, `R` replied, ...).
//! New messages are written in `tmp/`, synced, then renamed into `cur/`, so a
//! reader never observes a partial message.
//!
//! ```no_run
//! use std::io::Write;
//! use mailmirror_maildir::Maildir;
//!
//! # fn main() -> mailmirror_maildir::Result<()> {
//! let dir = Maildir::new("/tmp/mail/inbox");
//! dir.init()?;
//! let mut message = dir.create("S")?;
//! message.write_all(b"Subject: hi\n\nbody\n")?;
//! let key = message.commit()?;
//! assert_eq!(dir.flags(&key)?, "S");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use gethostname::gethostname;
use tracing::trace;

pub use crate::error::{Error, Result};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

const INFO_SEPARATOR: &str = ":2,";

/// A maildir rooted at the directory that holds `cur`, `new` and `tmp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Maildir {
    path: PathBuf,
}

impl Maildir {
    /// Wraps a directory. Nothing is created until [`Maildir::init`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.path
    }

    /// Creates `cur`, `new` and `tmp` if missing.
    pub fn init(&self) -> Result<()> {
        for sub in ["cur", "new", "tmp"] {
            fs::create_dir_all(self.path.join(sub))?;
        }
        Ok(())
    }

    /// Lists every key in `new/` and `cur/`, sorted. Dot-files are skipped.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for sub in ["new", "cur"] {
            for entry in read_dir_or_empty(&self.path.join(sub))? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    return Err(Error::InvalidName(entry.path()));
                };
                if name.starts_with('.') {
                    continue;
                }
                keys.push(split_name(name).0.to_string());
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Starts a new message in `tmp/` carrying `flags`.
    pub fn create(&self, flags: &str) -> Result<NewMessage> {
        let pid = process::id();
        let hostname = gethostname()
            .into_string()
            .unwrap_or_else(|_| "localhost".to_string())
            .replace(['/', ':'], "_");

        let tmp = self.path.join("tmp");
        loop {
            let ts = SystemTime::now().duration_since(UNIX_EPOCH)?;
            let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
            let key = format!(
                "{}.#{counter:x}M{}P{pid}.{hostname}",
                ts.as_secs(),
                ts.subsec_nanos()
            );
            let tmp_path = tmp.join(&key);
            match OpenOptions::new().write(true).create_new(true).open(&tmp_path) {
                Ok(file) => {
                    return Ok(NewMessage {
                        file,
                        key,
                        flags: normalize_flags(flags),
                        cur: self.path.join("cur"),
                        guard: UnlinkOnDrop(Some(tmp_path)),
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Writes `data` as a new message and returns its key.
    pub fn store(&self, flags: &str, data: &[u8]) -> Result<String> {
        let mut message = self.create(flags)?;
        message.write_all(data)?;
        message.commit()
    }

    /// Current path of the message file.
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        let new = self.path.join("new").join(key);
        if new.is_file() {
            return Ok(new);
        }
        let prefix = format!("{key}{INFO_SEPARATOR}");
        for entry in read_dir_or_empty(&self.path.join("cur"))? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(name) = name.to_str()
                && (name == key || name.starts_with(&prefix))
            {
                return Ok(entry.path());
            }
        }
        Err(Error::NotFound(key.to_string()))
    }

    /// Opens the message for reading.
    pub fn open(&self, key: &str) -> Result<File> {
        Ok(File::open(self.path(key)?)?)
    }

    /// Reads the whole message.
    pub fn read(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.path(key)?)?)
    }

    /// Deletes the message.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        fs::remove_file(&path)?;
        trace!(key, "removed");
        Ok(())
    }

    /// Flag letters of the message, sorted. Messages in `new/` have none.
    pub fn flags(&self, key: &str) -> Result<String> {
        let path = self.path(key)?;
        let name = file_name(&path)?;
        Ok(split_name(name).1.to_string())
    }

    /// Replaces the flags, moving a message from `new/` into `cur/`.
    pub fn set_flags(&self, key: &str, flags: &str) -> Result<()> {
        let src = self.path(key)?;
        let dst = self
            .path
            .join("cur")
            .join(format!("{key}{INFO_SEPARATOR}{}", normalize_flags(flags)));
        if src != dst {
            fs::rename(&src, &dst)?;
        }
        Ok(())
    }

    /// Copies the message under a fresh key with the same flags.
    pub fn duplicate(&self, key: &str) -> Result<String> {
        let flags = self.flags(key)?;
        let mut source = self.open(key)?;
        let mut message = self.create(&flags)?;
        io::copy(&mut source, &mut message)?;
        message.commit()
    }

    /// Size of the message file in bytes.
    pub fn size(&self, key: &str) -> Result<u64> {
        Ok(fs::metadata(self.path(key)?)?.len())
    }
}

impl From<PathBuf> for Maildir {
    fn from(path: PathBuf) -> Self {
        Self { path }
    }
}

/// A message being written in `tmp/`.
///
/// Dropping it without [`NewMessage::commit`] deletes the temporary file.
#[derive(Debug)]
pub struct NewMessage {
    file: File,
    key: String,
    flags: String,
    cur: PathBuf,
    guard: UnlinkOnDrop,
}

impl NewMessage {
    /// Key the message will have once committed.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Syncs the file and moves it into `cur/`. Returns the key.
    pub fn commit(mut self) -> Result<String> {
        self.file.flush()?;
        self.file.sync_all()?;
        let Some(tmp_path) = self.guard.0.take() else {
            return Err(Error::NotFound(self.key));
        };
        let dst = self
            .cur
            .join(format!("{}{INFO_SEPARATOR}{}", self.key, self.flags));
        if let Err(err) = fs::rename(&tmp_path, &dst) {
            self.guard.0 = Some(tmp_path);
            return Err(err.into());
        }
        trace!(key = %self.key, "committed");
        Ok(std::mem::take(&mut self.key))
    }
}

impl Write for NewMessage {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Debug)]
struct UnlinkOnDrop(Option<PathBuf>);

impl Drop for UnlinkOnDrop {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            fs::remove_file(path).ok();
        }
    }
}

/// Sorts and deduplicates flag letters.
#[must_use]
pub fn normalize_flags(flags: &str) -> String {
    let mut chars: Vec<char> = flags.chars().filter(char::is_ascii_alphabetic).collect();
    chars.sort_unstable();
    chars.dedup();
    chars.into_iter().collect()
}

fn split_name(name: &str) -> (&str, &str) {
    name.split_once(INFO_SEPARATOR).unwrap_or((name, ""))
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidName(path.to_path_buf()))
}

fn read_dir_or_empty(path: &Path) -> Result<impl Iterator<Item = io::Result<fs::DirEntry>>> {
    match fs::read_dir(path) {
        Ok(entries) => Ok(Some(entries).into_iter().flatten()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None::<fs::ReadDir>.into_iter().flatten()),
        Err(err) => Err(err.into()),
    }
}
