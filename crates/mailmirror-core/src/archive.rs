//! Content-addressed overflow archive.
//!
//! An entry lives at `<root>/<hex(digest[0])>/<hex(digest[1..])>` where
//! `digest` is the SHA-256 of its content. Entries are always written to a
//! temporary file first and renamed into place, so a reader never sees a
//! partial entry. Storing content that is already present replaces the
//! existing entry.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use mailmirror_maildir::Maildir;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// SHA-256 digest of an entry.
pub type ContentDigest = [u8; 32];

/// An archive rooted at one directory.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    /// Wraps `root`. It is created on first store.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `digest`.
    #[must_use]
    pub fn entry_path(&self, digest: &ContentDigest) -> PathBuf {
        let (shard, rest) = shard_names(digest);
        self.root.join(shard).join(rest)
    }

    /// Streams `reader` into the archive and returns the entry path.
    pub fn store(&self, mut reader: impl Read) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        let mut writer = HashingWriter::new(tmp.as_file_mut());
        io::copy(&mut reader, &mut writer)?;
        let digest = writer.finish();
        tmp.as_file().sync_all()?;

        let target = self.prepare(&digest)?;
        tmp.persist(&target).map_err(|err| Error::Io(err.error))?;
        debug!(entry = %target.display(), "archived");
        Ok(target)
    }

    /// Moves an existing file into the archive and returns the entry path.
    ///
    /// The file is hashed in place and then renamed, so it must live on the
    /// same filesystem as the archive.
    pub fn adopt(&self, path: &Path) -> Result<PathBuf> {
        let digest = digest_file(path)?;
        let target = self.prepare(&digest)?;
        fs::rename(path, &target)?;
        debug!(from = %path.display(), entry = %target.display(), "moved into archive");
        Ok(target)
    }

    /// Moves every file below `source` into the archive. Returns the count.
    pub fn forward(&self, source: &Path) -> Result<usize> {
        if !source.is_dir() {
            return Err(Error::Io(io::Error::new(
                ErrorKind::NotFound,
                format!("{} is not a directory", source.display()),
            )));
        }
        let mut moved = 0;
        for file in walk_files(source)? {
            self.adopt(&file)?;
            moved += 1;
        }
        info!(count = moved, source = %source.display(), "archive forward complete");
        Ok(moved)
    }

    /// Copies every entry into `maildir`'s `cur/`, named by its full hex
    /// digest. Returns the count.
    pub fn reverse(&self, maildir: &Maildir) -> Result<usize> {
        maildir.init()?;
        let cur = maildir.root().join("cur");
        let mut copied = 0;
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            let shard_name = shard.file_name();
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let mut name = shard_name.clone();
                name.push(entry.file_name());
                fs::copy(entry.path(), cur.join(name))?;
                copied += 1;
            }
        }
        info!(count = copied, maildir = %maildir.root().display(), "archive reverse complete");
        Ok(copied)
    }

    /// Creates the shard directory for `digest` and returns the entry path.
    fn prepare(&self, digest: &ContentDigest) -> Result<PathBuf> {
        let (shard, rest) = shard_names(digest);
        let shard_dir = self.root.join(shard);
        match fs::metadata(&shard_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(Error::ArchiveCorrupt(shard_dir)),
            Err(err) if err.kind() == ErrorKind::NotFound => fs::create_dir_all(&shard_dir)?,
            Err(err) => return Err(err.into()),
        }
        Ok(shard_dir.join(rest))
    }
}

fn shard_names(digest: &ContentDigest) -> (String, String) {
    let shard = format!("{:02x}", digest[0]);
    let rest = digest[1..].iter().fold(String::with_capacity(62), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    });
    (shard, rest)
}

fn digest_file(path: &Path) -> Result<ContentDigest> {
    let mut writer = HashingWriter::new(io::sink());
    io::copy(&mut File::open(path)?, &mut writer)?;
    Ok(writer.finish())
}

fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let kind = entry.file_type()?;
            if kind.is_dir() {
                pending.push(entry.path());
            } else if kind.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Hashes everything written through it.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> ContentDigest {
        self.hasher.finalize().into()
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
