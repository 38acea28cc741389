//! Persistent synchronization state.
//!
//! One JSON document per account records, for every folder, the
//! UIDVALIDITY it was first seen with and which local key each remote UID
//! corresponds to. The document is rewritten wholesale after every
//! mutation, through a temporary file renamed over the old one.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Mapping between one remote folder and its local store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderMapping {
    /// UIDVALIDITY recorded on first selection.
    pub uid_validity: Option<u32>,
    /// Remote UID to local key.
    #[serde(default)]
    pub keys: BTreeMap<u32, String>,
}

impl FolderMapping {
    /// Records `reported` on first use, or checks it against the stored
    /// value.
    pub fn check_uid_validity(&mut self, folder: &str, reported: u32) -> Result<()> {
        match self.uid_validity {
            None => {
                self.uid_validity = Some(reported);
                Ok(())
            }
            Some(stored) if stored == reported => Ok(()),
            Some(stored) => Err(Error::UidValidityMismatch {
                folder: folder.to_string(),
                stored,
                reported,
            }),
        }
    }
}

/// Synchronization state of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Folder title to mapping.
    #[serde(default)]
    pub mailboxes: BTreeMap<String, FolderMapping>,
}

impl State {
    /// Mapping for `title`, created empty if missing.
    pub fn folder(&mut self, title: &str) -> &mut FolderMapping {
        self.mailboxes.entry(title.to_string()).or_default()
    }
}

/// The state document bound to its file.
#[derive(Debug)]
pub struct Memory {
    path: PathBuf,
    /// Current state.
    pub state: State,
}

impl Memory {
    /// Loads the document at `path`.
    ///
    /// A missing file yields an empty state. A file that does not parse is
    /// [`Error::StateCorrupt`]; it is never replaced by a fresh state.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| Error::StateCorrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no sync state, starting fresh");
                State::default()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, state })
    }

    /// State file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically replaces the file with the current state.
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut ser = serde_json::Serializer::with_formatter(
                tmp.as_file_mut(),
                PrettyFormatter::with_indent(b" "),
            );
            self.state.serialize(&mut ser)?;
        }
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| Error::Io(err.error))?;
        debug!(path = %self.path.display(), "sync state saved");
        Ok(())
    }
}
