//! Account configuration.
//!
//! The configuration is a flat JSON object. `type` selects a provider
//! preset that supplies folders, the remote archive folder, session
//! lifetime, authentication and server quirks; optional keys override it.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mailmirror_imap::{ServerQuirks, ServerType};
use mailmirror_oauth::Provider;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default IMAPS port.
pub const DEFAULT_PORT: u16 = 993;

/// Messages larger than this are archived locally instead of uploaded.
pub const DEFAULT_SIZE_LIMIT: u64 = 25 * 1024 * 1024;

/// Provider preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Any IMAP server with password authentication.
    Plain,
    /// Gmail with OAuth2.
    Gmail,
    /// Outlook / Office 365 with OAuth2.
    Outlook,
}

impl AccountType {
    const fn server_type(self) -> ServerType {
        match self {
            Self::Plain => ServerType::Generic,
            Self::Gmail => ServerType::Gmail,
            Self::Outlook => ServerType::Outlook,
        }
    }

    const fn session_lifetime(self) -> Duration {
        match self {
            Self::Plain => Duration::from_secs(24 * 60 * 60),
            Self::Gmail => Duration::from_secs(59 * 60),
            Self::Outlook => Duration::from_secs(60 * 60),
        }
    }

    fn folders(self) -> Vec<FolderConfig> {
        let sent = match self {
            Self::Plain => "sent",
            Self::Gmail => "[Gmail]/Sent Mail",
            Self::Outlook => "Sent Items",
        };
        vec![FolderConfig::new("inbox", "INBOX"), FolderConfig::new("sent", sent)]
    }

    const fn archive_folder(self) -> Option<&'static str> {
        match self {
            Self::Plain => Some("archive"),
            Self::Gmail => None,
            Self::Outlook => Some("Archive"),
        }
    }
}

/// A synchronized folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FolderConfig {
    /// Local name, also the key in the sync state.
    pub title: String,
    /// Remote mailbox name.
    pub remote: String,
}

impl FolderConfig {
    /// Creates a folder entry.
    pub fn new(title: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            remote: remote.into(),
        }
    }
}

/// How to authenticate.
#[derive(Clone)]
pub enum Credentials {
    /// SASL PLAIN.
    Password {
        /// Login name.
        user: String,
        /// Password.
        password: String,
    },
    /// SASL XOAUTH2 with a token refreshed on every connect.
    OAuth {
        /// Login name.
        user: String,
        /// Client registration.
        client_id: String,
        /// Client secret, if the registration has one.
        client_secret: Option<String>,
        /// Long-lived refresh token.
        refresh_token: String,
        /// Token endpoint.
        provider: Provider,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .finish_non_exhaustive(),
            Self::OAuth { user, provider, .. } => f
                .debug_struct("OAuth")
                .field("user", user)
                .field("provider", &provider.name)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "type")]
    kind: AccountType,
    imap_server: String,
    #[serde(default)]
    user: String,
    password: Option<String>,
    clientid: Option<String>,
    clientsecret: Option<String>,
    refreshtoken: Option<String>,
    directory: PathBuf,
    size_limit: Option<u64>,
    folders: Option<Vec<FolderConfig>>,
    archive: Option<String>,
    reselect_for_uid_next: Option<bool>,
    idle_folder: Option<String>,
}

/// Resolved account configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Preset in use.
    pub kind: AccountType,
    /// IMAP host.
    pub host: String,
    /// IMAP port.
    pub port: u16,
    /// Authentication.
    pub credentials: Credentials,
    /// Account root directory.
    pub directory: PathBuf,
    /// Folders to synchronize, in order.
    pub folders: Vec<FolderConfig>,
    /// Remote folder drained into the local archive after each pass.
    pub archive_folder: Option<String>,
    /// Folder watched while idle.
    pub idle_folder: String,
    /// Reconnect after this long even without errors.
    pub session_lifetime: Duration,
    /// Server workarounds.
    pub quirks: ServerQuirks,
    /// Upload size threshold in bytes.
    pub size_limit: u64,
}

impl Config {
    /// Default configuration file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mailmirror").join("config.json"))
    }

    /// Reads the configuration from `path`, or from stdin if `path` is `-`.
    pub fn load(path: &Path) -> Result<Self> {
        if path == Path::new("-") {
            Self::from_reader(io::stdin().lock())
        } else {
            Self::from_reader(File::open(path)?)
        }
    }

    /// Parses a configuration document.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let raw: RawConfig = serde_json::from_reader(reader)
            .map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
        Self::resolve(raw)
    }

    fn resolve(raw: RawConfig) -> Result<Self> {
        let (host, port) = split_host_port(&raw.imap_server)?;
        if raw.directory.as_os_str().is_empty() {
            return Err(Error::Config("directory is required".to_string()));
        }

        let credentials = match raw.kind {
            AccountType::Plain => Credentials::Password {
                user: raw.user,
                password: raw
                    .password
                    .ok_or_else(|| Error::Config("password is required".to_string()))?,
            },
            AccountType::Gmail | AccountType::Outlook => Credentials::OAuth {
                user: raw.user,
                client_id: raw
                    .clientid
                    .ok_or_else(|| Error::Config("clientid is required".to_string()))?,
                client_secret: raw.clientsecret.filter(|s| !s.is_empty()),
                refresh_token: raw
                    .refreshtoken
                    .ok_or_else(|| Error::Config("refreshtoken is required".to_string()))?,
                provider: if raw.kind == AccountType::Gmail {
                    Provider::google()?
                } else {
                    Provider::microsoft()?
                },
            },
        };

        let mut quirks = raw.kind.server_type().quirks();
        if let Some(reselect) = raw.reselect_for_uid_next {
            quirks.uid_next_requires_select = reselect;
        }

        let folders = raw.folders.unwrap_or_else(|| raw.kind.folders());
        if folders.is_empty() {
            return Err(Error::Config("no folders configured".to_string()));
        }
        if let Some(bad) = folders
            .iter()
            .find(|f| f.title.is_empty() || f.title.starts_with('.') || f.title.contains('/'))
        {
            return Err(Error::Config(format!("invalid folder title {:?}", bad.title)));
        }

        let archive_folder = match raw.archive {
            Some(name) if name.is_empty() => None,
            Some(name) => Some(name),
            None => raw.kind.archive_folder().map(str::to_string),
        };

        Ok(Self {
            kind: raw.kind,
            host,
            port,
            credentials,
            directory: raw.directory,
            folders,
            archive_folder,
            idle_folder: raw.idle_folder.unwrap_or_else(|| "INBOX".to_string()),
            session_lifetime: raw.kind.session_lifetime(),
            quirks,
            size_limit: raw.size_limit.unwrap_or(DEFAULT_SIZE_LIMIT),
        })
    }

    /// Sync state file.
    #[must_use]
    pub fn memory_path(&self) -> PathBuf {
        self.directory.join(".memory.json")
    }

    /// Control socket.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.directory.join(".socket")
    }

    /// Local store of a folder.
    #[must_use]
    pub fn folder_path(&self, title: &str) -> PathBuf {
        self.directory.join(title)
    }

    /// Local store receiving the drained remote archive folder.
    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.directory.join("archive")
    }

    /// Root of the content-addressed overflow archive.
    #[must_use]
    pub fn overflow_path(&self) -> PathBuf {
        self.directory.join("offline")
    }
}

fn split_host_port(server: &str) -> Result<(String, u16)> {
    let server = server.trim();
    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid port in {server:?}")))?;
            (host, port)
        }
        _ => (server, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(Error::Config("imap_server is required".to_string()));
    }
    Ok((host.to_string(), port))
}
