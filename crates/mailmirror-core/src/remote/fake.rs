//! In-memory [`RemoteMailbox`] for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{IdleOutcome, RemoteMailbox, RemoteMessage, SelectedFolder, exceeds_fetch_limit};
use crate::error::{Error, Result};
use crate::flags::FlagSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeMessage {
    pub uid: u32,
    pub flags: FlagSet,
    pub body: Vec<u8>,
    /// Reported `RFC822.SIZE`.
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct FakeFolder {
    pub uid_validity: u32,
    pub uid_next: u32,
    pub messages: Vec<FakeMessage>,
}

impl FakeFolder {
    pub const fn new(uid_validity: u32, uid_next: u32) -> Self {
        Self {
            uid_validity,
            uid_next,
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, flags: FlagSet, body: &[u8]) -> u32 {
        let uid = self.uid_next;
        self.uid_next += 1;
        self.messages.push(FakeMessage {
            uid,
            flags,
            body: body.to_vec(),
            size: u32::try_from(body.len()).unwrap_or(u32::MAX),
        });
        uid
    }
}

/// What an `idle` call does.
#[derive(Debug, Clone)]
pub enum IdleStep {
    Change,
    Bye,
    /// Waits for the stop token.
    Block,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub folders: BTreeMap<String, FakeFolder>,
    pub selected: Option<String>,
    /// Appends, flag stores and expunges.
    pub mutations: usize,
    /// Every `add_flags` call.
    pub flag_adds: Vec<(u32, FlagSet)>,
    /// `uid_next` under-reports by this much.
    pub uid_next_lag: u32,
    /// `add_flags` fails as if the connection dropped.
    pub fail_flag_adds: bool,
    /// The next this many appends fail as if the connection dropped.
    pub fail_appends: usize,
    /// Selecting these folders times out.
    pub select_timeouts: Vec<String>,
    pub idle: VecDeque<IdleStep>,
    pub idle_calls: usize,
    pub logouts: usize,
}

#[derive(Debug, Default)]
pub struct FakeRemote {
    pub state: Mutex<FakeState>,
}

#[allow(clippy::unwrap_used)]
impl FakeRemote {
    pub fn with_folder(name: &str, folder: FakeFolder) -> Self {
        let remote = Self::default();
        remote.add_folder(name, folder);
        remote
    }

    pub fn add_folder(&self, name: &str, folder: FakeFolder) {
        self.state.lock().unwrap().folders.insert(name.to_string(), folder);
    }

    pub fn folder_mut<T>(&self, name: &str, f: impl FnOnce(&mut FakeFolder) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        let folder = state
            .folders
            .entry(name.to_string())
            .or_insert_with(|| FakeFolder::new(1, 1));
        f(folder)
    }

    pub fn folder(&self, name: &str) -> FakeFolder {
        self.state.lock().unwrap().folders[name].clone()
    }

    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    fn with_selected<T>(&self, f: impl FnOnce(&mut FakeFolder) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .selected
            .clone()
            .ok_or_else(|| Error::Message("no folder selected".to_string()))?;
        let folder = state
            .folders
            .get_mut(&name)
            .ok_or_else(|| Error::Message(format!("{name} vanished")))?;
        Ok(f(folder))
    }

    fn snapshot(&self, count: u32, bodies: bool) -> Result<Vec<RemoteMessage>> {
        self.with_selected(|folder| {
            folder
                .messages
                .iter()
                .take(count as usize)
                .enumerate()
                .map(|(i, m)| RemoteMessage {
                    seq: u32::try_from(i + 1).unwrap(),
                    uid: m.uid,
                    flags: m.flags,
                    size: Some(m.size),
                    body: bodies.then(|| m.body.clone()),
                })
                .collect()
        })
    }
}

/// Fails like the wire reader does on a body literal over the limit.
fn check_literals(messages: &[RemoteMessage]) -> Result<()> {
    match messages.iter().find(|m| exceeds_fetch_limit(m)) {
        Some(m) => Err(Error::Imap(mailmirror_imap::Error::Protocol(format!(
            "literal of UID {} exceeds limit",
            m.uid
        )))),
        None => Ok(()),
    }
}

async fn send_all(messages: Vec<RemoteMessage>, sink: mpsc::Sender<RemoteMessage>) {
    for message in messages {
        if sink.send(message).await.is_err() {
            break;
        }
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl RemoteMailbox for FakeRemote {
    async fn select(&self, folder: &str) -> Result<SelectedFolder> {
        let mut state = self.state.lock().unwrap();
        if state.select_timeouts.iter().any(|f| f == folder) {
            return Err(Error::Imap(mailmirror_imap::Error::Timeout(Duration::from_secs(30))));
        }
        let Some(f) = state.folders.get(folder) else {
            return Err(Error::Imap(mailmirror_imap::Error::No(format!(
                "no such mailbox {folder}"
            ))));
        };
        let selected = SelectedFolder {
            exists: u32::try_from(f.messages.len()).unwrap(),
            uid_validity: f.uid_validity,
            uid_next: Some(f.uid_next),
        };
        state.selected = Some(folder.to_string());
        Ok(selected)
    }

    async fn message_count(&self, folder: &str) -> Result<u32> {
        Ok(u32::try_from(self.folder(folder).messages.len()).unwrap())
    }

    async fn uid_next(&self, folder: &str) -> Result<u32> {
        let lag = self.state.lock().unwrap().uid_next_lag;
        Ok(self.folder(folder).uid_next - lag)
    }

    async fn list(&self, count: u32, sink: mpsc::Sender<RemoteMessage>) -> Result<()> {
        send_all(self.snapshot(count, false)?, sink).await;
        Ok(())
    }

    async fn fetch_uids(&self, uids: Vec<u32>, sink: mpsc::Sender<RemoteMessage>) -> Result<()> {
        let messages: Vec<RemoteMessage> = self
            .snapshot(u32::MAX, true)?
            .into_iter()
            .filter(|m| uids.contains(&m.uid))
            .collect();
        check_literals(&messages)?;
        send_all(messages, sink).await;
        Ok(())
    }

    async fn fetch_all(&self, count: u32, sink: mpsc::Sender<RemoteMessage>) -> Result<()> {
        let messages = self.snapshot(count, true)?;
        check_literals(&messages)?;
        send_all(messages, sink).await;
        Ok(())
    }

    async fn append(
        &self,
        folder: &str,
        flags: FlagSet,
        _date: Option<DateTime<FixedOffset>>,
        message: Vec<u8>,
    ) -> Result<Option<u32>> {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_appends > 0 {
                state.fail_appends -= 1;
                return Err(Error::Imap(mailmirror_imap::Error::Bye("gone".to_string())));
            }
            state.mutations += 1;
        }
        Ok(Some(self.folder_mut(folder, |f| f.push(flags, &message))))
    }

    async fn add_flags(&self, uids: Vec<u32>, flags: FlagSet) -> Result<()> {
        if self.state.lock().unwrap().fail_flag_adds {
            return Err(Error::Imap(mailmirror_imap::Error::Bye("gone".to_string())));
        }
        self.with_selected(|folder| {
            for message in folder.messages.iter_mut().filter(|m| uids.contains(&m.uid)) {
                message.flags = message.flags.union(flags);
            }
        })?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        state.flag_adds.extend(uids.iter().map(|uid| (*uid, flags)));
        Ok(())
    }

    async fn delete_uids(&self, uids: Vec<u32>) -> Result<()> {
        self.with_selected(|folder| folder.messages.retain(|m| !uids.contains(&m.uid)))?;
        self.state.lock().unwrap().mutations += 1;
        Ok(())
    }

    async fn delete_all(&self, count: u32) -> Result<()> {
        self.with_selected(|folder| {
            let count = (count as usize).min(folder.messages.len());
            folder.messages.drain(..count);
        })?;
        self.state.lock().unwrap().mutations += 1;
        Ok(())
    }

    async fn idle(&self, folder: &str, stop: CancellationToken) -> Result<IdleOutcome> {
        self.select(folder).await?;
        let step = {
            let mut state = self.state.lock().unwrap();
            state.idle_calls += 1;
            state.idle.pop_front().unwrap_or(IdleStep::Block)
        };
        match step {
            IdleStep::Change => Ok(IdleOutcome::Changed),
            IdleStep::Bye => Err(Error::LoggedOut("session expired".to_string())),
            IdleStep::Block => {
                stop.cancelled().await;
                Ok(IdleOutcome::Stopped)
            }
        }
    }

    async fn logout(&self) -> Result<()> {
        self.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}
