//! One bidirectional synchronization pass over one folder.
//!
//! A pass runs four phases in order:
//!
//! 1. **Upload**: local messages with no UID are appended to the server
//!    and replaced locally by a canonical copy mapped to the new UID.
//!    Messages over the size limit go to the overflow archive instead.
//! 2. **Download**: remote messages with no local key are fetched and
//!    stored in canonical form.
//! 3. **Flags**: both sides converge to the union of their flags.
//! 4. **Deletion**: UIDs gone from the server are removed locally, and
//!    local keys gone from disk are deleted and expunged remotely.
//!
//! The sync state is saved after every mutation, so an interrupted pass
//! resumes from a consistent mapping.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use mailmirror_maildir::Maildir;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::config::FolderConfig;
use crate::error::Result;
use crate::flags::{self, FlagSet};
use crate::memory::Memory;
use crate::remote::{RemoteMailbox, RemoteMessage, SelectedFolder, exceeds_fetch_limit};
use crate::transcode;

/// Capacity of the listing and body queues.
const QUEUE: usize = 10;

/// What a pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Local messages appended remotely.
    pub uploaded: usize,
    /// Local messages moved to the overflow archive.
    pub archived: usize,
    /// Remote messages stored locally.
    pub downloaded: usize,
    /// Local messages that gained flags.
    pub local_flags: usize,
    /// Remote messages that gained flags.
    pub remote_flags: usize,
    /// Local messages removed because the server no longer has them.
    pub deleted_local: usize,
    /// Remote messages expunged because they were removed locally.
    pub deleted_remote: usize,
}

impl PassReport {
    /// True if the pass changed nothing on either side.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.uploaded == 0
            && self.archived == 0
            && self.downloaded == 0
            && self.local_flags == 0
            && self.remote_flags == 0
            && self.deleted_local == 0
            && self.deleted_remote == 0
    }
}

/// A remote message whose UID is already mapped.
struct Known {
    uid: u32,
    key: String,
    flags: FlagSet,
}

/// Result of the remote listing.
struct Listing {
    /// Every UID on the server.
    seen: HashSet<u32>,
    known: Vec<Known>,
    /// Unmapped UIDs whose bodies cannot be fetched.
    too_large: HashSet<u32>,
}

/// Runs passes against one remote session.
pub struct Reconciler<R> {
    remote: Arc<R>,
    overflow: Archive,
    size_limit: u64,
}

impl<R: RemoteMailbox> Reconciler<R> {
    /// Creates a reconciler. Messages larger than `size_limit` bytes are
    /// moved into `overflow` instead of being uploaded.
    pub const fn new(remote: Arc<R>, overflow: Archive, size_limit: u64) -> Self {
        Self {
            remote,
            overflow,
            size_limit,
        }
    }

    /// Synchronizes `folder`, which must have just been selected.
    ///
    /// Fails with [`crate::Error::UidValidityMismatch`] before touching
    /// anything if the server renumbered the folder.
    pub async fn sync_folder(
        &self,
        memory: &mut Memory,
        folder: &FolderConfig,
        maildir: &Maildir,
        selected: SelectedFolder,
    ) -> Result<PassReport> {
        let title = folder.title.as_str();
        let first_seen = memory.state.folder(title).uid_validity.is_none();
        memory
            .state
            .folder(title)
            .check_uid_validity(title, selected.uid_validity)?;
        if first_seen {
            memory.save()?;
        }
        maildir.init()?;

        let mut report = PassReport::default();
        let mut present = self.upload(memory, folder, maildir, &mut report).await?;

        let count = self.remote.message_count(&folder.remote).await?;
        if count == 0 {
            wipe(memory, title, maildir)?;
            return Ok(report);
        }

        let Listing { seen, known, too_large } = self.list(memory, title, count).await?;
        let missing: Vec<u32> = {
            let mapping = memory.state.folder(title);
            let mut missing: Vec<u32> = seen
                .iter()
                .copied()
                .filter(|uid| !mapping.keys.contains_key(uid) && !too_large.contains(uid))
                .collect();
            missing.sort_unstable();
            missing
        };
        self.download(memory, title, maildir, missing, &mut present, &mut report)
            .await?;

        self.sync_flags(title, maildir, known, &present, &mut report)
            .await?;

        self.propagate_deletions(memory, title, maildir, &seen, &present, &mut report)
            .await?;

        memory.save()?;
        if !report.is_empty() {
            info!(folder = %title, ?report, "folder synchronized");
        }
        Ok(report)
    }

    /// Phase 1. Returns the local keys present after the uploads.
    async fn upload(
        &self,
        memory: &mut Memory,
        folder: &FolderConfig,
        maildir: &Maildir,
        report: &mut PassReport,
    ) -> Result<HashSet<String>> {
        let title = folder.title.as_str();
        let local_keys = maildir.keys()?;
        let mapped: HashSet<String> = memory.state.folder(title).keys.values().cloned().collect();
        let mut present: HashSet<String> = local_keys.iter().cloned().collect();

        for key in local_keys.into_iter().filter(|key| !mapped.contains(key)) {
            if maildir.size(&key)? > self.size_limit {
                let entry = self.overflow.adopt(&maildir.path(&key)?)?;
                present.remove(&key);
                report.archived += 1;
                info!(folder = %title, key = %key, entry = %entry.display(), "over size limit, archived instead of uploading");
                continue;
            }

            let uid_next = self.remote.uid_next(&folder.remote).await?;
            let canonical = transcode::canonicalize(maildir.open(&key)?)?;
            let flags = FlagSet::from_maildir(&maildir.flags(&key)?);

            let mut copy = maildir.create(&flags.to_maildir())?;
            copy.write_all(&canonical.bytes)?;
            let new_key = copy.commit()?;
            present.insert(new_key.clone());
            // A copy left behind by an append that failed after its mapping
            // was saved.
            if let Some(stale) = memory.state.folder(title).keys.insert(uid_next, new_key.clone()) {
                warn!(folder = %title, uid = uid_next, key = %stale, "dropping copy of an unfinished upload");
                remove_local(maildir, &stale)?;
                present.remove(&stale);
            }
            memory.save()?;

            let assigned = self
                .remote
                .append(&folder.remote, flags, canonical.date, canonical.bytes)
                .await?;
            let uid = match assigned {
                Some(uid) if uid != uid_next => {
                    warn!(folder = %title, predicted = uid_next, uid, "server assigned an unexpected UID");
                    let keys = &mut memory.state.folder(title).keys;
                    keys.remove(&uid_next);
                    keys.insert(uid, new_key);
                    uid
                }
                _ => uid_next,
            };

            maildir.remove(&key)?;
            present.remove(&key);
            memory.save()?;
            report.uploaded += 1;
            info!(folder = %title, uid, "uploaded");
        }
        Ok(present)
    }

    /// Phase 2 listing.
    async fn list(&self, memory: &mut Memory, title: &str, count: u32) -> Result<Listing> {
        let (tx, mut rx) = mpsc::channel::<RemoteMessage>(QUEUE);
        let remote = Arc::clone(&self.remote);
        let lister = tokio::spawn(async move { remote.list(count, tx).await });

        let mapping = memory.state.folder(title);
        let mut seen = HashSet::new();
        let mut known = Vec::new();
        let mut too_large = HashSet::new();
        while let Some(message) = rx.recv().await {
            if !seen.insert(message.uid) {
                continue;
            }
            if let Some(key) = mapping.keys.get(&message.uid) {
                known.push(Known {
                    uid: message.uid,
                    key: key.clone(),
                    flags: message.flags,
                });
            } else if exceeds_fetch_limit(&message) {
                warn!(folder = %title, uid = message.uid, size = ?message.size, "message too large to download, skipped");
                too_large.insert(message.uid);
            }
        }
        lister.await??;
        debug!(folder = %title, count = seen.len(), "listed remote folder");
        Ok(Listing { seen, known, too_large })
    }

    /// Phase 2 bodies.
    async fn download(
        &self,
        memory: &mut Memory,
        title: &str,
        maildir: &Maildir,
        missing: Vec<u32>,
        present: &mut HashSet<String>,
        report: &mut PassReport,
    ) -> Result<()> {
        if missing.is_empty() {
            return Ok(());
        }
        info!(folder = %title, count = missing.len(), "downloading");
        let requested: HashSet<u32> = missing.iter().copied().collect();
        let (tx, mut rx) = mpsc::channel::<RemoteMessage>(QUEUE);
        let remote = Arc::clone(&self.remote);
        let fetcher = tokio::spawn(async move { remote.fetch_uids(missing, tx).await });

        while let Some(message) = rx.recv().await {
            let Some(body) = message.body else {
                debug!(uid = message.uid, "FETCH without body ignored");
                continue;
            };
            if !requested.contains(&message.uid)
                || memory.state.folder(title).keys.contains_key(&message.uid)
            {
                continue;
            }
            let canonical = transcode::canonicalize(body.as_slice())?;
            let mut file = maildir.create(&message.flags.to_maildir())?;
            file.write_all(&canonical.bytes)?;
            let key = file.commit()?;
            present.insert(key.clone());
            memory.state.folder(title).keys.insert(message.uid, key);
            memory.save()?;
            report.downloaded += 1;
        }
        fetcher.await??;
        Ok(())
    }

    /// Phase 3. Remote additions run as background tasks, all joined
    /// before returning.
    async fn sync_flags(
        &self,
        title: &str,
        maildir: &Maildir,
        known: Vec<Known>,
        present: &HashSet<String>,
        report: &mut PassReport,
    ) -> Result<()> {
        let mut tasks = JoinSet::new();
        for Known { uid, key, flags: remote_flags } in known {
            if !present.contains(&key) {
                continue;
            }
            let info = match maildir.flags(&key) {
                Ok(info) => info,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            };
            let merge = flags::merge(FlagSet::from_maildir(&info), remote_flags);
            if merge.update_local {
                // Unsynchronized letters such as `F` are kept.
                maildir.set_flags(&key, &format!("{info}{}", merge.merged.to_maildir()))?;
                report.local_flags += 1;
                debug!(folder = %title, uid, "local flags updated");
            }
            if !merge.add_remote.is_empty() {
                let remote = Arc::clone(&self.remote);
                let add = merge.add_remote;
                tasks.spawn(async move { remote.add_flags(vec![uid], add).await });
                report.remote_flags += 1;
                debug!(folder = %title, uid, "remote flags queued");
            }
        }
        while let Some(joined) = tasks.join_next().await {
            joined??;
        }
        Ok(())
    }

    /// Phase 4.
    async fn propagate_deletions(
        &self,
        memory: &mut Memory,
        title: &str,
        maildir: &Maildir,
        seen: &HashSet<u32>,
        present: &HashSet<String>,
        report: &mut PassReport,
    ) -> Result<()> {
        let mapping = memory.state.folder(title);
        let gone: Vec<u32> = mapping
            .keys
            .keys()
            .copied()
            .filter(|uid| !seen.contains(uid))
            .collect();
        if !gone.is_empty() {
            for uid in &gone {
                if let Some(key) = mapping.keys.remove(uid) {
                    remove_local(maildir, &key)?;
                }
            }
            report.deleted_local = gone.len();
            info!(folder = %title, uids = ?gone, "deleting from local");
            memory.save()?;
        }

        let mapping = memory.state.folder(title);
        let removed: Vec<u32> = mapping
            .keys
            .iter()
            .filter(|(_, key)| !present.contains(*key))
            .map(|(uid, _)| *uid)
            .collect();
        if !removed.is_empty() {
            info!(folder = %title, uids = ?removed, "deleting from remote");
            self.remote.delete_uids(removed.clone()).await?;
            let mapping = memory.state.folder(title);
            for uid in &removed {
                mapping.keys.remove(uid);
            }
            report.deleted_remote = removed.len();
            memory.save()?;
        }
        Ok(())
    }

    /// Moves every message of the just-selected `remote_folder` into
    /// `archive` and expunges them. Returns the number of messages moved.
    ///
    /// Messages too large to fetch stay on the server.
    pub async fn drain(
        &self,
        remote_folder: &str,
        selected: SelectedFolder,
        archive: &Maildir,
    ) -> Result<usize> {
        if selected.exists == 0 {
            return Ok(0);
        }
        archive.init()?;
        let count = selected.exists;

        let (tx, mut rx) = mpsc::channel::<RemoteMessage>(QUEUE);
        let remote = Arc::clone(&self.remote);
        let lister = tokio::spawn(async move { remote.list(count, tx).await });
        let mut fits = Vec::new();
        let mut skipped = 0;
        while let Some(message) = rx.recv().await {
            if exceeds_fetch_limit(&message) {
                warn!(folder = remote_folder, uid = message.uid, size = ?message.size, "message too large to archive, left on server");
                skipped += 1;
            } else {
                fits.push(message.uid);
            }
        }
        lister.await??;
        if fits.is_empty() {
            return Ok(0);
        }

        let (tx, mut rx) = mpsc::channel::<RemoteMessage>(QUEUE);
        let remote = Arc::clone(&self.remote);
        let fetcher = if skipped == 0 {
            tokio::spawn(async move { remote.fetch_all(count, tx).await })
        } else {
            tokio::spawn(async move { remote.fetch_uids(fits, tx).await })
        };
        let mut stored = Vec::new();
        while let Some(message) = rx.recv().await {
            let Some(body) = message.body else {
                continue;
            };
            archive.store(&message.flags.to_maildir(), &body)?;
            stored.push(message.uid);
        }
        fetcher.await??;

        if skipped == 0 {
            self.remote.delete_all(count).await?;
        } else if !stored.is_empty() {
            self.remote.delete_uids(stored.clone()).await?;
        }
        info!(folder = remote_folder, count = stored.len(), "archived from remote archive folder");
        Ok(stored.len())
    }
}

/// The server folder is empty: drop every mapped local message.
fn wipe(memory: &mut Memory, title: &str, maildir: &Maildir) -> Result<()> {
    let mapping = memory.state.folder(title);
    if mapping.keys.is_empty() {
        return Ok(());
    }
    info!(folder = %title, count = mapping.keys.len(), "remote folder is empty, deleting all local messages");
    for key in mapping.keys.values() {
        remove_local(maildir, key)?;
    }
    mapping.keys.clear();
    memory.save()
}

fn remove_local(maildir: &Maildir, key: &str) -> Result<()> {
    match maildir.remove(key) {
        Err(err) if err.is_not_found() => {
            debug!(key, "already removed locally");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::Error;
    use crate::flags::Flag;
    use crate::remote::fake::{FakeFolder, FakeRemote};

    const MSG_A: &[u8] = b"From: a@example.com\r\nX-Spam: yes\r\nSubject: first\r\nDate: Tue, 1 Jul 2003 10:52:37 +0200\r\n\r\nhello\r\n";
    const CANON_A: &[u8] =
        b"From: a@example.com\nSubject: first\nDate: Tue, 1 Jul 2003 10:52:37 +0200\n\nhello\n";
    const MSG_B: &[u8] = b"From: b@example.com\r\nSubject: second\r\n\r\nworld\r\n";
    const CANON_B: &[u8] = b"From: b@example.com\nSubject: second\n\nworld\n";

    struct Fixture {
        dir: TempDir,
        memory: Memory,
        maildir: Maildir,
        remote: Arc<FakeRemote>,
        reconciler: Reconciler<FakeRemote>,
        folder: FolderConfig,
    }

    fn fixture_with_limit(remote_folder: FakeFolder, size_limit: u64) -> Fixture {
        let dir = TempDir::new().unwrap();
        let memory = Memory::load(dir.path().join(".memory.json")).unwrap();
        let maildir = Maildir::new(dir.path().join("inbox"));
        maildir.init().unwrap();
        let remote = Arc::new(FakeRemote::with_folder("INBOX", remote_folder));
        let reconciler = Reconciler::new(
            Arc::clone(&remote),
            Archive::new(dir.path().join("offline")),
            size_limit,
        );
        Fixture {
            dir,
            memory,
            maildir,
            remote,
            reconciler,
            folder: FolderConfig::new("inbox", "INBOX"),
        }
    }

    fn fixture(remote_folder: FakeFolder) -> Fixture {
        fixture_with_limit(remote_folder, 1024 * 1024)
    }

    async fn pass(fx: &mut Fixture) -> Result<PassReport> {
        let selected = fx.remote.select("INBOX").await?;
        fx.reconciler
            .sync_folder(&mut fx.memory, &fx.folder, &fx.maildir, selected)
            .await
    }

    fn write_local(maildir: &Maildir, name: &str, flags: &str, data: &[u8]) {
        fs::write(maildir.root().join("cur").join(format!("{name}:2,{flags}")), data).unwrap();
    }

    fn mapped(fx: &Fixture) -> Vec<(u32, String)> {
        fx.memory.state.mailboxes["inbox"]
            .keys
            .iter()
            .map(|(uid, key)| (*uid, key.clone()))
            .collect()
    }

    fn set(flags: &[Flag]) -> FlagSet {
        flags.iter().copied().collect()
    }

    mod upload_tests {
        use super::*;

        #[tokio::test]
        async fn local_messages_take_consecutive_uids() {
            let mut fx = fixture(FakeFolder::new(5, 100));
            write_local(&fx.maildir, "a", "", MSG_A);
            write_local(&fx.maildir, "b", "S", MSG_B);

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.uploaded, 2);

            let keys = mapped(&fx);
            assert_eq!(keys.iter().map(|(uid, _)| *uid).collect::<Vec<_>>(), vec![100, 101]);
            let local = fx.maildir.keys().unwrap();
            assert!(!local.contains(&"a".to_string()));
            assert!(!local.contains(&"b".to_string()));
            assert_eq!(local.len(), 2);

            let remote = fx.remote.folder("INBOX");
            assert_eq!(remote.messages.len(), 2);
            assert_eq!(remote.messages[0].uid, 100);
            assert_eq!(remote.messages[1].uid, 101);
            assert!(remote.messages[1].flags.contains(Flag::Seen));
        }

        #[tokio::test]
        async fn upload_round_trips_canonical_form() {
            let mut fx = fixture(FakeFolder::new(5, 100));
            write_local(&fx.maildir, "a", "RS", MSG_A);

            pass(&mut fx).await.unwrap();

            let (uid, key) = mapped(&fx).remove(0);
            assert_eq!(uid, 100);
            assert_eq!(fx.maildir.read(&key).unwrap(), CANON_A);
            assert_eq!(fx.maildir.flags(&key).unwrap(), "RS");
            let remote = fx.remote.folder("INBOX");
            assert_eq!(remote.messages[0].body, CANON_A);
            assert_eq!(remote.messages[0].flags, set(&Flag::ALL));
        }

        #[tokio::test]
        async fn state_is_persisted() {
            let mut fx = fixture(FakeFolder::new(5, 100));
            write_local(&fx.maildir, "a", "", MSG_A);
            pass(&mut fx).await.unwrap();

            let reloaded = Memory::load(fx.memory.path()).unwrap();
            assert_eq!(reloaded.state, fx.memory.state);
            assert_eq!(reloaded.state.mailboxes["inbox"].uid_validity, Some(5));
        }

        #[tokio::test]
        async fn assigned_uid_overrides_prediction() {
            let mut fx = fixture(FakeFolder::new(5, 100));
            fx.remote.state.lock().unwrap().uid_next_lag = 1;
            write_local(&fx.maildir, "a", "", MSG_A);

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.uploaded, 1);
            assert_eq!(report.deleted_local, 0);
            assert_eq!(mapped(&fx)[0].0, 100);
            assert_eq!(fx.maildir.keys().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn failed_append_is_retried_without_duplicates() {
            let mut fx = fixture(FakeFolder::new(5, 100));
            fx.remote.state.lock().unwrap().fail_appends = 1;
            write_local(&fx.maildir, "a", "S", MSG_A);

            let err = pass(&mut fx).await.unwrap_err();
            assert!(!err.is_fatal());
            assert_eq!(mapped(&fx).len(), 1);
            assert_eq!(fx.maildir.keys().unwrap().len(), 2);

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.uploaded, 1);
            assert_eq!(report.deleted_local, 0);
            assert_eq!(report.deleted_remote, 0);
            let keys = mapped(&fx);
            assert_eq!(keys.len(), 1);
            assert_eq!(keys[0].0, 100);
            let local = fx.maildir.keys().unwrap();
            assert_eq!(local.len(), 1);
            assert!(local.contains(&keys[0].1));

            assert!(pass(&mut fx).await.unwrap().is_empty());
            let remote = fx.remote.folder("INBOX");
            assert_eq!(remote.messages.len(), 1);
            assert_eq!(remote.messages[0].uid, 100);
            assert_eq!(remote.messages[0].body, CANON_A);
        }

        #[tokio::test]
        async fn oversized_message_is_archived() {
            let mut fx = fixture_with_limit(FakeFolder::new(5, 100), 16);
            write_local(&fx.maildir, "big", "", MSG_A);

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.archived, 1);
            assert_eq!(report.uploaded, 0);
            assert!(fx.maildir.keys().unwrap().is_empty());
            assert!(fx.remote.folder("INBOX").messages.is_empty());
            assert!(mapped(&fx).is_empty());

            let archive = Archive::new(fx.dir.path().join("offline"));
            let digest: [u8; 32] = {
                use sha2::{Digest, Sha256};
                Sha256::digest(MSG_A).into()
            };
            assert_eq!(fs::read(archive.entry_path(&digest)).unwrap(), MSG_A);
        }
    }

    mod download_tests {
        use super::*;

        #[tokio::test]
        async fn remote_messages_are_stored_canonically() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(set(&Flag::ALL), MSG_A);
            folder.push(FlagSet::EMPTY, MSG_B);
            let mut fx = fixture(folder);

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.downloaded, 2);

            let keys = mapped(&fx);
            assert_eq!(keys.len(), 2);
            assert_eq!(fx.maildir.read(&keys[0].1).unwrap(), CANON_A);
            assert_eq!(fx.maildir.flags(&keys[0].1).unwrap(), "RS");
            assert_eq!(fx.maildir.read(&keys[1].1).unwrap(), CANON_B);
            assert_eq!(fx.remote.mutations(), 0);
        }

        #[tokio::test]
        async fn empty_remote_wipes_local_copies() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(FlagSet::EMPTY, MSG_A);
            let mut fx = fixture(folder);
            pass(&mut fx).await.unwrap();
            assert_eq!(fx.maildir.keys().unwrap().len(), 1);

            fx.remote.folder_mut("INBOX", |f| f.messages.clear());
            pass(&mut fx).await.unwrap();
            assert!(fx.maildir.keys().unwrap().is_empty());
            assert!(mapped(&fx).is_empty());
        }
    }

    mod too_large_tests {
        use super::*;

        #[tokio::test]
        async fn unfetchable_message_is_skipped() {
            let mut folder = FakeFolder::new(5, 1);
            let big = folder.push(FlagSet::EMPTY, MSG_A);
            folder.push(FlagSet::EMPTY, MSG_B);
            folder.messages[0].size = u32::MAX;
            let mut fx = fixture(folder);

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.downloaded, 1);
            let keys = mapped(&fx);
            assert_eq!(keys.len(), 1);
            assert_ne!(keys[0].0, big);
            assert_eq!(fx.maildir.read(&keys[0].1).unwrap(), CANON_B);

            let report = pass(&mut fx).await.unwrap();
            assert!(report.is_empty());
            assert_eq!(fx.remote.folder("INBOX").messages.len(), 2);
        }
    }

    mod idempotence_tests {
        use super::*;

        #[tokio::test]
        async fn second_pass_changes_nothing() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(set(&[Flag::Seen]), MSG_B);
            let mut fx = fixture(folder);
            write_local(&fx.maildir, "a", "R", MSG_A);

            let first = pass(&mut fx).await.unwrap();
            assert!(!first.is_empty());
            let state = fx.memory.state.clone();
            let keys = fx.maildir.keys().unwrap();
            let mutations = fx.remote.mutations();

            let second = pass(&mut fx).await.unwrap();
            assert!(second.is_empty(), "{second:?}");
            assert_eq!(fx.memory.state, state);
            assert_eq!(fx.maildir.keys().unwrap(), keys);
            assert_eq!(fx.remote.mutations(), mutations);
        }
    }

    mod flag_tests {
        use super::*;

        async fn synced_message(fx: &mut Fixture) -> (u32, String) {
            pass(fx).await.unwrap();
            mapped(fx).remove(0)
        }

        #[tokio::test]
        async fn flags_converge_to_union() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(FlagSet::EMPTY, MSG_A);
            let mut fx = fixture(folder);
            let (uid, key) = synced_message(&mut fx).await;

            fx.maildir.set_flags(&key, "R").unwrap();
            fx.remote
                .folder_mut("INBOX", |f| f.messages[0].flags = set(&[Flag::Seen]));

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.local_flags, 1);
            assert_eq!(report.remote_flags, 1);
            assert_eq!(fx.maildir.flags(&key).unwrap(), "RS");
            assert_eq!(fx.remote.folder("INBOX").messages[0].flags, set(&Flag::ALL));
            assert_eq!(
                fx.remote.state.lock().unwrap().flag_adds,
                vec![(uid, set(&[Flag::Replied]))]
            );
        }

        #[tokio::test]
        async fn cleared_flag_is_restored_not_propagated() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(set(&[Flag::Seen]), MSG_A);
            let mut fx = fixture(folder);
            let (_, key) = synced_message(&mut fx).await;

            fx.maildir.set_flags(&key, "").unwrap();
            pass(&mut fx).await.unwrap();
            assert_eq!(fx.maildir.flags(&key).unwrap(), "S");
            assert_eq!(fx.remote.folder("INBOX").messages[0].flags, set(&[Flag::Seen]));
        }

        #[tokio::test]
        async fn unsynchronized_local_flags_survive() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(FlagSet::EMPTY, MSG_A);
            let mut fx = fixture(folder);
            let (_, key) = synced_message(&mut fx).await;

            fx.maildir.set_flags(&key, "F").unwrap();
            fx.remote
                .folder_mut("INBOX", |f| f.messages[0].flags = set(&[Flag::Seen]));
            pass(&mut fx).await.unwrap();
            assert_eq!(fx.maildir.flags(&key).unwrap(), "FS");
        }

        #[tokio::test]
        async fn failed_flag_write_fails_the_pass() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(FlagSet::EMPTY, MSG_A);
            let mut fx = fixture(folder);
            let (_, key) = synced_message(&mut fx).await;

            fx.maildir.set_flags(&key, "S").unwrap();
            fx.remote.state.lock().unwrap().fail_flag_adds = true;
            let err = pass(&mut fx).await.unwrap_err();
            assert!(!err.is_fatal());
        }
    }

    mod deletion_tests {
        use super::*;

        #[tokio::test]
        async fn local_removal_expunges_remotely() {
            let mut folder = FakeFolder::new(5, 1);
            folder.push(FlagSet::EMPTY, MSG_A);
            folder.push(FlagSet::EMPTY, MSG_B);
            let mut fx = fixture(folder);
            pass(&mut fx).await.unwrap();

            let (uid, key) = mapped(&fx).remove(0);
            fx.maildir.remove(&key).unwrap();

            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.deleted_remote, 1);
            let remote = fx.remote.folder("INBOX");
            assert_eq!(remote.messages.len(), 1);
            assert_ne!(remote.messages[0].uid, uid);
            assert!(mapped(&fx).iter().all(|(u, _)| *u != uid));
        }

        #[tokio::test]
        async fn remote_removal_deletes_locally() {
            let mut folder = FakeFolder::new(5, 1);
            let gone = folder.push(FlagSet::EMPTY, MSG_A);
            folder.push(FlagSet::EMPTY, MSG_B);
            let mut fx = fixture(folder);
            pass(&mut fx).await.unwrap();
            let gone_key = mapped(&fx)[0].1.clone();

            fx.remote
                .folder_mut("INBOX", |f| f.messages.retain(|m| m.uid != gone));
            let report = pass(&mut fx).await.unwrap();
            assert_eq!(report.deleted_local, 1);
            assert!(!fx.maildir.keys().unwrap().contains(&gone_key));
            assert_eq!(mapped(&fx).len(), 1);
            assert_eq!(fx.remote.folder("INBOX").messages.len(), 1);
        }
    }

    mod uid_validity_tests {
        use super::*;

        #[tokio::test]
        async fn changed_uid_validity_is_fatal() {
            let mut fx = fixture(FakeFolder::new(7, 1));
            fx.memory.state.folder("inbox").uid_validity = Some(5);
            write_local(&fx.maildir, "a", "", MSG_A);

            let err = pass(&mut fx).await.unwrap_err();
            assert!(matches!(
                err,
                Error::UidValidityMismatch {
                    stored: 5,
                    reported: 7,
                    ..
                }
            ));
            assert!(err.is_fatal());
            assert_eq!(fx.maildir.keys().unwrap(), vec!["a".to_string()]);
            assert_eq!(fx.remote.mutations(), 0);
            assert_eq!(fx.memory.state.mailboxes["inbox"].uid_validity, Some(5));
        }
    }

    mod drain_tests {
        use super::*;

        #[tokio::test]
        async fn drain_moves_everything_local() {
            let mut fx = fixture(FakeFolder::new(5, 1));
            let mut archive_folder = FakeFolder::new(9, 1);
            archive_folder.push(set(&[Flag::Seen]), MSG_A);
            archive_folder.push(FlagSet::EMPTY, MSG_B);
            fx.remote.add_folder("Archive", archive_folder);

            let archive = Maildir::new(fx.dir.path().join("archive"));
            let selected = fx.remote.select("Archive").await.unwrap();
            assert_eq!(fx.reconciler.drain("Archive", selected, &archive).await.unwrap(), 2);
            assert_eq!(archive.keys().unwrap().len(), 2);
            assert!(fx.remote.folder("Archive").messages.is_empty());

            let selected = fx.remote.select("Archive").await.unwrap();
            assert_eq!(fx.reconciler.drain("Archive", selected, &archive).await.unwrap(), 0);
        }

        #[tokio::test]
        async fn drain_leaves_unfetchable_messages() {
            let fx = fixture(FakeFolder::new(5, 1));
            let mut archive_folder = FakeFolder::new(9, 1);
            let big = archive_folder.push(FlagSet::EMPTY, MSG_A);
            archive_folder.push(FlagSet::EMPTY, MSG_B);
            archive_folder.messages[0].size = u32::MAX;
            fx.remote.add_folder("Archive", archive_folder);

            let archive = Maildir::new(fx.dir.path().join("archive"));
            let selected = fx.remote.select("Archive").await.unwrap();
            assert_eq!(fx.reconciler.drain("Archive", selected, &archive).await.unwrap(), 1);
            let keys = archive.keys().unwrap();
            assert_eq!(keys.len(), 1);
            assert_eq!(archive.read(&keys[0]).unwrap(), MSG_B);
            let left = fx.remote.folder("Archive").messages;
            assert_eq!(left.len(), 1);
            assert_eq!(left[0].uid, big);
        }
    }
}
