//! [`RemoteMailbox`] over an IMAP connection.

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use mailmirror_imap::{
    Authenticated, Client, FetchAttr, FetchedMessage, Flag as ImapFlag, IdleEvent, ImapStream,
    SelectOutcome, Selected, SequenceSet, ServerQuirks, StatusAttr, StoreOp, connect_tls,
};
use mailmirror_oauth::OAuthClient;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Connector, IdleOutcome, RemoteMailbox, RemoteMessage, SelectedFolder};
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::transcode;

/// Capacity of the queue between the protocol reader and the consumer.
const FETCH_QUEUE: usize = 10;

const LISTING: &[FetchAttr] = &[FetchAttr::Uid, FetchAttr::Flags, FetchAttr::Size];
const BODIES: &[FetchAttr] = &[FetchAttr::Uid, FetchAttr::Flags, FetchAttr::BodyPeek];

enum SessionState<S> {
    Closed,
    Authenticated(Client<S, Authenticated>),
    Selected(Client<S, Selected>),
}

fn closed() -> Error {
    Error::Imap(mailmirror_imap::Error::InvalidState(
        "connection closed".to_string(),
    ))
}

fn selected<S>(state: &mut SessionState<S>) -> Result<&mut Client<S, Selected>> {
    match state {
        SessionState::Selected(client) => Ok(client),
        SessionState::Authenticated(_) => Err(Error::Imap(
            mailmirror_imap::Error::InvalidState("no mailbox selected".to_string()),
        )),
        SessionState::Closed => Err(closed()),
    }
}

/// An authenticated IMAP session.
///
/// Commands are serialized through an internal lock. A refused SELECT
/// leaves the session authenticated with no mailbox open.
pub struct ImapRemote<S = ImapStream> {
    state: Mutex<SessionState<S>>,
    quirks: ServerQuirks,
}

impl<S> ImapRemote<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps a logged-in client.
    pub fn new(client: Client<S, Authenticated>, quirks: ServerQuirks) -> Self {
        Self {
            state: Mutex::new(SessionState::Authenticated(client)),
            quirks,
        }
    }

    async fn select_in(state: &mut SessionState<S>, folder: &str) -> Result<SelectedFolder> {
        let outcome = match mem::replace(state, SessionState::Closed) {
            SessionState::Authenticated(client) => client.try_select(folder).await?,
            SessionState::Selected(client) => client.try_select(folder).await?,
            SessionState::Closed => return Err(closed()),
        };
        let client = match outcome {
            SelectOutcome::Selected(client) => client,
            SelectOutcome::Refused(client, err) => {
                *state = SessionState::Authenticated(client);
                return Err(err.into());
            }
        };
        let status = client.mailbox_status();
        let uid_validity = status
            .uid_validity
            .ok_or_else(|| {
                mailmirror_imap::Error::Protocol(format!("no UIDVALIDITY for {folder}"))
            })?
            .get();
        let folder = SelectedFolder {
            exists: status.exists,
            uid_validity,
            uid_next: status.uid_next.map(mailmirror_imap::Uid::get),
        };
        *state = SessionState::Selected(client);
        Ok(folder)
    }

    async fn fetch(
        &self,
        set: SequenceSet,
        items: &[FetchAttr],
        uid: bool,
        sink: mpsc::Sender<RemoteMessage>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let client = selected(&mut *state)?;
        let (tx, mut rx) = mpsc::channel::<FetchedMessage>(FETCH_QUEUE);
        let fetch = async move {
            if uid {
                client.uid_fetch_stream(&set, items, &tx).await
            } else {
                client.fetch_stream(&set, items, &tx).await
            }
        };
        let forward = async move {
            while let Some(message) = rx.recv().await {
                let Some(uid) = message.uid else {
                    debug!(seq = message.seq, "FETCH without UID ignored");
                    continue;
                };
                let message = RemoteMessage {
                    seq: message.seq,
                    uid: uid.get(),
                    flags: FlagSet::from_imap(&message.flags),
                    size: message.size,
                    body: message.body,
                };
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        };
        let (result, ()) = tokio::join!(fetch, forward);
        result.map_err(Error::from)
    }
}

#[async_trait]
impl<S> RemoteMailbox for ImapRemote<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn select(&self, folder: &str) -> Result<SelectedFolder> {
        let mut state = self.state.lock().await;
        Self::select_in(&mut *state, folder).await
    }

    async fn message_count(&self, folder: &str) -> Result<u32> {
        let mut state = self.state.lock().await;
        let info = match &mut *state {
            SessionState::Authenticated(client) => client.status(folder, &[StatusAttr::Messages]).await?,
            SessionState::Selected(client) => client.status(folder, &[StatusAttr::Messages]).await?,
            SessionState::Closed => return Err(closed()),
        };
        info.messages
            .ok_or_else(|| Error::Imap(mailmirror_imap::Error::Protocol("no MESSAGES in STATUS".into())))
    }

    async fn uid_next(&self, folder: &str) -> Result<u32> {
        let mut state = self.state.lock().await;
        let uid_next = if self.quirks.uid_next_requires_select {
            Self::select_in(&mut *state, folder).await?.uid_next
        } else {
            let info = match &mut *state {
                SessionState::Authenticated(client) => client.status(folder, &[StatusAttr::UidNext]).await?,
                SessionState::Selected(client) => client.status(folder, &[StatusAttr::UidNext]).await?,
                SessionState::Closed => return Err(closed()),
            };
            info.uid_next
        };
        uid_next.ok_or_else(|| {
            Error::Imap(mailmirror_imap::Error::Protocol(format!("no UIDNEXT for {folder}")))
        })
    }

    async fn list(&self, count: u32, sink: mpsc::Sender<RemoteMessage>) -> Result<()> {
        let Some(set) = SequenceSet::range(1, count) else {
            return Ok(());
        };
        self.fetch(set, LISTING, false, sink).await
    }

    async fn fetch_uids(&self, uids: Vec<u32>, sink: mpsc::Sender<RemoteMessage>) -> Result<()> {
        let set: SequenceSet = uids.into_iter().collect();
        self.fetch(set, BODIES, true, sink).await
    }

    async fn fetch_all(&self, count: u32, sink: mpsc::Sender<RemoteMessage>) -> Result<()> {
        let Some(set) = SequenceSet::range(1, count) else {
            return Ok(());
        };
        self.fetch(set, BODIES, false, sink).await
    }

    async fn append(
        &self,
        folder: &str,
        flags: FlagSet,
        date: Option<DateTime<FixedOffset>>,
        message: Vec<u8>,
    ) -> Result<Option<u32>> {
        let flags = flags.to_imap();
        let date = date.as_ref().map(transcode::imap_date);
        let wire = transcode::to_wire(&message);
        let mut state = self.state.lock().await;
        let uid = match &mut *state {
            SessionState::Authenticated(client) => client.append(folder, &flags, date, &wire).await?,
            SessionState::Selected(client) => client.append(folder, &flags, date, &wire).await?,
            SessionState::Closed => return Err(closed()),
        };
        Ok(uid.map(mailmirror_imap::Uid::get))
    }

    async fn add_flags(&self, uids: Vec<u32>, flags: FlagSet) -> Result<()> {
        let set: SequenceSet = uids.into_iter().collect();
        let mut state = self.state.lock().await;
        selected(&mut *state)?
            .uid_store(&set, StoreOp::Add, &flags.to_imap(), true)
            .await?;
        Ok(())
    }

    async fn delete_uids(&self, uids: Vec<u32>) -> Result<()> {
        let set: SequenceSet = uids.into_iter().collect();
        let mut state = self.state.lock().await;
        let client = selected(&mut *state)?;
        client
            .uid_store(&set, StoreOp::Add, &[ImapFlag::Deleted], true)
            .await?;
        client.expunge().await?;
        Ok(())
    }

    async fn delete_all(&self, count: u32) -> Result<()> {
        let Some(set) = SequenceSet::range(1, count) else {
            return Ok(());
        };
        let mut state = self.state.lock().await;
        let client = selected(&mut *state)?;
        client
            .store(&set, StoreOp::Add, &[ImapFlag::Deleted], true)
            .await?;
        client.expunge().await?;
        Ok(())
    }

    async fn idle(&self, folder: &str, stop: CancellationToken) -> Result<IdleOutcome> {
        let mut state = self.state.lock().await;
        Self::select_in(&mut *state, folder).await?;
        let client = selected(&mut *state)?;
        loop {
            let mut handle = client.idle().await?;
            let event = match handle.wait(self.quirks.idle_refresh, stop.cancelled()).await {
                Ok(event) => event,
                Err(mailmirror_imap::Error::Bye(text)) => return Err(Error::LoggedOut(text)),
                Err(err) => return Err(err.into()),
            };
            handle.done().await?;
            match event {
                IdleEvent::Stopped => return Ok(IdleOutcome::Stopped),
                IdleEvent::Exists(_) | IdleEvent::Recent(_) | IdleEvent::Expunge(_) => {
                    debug!(?event, "mailbox changed");
                    return Ok(IdleOutcome::Changed);
                }
                IdleEvent::Timeout => debug!(folder, "re-issuing IDLE"),
            }
        }
    }

    async fn logout(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Authenticated(client) => client.logout().await?,
            SessionState::Selected(client) => client.logout().await?,
            SessionState::Closed => {}
        }
        Ok(())
    }
}

/// Connects over TLS and authenticates with the configured credentials.
pub struct ImapConnector {
    host: String,
    port: u16,
    credentials: Credentials,
    quirks: ServerQuirks,
    oauth: Option<OAuthClient>,
    refresh_token: Mutex<String>,
}

impl ImapConnector {
    /// Creates a connector for the account in `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let (oauth, refresh_token) = match &config.credentials {
            Credentials::Password { .. } => (None, String::new()),
            Credentials::OAuth {
                client_id,
                client_secret,
                refresh_token,
                provider,
                ..
            } => {
                let mut client = OAuthClient::new(client_id.clone(), provider.clone());
                if let Some(secret) = client_secret {
                    client = client.with_client_secret(secret.clone());
                }
                (Some(client), refresh_token.clone())
            }
        };
        Self {
            host: config.host.clone(),
            port: config.port,
            credentials: config.credentials.clone(),
            quirks: config.quirks,
            oauth,
            refresh_token: Mutex::new(refresh_token),
        }
    }

    async fn access_token(&self, oauth: &OAuthClient) -> Result<String> {
        let mut refresh_token = self.refresh_token.lock().await;
        let token = oauth.refresh_token(&refresh_token).await?;
        if let Some(rotated) = token.refresh_token.filter(|t| *t != *refresh_token) {
            debug!("refresh token rotated");
            *refresh_token = rotated;
        }
        Ok(token.access_token)
    }
}

#[async_trait]
impl Connector for ImapConnector {
    type Remote = ImapRemote;

    async fn connect(&self) -> Result<Arc<ImapRemote>> {
        debug!(host = %self.host, port = self.port, "opening TLS connection");
        let stream = connect_tls(&self.host, self.port).await?;
        let client = Client::from_stream(stream).await?;
        let client = match (&self.credentials, &self.oauth) {
            (Credentials::Password { user, password }, _) => {
                client.authenticate_plain(user, password).await?
            }
            (Credentials::OAuth { user, .. }, Some(oauth)) => {
                let access_token = self.access_token(oauth).await?;
                client.authenticate_xoauth2(user, &access_token).await?
            }
            (Credentials::OAuth { .. }, None) => {
                return Err(Error::Config("OAuth client missing".to_string()));
            }
        };
        info!(host = %self.host, "authenticated");
        Ok(Arc::new(ImapRemote::new(client, self.quirks)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio_test::io::{Builder, Mock};

    use super::*;
    use crate::remote::exceeds_fetch_limit;

    const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 IDLE UIDPLUS] ready\r\n";

    fn logged_in(builder: &mut Builder) -> &mut Builder {
        builder
            .read(GREETING)
            .write(b"A0001 LOGIN u p\r\n")
            .read(b"A0001 OK logged in\r\n")
    }

    fn select_inbox<'a>(builder: &'a mut Builder, tag: &str, uid_next: u32) -> &'a mut Builder {
        builder
            .write(format!("{tag} SELECT INBOX\r\n").as_bytes())
            .read(b"* 2 EXISTS\r\n* OK [UIDVALIDITY 5] ok\r\n")
            .read(format!("* OK [UIDNEXT {uid_next}] ok\r\n").as_bytes())
            .read(format!("{tag} OK [READ-WRITE] done\r\n").as_bytes())
    }

    async fn remote(mock: Mock, quirks: ServerQuirks) -> ImapRemote<Mock> {
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.login("u", "p").await.unwrap();
        ImapRemote::new(client, quirks)
    }

    mod select_tests {
        use super::*;

        #[tokio::test]
        async fn select_reports_counts() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42);
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            let folder = remote.select("INBOX").await.unwrap();
            assert_eq!(
                folder,
                SelectedFolder {
                    exists: 2,
                    uid_validity: 5,
                    uid_next: Some(42)
                }
            );
        }

        #[tokio::test]
        async fn uid_next_by_status() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 STATUS INBOX (UIDNEXT)\r\n")
                .read(b"* STATUS INBOX (UIDNEXT 43)\r\nA0003 OK done\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            remote.select("INBOX").await.unwrap();
            assert_eq!(remote.uid_next("INBOX").await.unwrap(), 43);
        }

        #[tokio::test]
        async fn uid_next_by_reselect() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42);
            select_inbox(&mut builder, "A0003", 44);
            let quirks = ServerQuirks {
                uid_next_requires_select: true,
                ..ServerQuirks::standard()
            };
            let remote = remote(builder.build(), quirks).await;
            remote.select("INBOX").await.unwrap();
            assert_eq!(remote.uid_next("INBOX").await.unwrap(), 44);
        }

        #[tokio::test]
        async fn refused_select_keeps_session() {
            let mut builder = Builder::new();
            logged_in(&mut builder)
                .write(b"A0002 SELECT Nope\r\n")
                .read(b"A0002 NO no such mailbox\r\n");
            select_inbox(&mut builder, "A0003", 42);
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            let err = remote.select("Nope").await.unwrap_err();
            assert!(matches!(err, Error::Imap(mailmirror_imap::Error::No(_))));
            let (tx, _rx) = mpsc::channel(1);
            assert!(remote.list(1, tx).await.is_err());
            assert_eq!(remote.select("INBOX").await.unwrap().exists, 2);
        }
    }

    mod fetch_tests {
        use super::*;

        #[tokio::test]
        async fn list_translates_flags() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 FETCH 1:2 (UID FLAGS RFC822.SIZE)\r\n")
                .read(b"* 1 FETCH (UID 7 FLAGS (\\Seen \\Flagged) RFC822.SIZE 120)\r\n")
                .read(b"* 2 FETCH (UID 9 FLAGS (\\Answered) RFC822.SIZE 60000000)\r\n")
                .read(b"A0003 OK FETCH completed\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            remote.select("INBOX").await.unwrap();

            let (tx, mut rx) = mpsc::channel(10);
            remote.list(2, tx).await.unwrap();
            let first = rx.recv().await.unwrap();
            assert_eq!((first.seq, first.uid), (1, 7));
            assert_eq!(first.flags.to_maildir(), "S");
            assert_eq!(first.size, Some(120));
            assert!(!exceeds_fetch_limit(&first));
            let second = rx.recv().await.unwrap();
            assert_eq!(second.uid, 9);
            assert_eq!(second.flags.to_maildir(), "R");
            assert!(exceeds_fetch_limit(&second));
            assert!(rx.recv().await.is_none());
        }

        #[tokio::test]
        async fn empty_listing_sends_nothing() {
            let mut builder = Builder::new();
            logged_in(&mut builder);
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            let (tx, mut rx) = mpsc::channel(1);
            remote.list(0, tx).await.unwrap();
            assert!(rx.recv().await.is_none());
        }
    }

    mod mutation_tests {
        use super::*;

        #[tokio::test]
        async fn append_sends_wire_form() {
            let mut builder = Builder::new();
            logged_in(&mut builder)
                .write(b"A0002 APPEND INBOX (\\Seen) \"01-Jul-2003 10:52:37 +0200\" {6}\r\n")
                .read(b"+ go ahead\r\n")
                .write(b"a\r\nb\r\n\r\n")
                .read(b"A0002 OK [APPENDUID 5 100] APPEND completed\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            let date = DateTime::parse_from_rfc2822("Tue, 1 Jul 2003 10:52:37 +0200").unwrap();
            let flags = FlagSet::from_maildir("S");
            let uid = remote
                .append("INBOX", flags, Some(date), b"a\nb\n".to_vec())
                .await
                .unwrap();
            assert_eq!(uid, Some(100));
        }

        #[tokio::test]
        async fn delete_uids_stores_then_expunges() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 UID STORE 7,9 +FLAGS.SILENT (\\Deleted)\r\n")
                .read(b"A0003 OK STORE completed\r\n")
                .write(b"A0004 EXPUNGE\r\n")
                .read(b"* 2 EXPUNGE\r\n* 1 EXPUNGE\r\nA0004 OK EXPUNGE completed\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            remote.select("INBOX").await.unwrap();
            remote.delete_uids(vec![9, 7]).await.unwrap();
        }

        #[tokio::test]
        async fn add_flags_by_uid() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 UID STORE 7 +FLAGS.SILENT (\\Seen \\Answered)\r\n")
                .read(b"A0003 OK STORE completed\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            remote.select("INBOX").await.unwrap();
            remote
                .add_flags(vec![7], FlagSet::from_maildir("RS"))
                .await
                .unwrap();
        }
    }

    mod idle_tests {
        use super::*;

        #[tokio::test]
        async fn stop_token_ends_idle() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 IDLE\r\n")
                .read(b"+ idling\r\n")
                .write(b"DONE\r\n")
                .read(b"A0003 OK idle done\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            let stop = CancellationToken::new();
            stop.cancel();
            let outcome = remote.idle("INBOX", stop).await.unwrap();
            assert_eq!(outcome, IdleOutcome::Stopped);
        }

        #[tokio::test]
        async fn exists_is_a_change() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 IDLE\r\n")
                .read(b"+ idling\r\n")
                .read(b"* 3 EXISTS\r\n")
                .write(b"DONE\r\n")
                .read(b"A0003 OK idle done\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            let outcome = remote.idle("INBOX", CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, IdleOutcome::Changed);
        }

        #[tokio::test]
        async fn bye_is_forced_logout() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 IDLE\r\n")
                .read(b"+ idling\r\n")
                .read(b"* BYE session expired\r\n");
            let remote = remote(builder.build(), ServerQuirks::standard()).await;
            let err = remote
                .idle("INBOX", CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::LoggedOut(_)));
        }

        #[tokio::test(start_paused = true)]
        async fn refresh_reissues_idle() {
            let mut builder = Builder::new();
            select_inbox(logged_in(&mut builder), "A0002", 42)
                .write(b"A0003 IDLE\r\n")
                .read(b"+ idling\r\n")
                .write(b"DONE\r\n")
                .read(b"A0003 OK idle done\r\n")
                .write(b"A0004 IDLE\r\n")
                .read(b"+ idling\r\n")
                .read(b"* 1 EXPUNGE\r\n")
                .write(b"DONE\r\n")
                .read(b"A0004 OK idle done\r\n");
            let quirks = ServerQuirks {
                idle_refresh: Duration::from_secs(60),
                ..ServerQuirks::standard()
            };
            let remote = remote(builder.build(), quirks).await;
            let outcome = remote.idle("INBOX", CancellationToken::new()).await.unwrap();
            assert_eq!(outcome, IdleOutcome::Changed);
        }
    }
}
