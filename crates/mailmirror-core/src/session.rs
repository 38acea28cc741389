//! The long-running connect, sync, idle loop.
//!
//! Each session connects, runs a pass over every configured folder, drains
//! the remote archive folder, then idles until something wakes it. Remote
//! changes and control requests start another pass on the same
//! connection. Lifetime expiry and server logouts reconnect immediately.
//! Other connection-level failures reconnect after a short backoff.
//! Errors that mean the local state cannot be trusted end the loop.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use mailmirror_maildir::Maildir;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::Archive;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::memory::Memory;
use crate::reconcile::Reconciler;
use crate::remote::{Connector, IdleOutcome, RemoteMailbox};

/// Delay before reconnecting after a failed session.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// A request from outside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Run a pass now.
    Wake,
    /// Log out and stop.
    Terminate,
}

/// Why an idle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The server reported a change.
    Changed,
    /// A wake request arrived on the control channel.
    Control,
    /// A termination signal arrived.
    Terminate,
    /// The session lifetime ran out.
    Expired,
    /// The server ended the session.
    LoggedOut,
}

/// Ends one idle wait. Only the first cause is recorded.
#[derive(Debug, Default)]
pub struct Wake {
    token: CancellationToken,
    reason: OnceLock<WakeReason>,
}

impl Wake {
    /// Creates an unfired wake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reason` and cancels the wait. Returns false if an earlier
    /// cause already fired.
    pub fn fire(&self, reason: WakeReason) -> bool {
        if self.reason.set(reason).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// The cause that fired, if any.
    #[must_use]
    pub fn reason(&self) -> Option<WakeReason> {
        self.reason.get().copied()
    }

    /// Token cancelled when the wake fires.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

enum SessionEnd {
    Reconnect,
    Terminate,
}

/// The synchronization daemon.
pub struct Session<C> {
    connector: C,
    config: Config,
    memory: Memory,
    signals: mpsc::Receiver<Signal>,
    signals_open: bool,
    backoff: Duration,
}

impl<C: Connector> Session<C> {
    /// Creates a session loop. `memory` must have been loaded from
    /// [`Config::memory_path`].
    pub fn new(
        config: Config,
        connector: C,
        memory: Memory,
        signals: mpsc::Receiver<Signal>,
    ) -> Self {
        Self {
            connector,
            config,
            memory,
            signals,
            signals_open: true,
            backoff: RECONNECT_BACKOFF,
        }
    }

    /// Overrides the reconnect delay.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The sync state.
    #[must_use]
    pub const fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Runs until a termination signal arrives or a fatal error occurs.
    ///
    /// Returns `Ok(())` after a termination signal.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.run_once().await {
                Ok(SessionEnd::Terminate) => {
                    info!("terminated");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {
                    info!("reconnecting");
                }
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "stopping");
                    return Err(err);
                }
                Err(err) => {
                    warn!(error = %err, backoff = ?self.backoff, "session failed");
                    if self.pause().await {
                        info!("terminated");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleeps for the backoff. Returns true if terminated meanwhile.
    async fn pause(&mut self) -> bool {
        let sleep = time::sleep(self.backoff);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return false,
                signal = self.signals.recv(), if self.signals_open => match signal {
                    Some(Signal::Terminate) => return true,
                    Some(Signal::Wake) => {}
                    None => self.signals_open = false,
                },
            }
        }
    }

    async fn run_once(&mut self) -> Result<SessionEnd> {
        info!(host = %self.config.host, "connecting");
        let remote = self.connector.connect().await?;
        let started = Instant::now();
        let reconciler = Reconciler::new(
            Arc::clone(&remote),
            Archive::new(self.config.overflow_path()),
            self.config.size_limit,
        );

        loop {
            self.pass(&remote, &reconciler).await?;

            let remaining = self.config.session_lifetime.saturating_sub(started.elapsed());
            let reason = self.idle(&*remote, remaining).await?;
            info!(?reason, "woke");
            match reason {
                WakeReason::Changed | WakeReason::Control => {}
                WakeReason::Terminate => {
                    logout(&*remote).await;
                    return Ok(SessionEnd::Terminate);
                }
                WakeReason::Expired => {
                    logout(&*remote).await;
                    return Ok(SessionEnd::Reconnect);
                }
                WakeReason::LoggedOut => return Ok(SessionEnd::Reconnect),
            }
        }
    }

    async fn pass(&mut self, remote: &C::Remote, reconciler: &Reconciler<C::Remote>) -> Result<()> {
        for folder in &self.config.folders {
            let selected = match remote.select(&folder.remote).await {
                Ok(selected) => selected,
                // A dead connection surfaces again when idling.
                Err(err) => {
                    warn!(folder = %folder.title, error = %err, "cannot select, skipping");
                    continue;
                }
            };
            let maildir = Maildir::new(self.config.folder_path(&folder.title));
            reconciler
                .sync_folder(&mut self.memory, folder, &maildir, selected)
                .await?;
        }

        if let Some(name) = &self.config.archive_folder {
            match remote.select(name).await {
                Ok(selected) => {
                    let archive = Maildir::new(self.config.archive_path());
                    reconciler.drain(name, selected, &archive).await?;
                }
                Err(err) => warn!(folder = %name, error = %err, "cannot select archive folder"),
            }
        }
        Ok(())
    }

    /// Idles until one cause fires. Requests queued during the pass are
    /// handled first.
    async fn idle(&mut self, remote: &C::Remote, lifetime: Duration) -> Result<WakeReason> {
        match self.signals.try_recv() {
            Ok(Signal::Terminate) => return Ok(WakeReason::Terminate),
            Ok(Signal::Wake) => return Ok(WakeReason::Control),
            Err(mpsc::error::TryRecvError::Disconnected) => self.signals_open = false,
            Err(mpsc::error::TryRecvError::Empty) => {}
        }
        if lifetime.is_zero() {
            return Ok(WakeReason::Expired);
        }

        debug!(folder = %self.config.idle_folder, ?lifetime, "idling");
        let wake = Wake::new();
        let idle = remote.idle(&self.config.idle_folder, wake.token());
        tokio::pin!(idle);
        let deadline = time::sleep(lifetime);
        tokio::pin!(deadline);
        let mut expired = false;

        let outcome = loop {
            tokio::select! {
                outcome = &mut idle => break outcome,
                () = &mut deadline, if !expired => {
                    expired = true;
                    wake.fire(WakeReason::Expired);
                }
                signal = self.signals.recv(), if self.signals_open => match signal {
                    Some(Signal::Wake) => {
                        wake.fire(WakeReason::Control);
                    }
                    Some(Signal::Terminate) => {
                        wake.fire(WakeReason::Terminate);
                    }
                    None => self.signals_open = false,
                },
            }
        };

        match outcome {
            Ok(IdleOutcome::Changed) => {
                wake.fire(WakeReason::Changed);
            }
            Ok(IdleOutcome::Stopped) => {}
            Err(Error::LoggedOut(text)) => {
                info!(%text, "server ended the session");
                wake.fire(WakeReason::LoggedOut);
            }
            Err(err) => return Err(err),
        }
        Ok(wake.reason().unwrap_or(WakeReason::Changed))
    }
}

async fn logout<R: RemoteMailbox>(remote: &R) {
    if let Err(err) = remote.logout().await {
        debug!(error = %err, "logout failed");
    }
}
