//! Control socket and OS signal handling.
//!
//! Any connection to the socket is a wake request. The payload is ignored
//! and the peer gets a minimal HTTP response, so `curl --unix-socket` works
//! as well as `mailmirror wake`.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use mailmirror_core::Signal;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reply sent to every control connection.
pub const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 16\r\n\r\nsignal received\n";

const REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";

/// Binds the control socket, replacing a stale one.
pub fn bind(path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("removing {}", path.display())),
    }
    UnixListener::bind(path).with_context(|| format!("binding {}", path.display()))
}

/// Accepts connections forever, posting a wake for each.
pub async fn serve(listener: UnixListener, signals: mpsc::Sender<Signal>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                // A full queue already holds a pending request.
                if signals.try_send(Signal::Wake).is_ok() {
                    info!("wake requested");
                }
                tokio::spawn(async move {
                    if let Err(e) = acknowledge(stream).await {
                        debug!(error = %e, "control connection failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "control accept failed"),
        }
    }
}

async fn acknowledge(mut stream: UnixStream) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;
    stream.write_all(RESPONSE).await?;
    stream.shutdown().await
}

/// Sends a wake request to a running daemon and returns the reply body.
pub async fn wake(path: &Path) -> Result<String> {
    let mut stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("connecting to {}", path.display()))?;
    stream.write_all(REQUEST).await?;
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    let reply = String::from_utf8_lossy(&reply);
    Ok(reply
        .split_once("\r\n\r\n")
        .map_or_else(|| reply.to_string(), |(_, body)| body.to_string()))
}

/// Forwards SIGINT and SIGTERM as [`Signal::Terminate`].
pub fn forward_termination(signals: mpsc::Sender<Signal>) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("received SIGINT"),
            _ = terminate.recv() => info!("received SIGTERM"),
        }
        let _ = signals.send(Signal::Terminate).await;
    });
    Ok(())
}
