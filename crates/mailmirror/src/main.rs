//! `mailmirror` - keeps IMAP folders and local maildirs in sync.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod control;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailmirror_core::{Archive, Config, ImapConnector, Memory, Session};
use mailmirror_maildir::Maildir;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "mailmirror=info,mailmirror_core=info,mailmirror_imap=warn";

#[derive(Parser, Debug)]
#[command(name = "mailmirror")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the synchronization daemon
    Run {
        /// Configuration file, or `-` for stdin (default: <config dir>/mailmirror/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Ask a running daemon to synchronize now
    Wake {
        /// Account directory of the daemon
        #[arg(short, long)]
        directory: PathBuf,
    },
    /// Maintain the content-addressed archive
    #[command(subcommand)]
    Archive(ArchiveCommands),
}

#[derive(Subcommand, Debug)]
enum ArchiveCommands {
    /// Move every file under a directory into the archive
    Forward {
        /// Directory to empty into the archive
        #[arg(short, long)]
        source: PathBuf,
        /// Archive root
        #[arg(short, long)]
        target: PathBuf,
    },
    /// Copy every archive entry into a maildir
    Reverse {
        /// Archive root
        #[arg(short, long)]
        archive: PathBuf,
        /// Destination maildir
        #[arg(short, long)]
        maildir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match dispatch(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run { config } => run(config).await,
        Commands::Wake { directory } => {
            let reply = control::wake(&directory.join(".socket")).await?;
            print!("{reply}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Archive(ArchiveCommands::Forward { source, target }) => {
            let moved = Archive::new(target)
                .forward(&source)
                .with_context(|| format!("archiving {}", source.display()))?;
            info!(count = moved, "archived");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Archive(ArchiveCommands::Reverse { archive, maildir }) => {
            let maildir = Maildir::new(maildir);
            maildir.init().context("creating maildir")?;
            let copied = Archive::new(archive).reverse(&maildir)?;
            info!(count = copied, "restored");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(path: Option<PathBuf>) -> Result<ExitCode> {
    let path = path
        .or_else(Config::default_path)
        .context("no configuration path")?;
    let config =
        Config::load(&path).with_context(|| format!("loading {}", path.display()))?;
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("creating {}", config.directory.display()))?;
    let memory = Memory::load(config.memory_path()).context("loading sync state")?;

    let (signals, receiver) = mpsc::channel(1);
    let listener = control::bind(&config.socket_path())?;
    tokio::spawn(control::serve(listener, signals.clone()));
    control::forward_termination(signals)?;

    info!(directory = %config.directory.display(), folders = config.folders.len(), "starting");
    let connector = ImapConnector::new(&config);
    let mut session = Session::new(config, connector, memory, receiver);
    session.run().await?;
    // Terminated by a signal.
    Ok(ExitCode::FAILURE)
}
