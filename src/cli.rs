use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;

use crate::activity::ActivityLog;
use crate::config::{self, Settings, SettingsStore};
use crate::github::{BoardClient, GitHubClient, TokenCheck};
use crate::model::{IssueRef, Status};
use crate::notify::NotificationRelay;
use crate::reconcile::{is_repo_allowed, Outcome, Reconciler};
use crate::relay::{self, Relay};

/// Sync GitHub issue reactions to a ProjectV2 board's Status column.
#[derive(Debug, Parser)]
#[command(name = "reaction-sync", author, version, about)]
pub struct Cli {
    /// Directory holding settings.toml and activity.json
    #[arg(long, global = true, env = "REACTION_SYNC_HOME")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve JSON-lines commands on stdin, answering on stdout
    Relay,
    /// Add an issue to the board, or move it, with the given status
    Add {
        /// `owner/repo#N` or an issue URL
        issue: IssueRef,
        #[arg(long, short)]
        status: Status,
        #[arg(long)]
        title: Option<String>,
    },
    /// Check a token against GitHub (defaults to the stored one)
    TestToken {
        #[arg(long)]
        token: Option<String>,
    },
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Show recently synced issues, newest first
    Activity {
        #[arg(long, short = 'n')]
        limit: Option<usize>,
        /// Empty the log instead of printing it
        #[arg(long, conflicts_with = "limit")]
        clear: bool,
    },
    /// Report whether reactions on this issue's repository would be synced
    CheckRepo { issue: IssueRef },
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the stored settings with the token masked
    Show,
    /// Update a single setting
    Set { key: String, value: String },
    /// Print whether the board connection is configured
    Status,
}

impl Cli {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(config::data_dir)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let dir = cli.data_dir();
    let store = SettingsStore::new(&dir);
    match cli.command {
        Commands::Relay => handle_relay(&dir, store).await,
        Commands::Add {
            issue,
            status,
            title,
        } => handle_add(&dir, &store, issue, status, title).await,
        Commands::TestToken { token } => handle_test_token(&store, token).await,
        Commands::Settings(cmd) => handle_settings(&store, cmd),
        Commands::Activity { limit, clear } => handle_activity(&dir, limit, clear).await,
        Commands::CheckRepo { issue } => handle_check_repo(&store, &issue),
    }
}

fn reconciler(dir: &Path, settings: &Settings, notifier: NotificationRelay) -> Reconciler {
    let api = GitHubClient::new(settings.api_base());
    Reconciler::new(
        BoardClient::new(Arc::new(api)),
        Arc::new(ActivityLog::new(dir)),
        notifier,
    )
}

async fn handle_relay(dir: &Path, store: SettingsStore) -> Result<()> {
    // The API base is fixed for the lifetime of the relay; everything else is re-read per command.
    let settings = store.load()?;
    let (toast_tx, toast_rx) = mpsc::unbounded_channel();
    let reconciler = Arc::new(reconciler(dir, &settings, NotificationRelay::new(toast_tx)));
    let relay = Arc::new(Relay::new(store, reconciler));

    info!(data_dir = %dir.display(), "relay listening on stdin");
    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = relay::serve(relay, input, tokio::io::stdout(), toast_rx) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(())
        }
    }
}

async fn handle_add(
    dir: &Path,
    store: &SettingsStore,
    issue: IssueRef,
    status: Status,
    title: Option<String>,
) -> Result<()> {
    let settings = store.load()?;
    let issue = match title {
        Some(title) => issue.with_title(title),
        None => issue,
    };
    let outcome = reconciler(dir, &settings, NotificationRelay::disabled())
        .reconcile(&issue, status, &settings)
        .await
        .with_context(|| format!("Failed to sync {issue}"))?;

    match outcome {
        Outcome::Created { item_id } => {
            println!("Added {issue} to the board as {status} ({item_id})");
        }
        Outcome::Updated { item_id } => println!("Moved {issue} to {status} ({item_id})"),
        Outcome::Unchanged { item_id } => {
            println!("{issue} is already in {status} ({item_id})");
        }
    }
    Ok(())
}

async fn handle_test_token(store: &SettingsStore, token: Option<String>) -> Result<()> {
    let settings = store.load()?;
    let token = match token.as_deref().or(settings.token()) {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => bail!("No token given and none stored. Use --token or `settings set token <t>`"),
    };

    let board = BoardClient::new(Arc::new(GitHubClient::new(settings.api_base())));
    match board.test_token(&token).await {
        TokenCheck::Valid { username, .. } => {
            println!("Token is valid for {username}");
            Ok(())
        }
        TokenCheck::Invalid { error, .. } => bail!("{error}"),
    }
}

fn masked(settings: &Settings) -> Settings {
    let mut shown = settings.clone();
    if !shown.token.is_empty() {
        shown.token = "[REDACTED]".into();
    }
    shown
}

fn handle_settings(store: &SettingsStore, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show => {
            let settings = store.load()?;
            let text = toml::to_string_pretty(&masked(&settings))
                .context("Failed to render settings")?;
            println!("# {}", store.path().display());
            print!("{text}");
        }
        SettingsCommand::Set { key, value } => {
            let mut settings = store.load()?;
            settings.set(&key, &value)?;
            store.save(&settings)?;
            println!("Updated {key}");
        }
        SettingsCommand::Status => {
            let settings = store.load()?;
            println!("{}", settings.connection_state());
        }
    }
    Ok(())
}

async fn handle_activity(dir: &Path, limit: Option<usize>, clear: bool) -> Result<()> {
    let log = ActivityLog::new(dir);
    if clear {
        log.clear().await?;
        println!("Cleared {}", log.path().display());
        return Ok(());
    }

    let records = log.list(limit).await;
    if records.is_empty() {
        println!("No activity yet");
    }
    for record in records {
        println!(
            "{}  {:<11}  {}  {}",
            record.processed_at.format("%Y-%m-%d %H:%M:%S"),
            record.status.as_str(),
            record.issue,
            record.issue.title
        );
    }
    Ok(())
}

fn handle_check_repo(store: &SettingsStore, issue: &IssueRef) -> Result<()> {
    let settings = store.load()?;
    if is_repo_allowed(issue, &settings) {
        println!("{}: allowed", issue.repo_slug());
    } else {
        println!("{}: not in the allow-list", issue.repo_slug());
    }
    Ok(())
}
