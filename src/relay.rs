//! Message relay between the page-side producer and the board.
//!
//! Commands arrive as newline-delimited JSON, each handled on its own task.
//! Replies and toasts leave through a single writer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ConnectionState, Settings, SettingsPatch, SettingsStore};
use crate::error::SyncError;
use crate::event::{self, Event};
use crate::github::TokenCheck;
use crate::model::{IssueRef, Reactions, Status};
use crate::notify::Notification;
use crate::observer::ReactionTracker;
use crate::reconcile::{is_repo_allowed, Outcome, Reconciler};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    ReactionDetected {
        #[serde(rename = "issueInfo")]
        issue_info: IssueRef,
        reactions: Reactions,
    },
    AddToProject {
        #[serde(rename = "issueInfo")]
        issue_info: IssueRef,
        #[serde(rename = "targetStatus")]
        target_status: Status,
    },
    GetSettings,
    SaveSettings {
        /// Partial, camelCase; validated against [`SettingsPatch`] by the handler.
        settings: serde_json::Value,
    },
    TestToken {
        token: String,
    },
}

/// A command plus the optional correlation id echoed on its reply.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AddReply {
    pub fn from_result(status: Status, result: Result<Outcome, SyncError>) -> Self {
        match result {
            Ok(outcome) => {
                let mut reply = AddReply {
                    success: true,
                    item_id: Some(outcome.item_id().to_string()),
                    status: Some(status),
                    ..Default::default()
                };
                if outcome.created() {
                    reply.added = Some(true);
                } else {
                    reply.updated = Some(outcome.applied());
                }
                reply
            }
            Err(err) => AddReply::failed(err.to_string()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        AddReply {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Add(AddReply),
    Settings(Settings),
    Saved {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Token(TokenCheck),
    Rejected { success: bool, error: String },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Outgoing {
    Reply {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        #[serde(flatten)]
        reply: Reply,
    },
    Toast(Notification),
}

pub struct Relay {
    store: SettingsStore,
    reconciler: Arc<Reconciler>,
    tracker: Mutex<ReactionTracker>,
}

impl Relay {
    pub fn new(store: SettingsStore, reconciler: Arc<Reconciler>) -> Self {
        Self {
            store,
            reconciler,
            tracker: Mutex::new(ReactionTracker::new()),
        }
    }

    /// Fire-and-forget commands produce no reply.
    pub async fn handle(&self, command: Command) -> Option<Reply> {
        match command {
            Command::ReactionDetected {
                issue_info,
                reactions,
            } => {
                self.on_reaction_detected(issue_info.normalized(), reactions)
                    .await;
                None
            }
            Command::AddToProject {
                issue_info,
                target_status,
            } => Some(Reply::Add(
                self.on_add_to_project(issue_info.normalized(), target_status)
                    .await,
            )),
            Command::GetSettings => Some(self.on_get_settings()),
            Command::SaveSettings { settings } => Some(self.on_save_settings(settings)),
            Command::TestToken { token } => Some(Reply::Token(self.on_test_token(&token).await)),
        }
    }

    async fn on_reaction_detected(&self, issue: IssueRef, reactions: Reactions) {
        let settings = match self.store.load() {
            Ok(settings) => settings,
            Err(err) => {
                warn!(?err, "could not load settings");
                return;
            }
        };
        if settings.connection_state() != ConnectionState::Ready {
            debug!(%issue, "reaction ignored: not configured");
            return;
        }

        // Blocked repos never reach the tracker.
        if !is_repo_allowed(&issue, &settings) {
            debug!(%issue, "repository not in allow-list");
            return;
        }

        let state = reactions.resolve(&settings.emoji_set());
        let status = {
            let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
            tracker.observe(&issue, state)
        };
        let Some(status) = status else {
            debug!(%issue, ?state, "no reaction change to sync");
            return;
        };

        if let Err(err) = self.reconciler.reconcile(&issue, status, &settings).await {
            debug!(%issue, %status, %err, "reaction sync failed");
        }
    }

    async fn on_add_to_project(&self, issue: IssueRef, status: Status) -> AddReply {
        let settings = match self.store.load() {
            Ok(settings) => settings,
            Err(err) => return AddReply::failed(format!("{err:#}")),
        };
        let result = self.reconciler.reconcile(&issue, status, &settings).await;
        if let Err(err) = &result {
            info!(%issue, %status, %err, "add to project failed");
        }
        AddReply::from_result(status, result)
    }

    fn on_get_settings(&self) -> Reply {
        match self.store.load() {
            Ok(settings) => Reply::Settings(settings),
            Err(err) => Reply::Rejected {
                success: false,
                error: format!("{err:#}"),
            },
        }
    }

    fn on_save_settings(&self, update: serde_json::Value) -> Reply {
        match self.merge_settings(update) {
            Ok(()) => {
                info!(path = %self.store.path().display(), "settings saved");
                Reply::Saved {
                    success: true,
                    error: None,
                }
            }
            Err(err) => {
                warn!(?err, "failed to save settings");
                Reply::Saved {
                    success: false,
                    error: Some(format!("{err:#}")),
                }
            }
        }
    }

    fn merge_settings(&self, update: serde_json::Value) -> Result<()> {
        let patch: SettingsPatch = serde_json::from_value(update).context("Invalid settings")?;
        let mut settings = self.store.load()?;
        settings.merge(patch);
        self.store.save(&settings)
    }

    async fn on_test_token(&self, token: &str) -> TokenCheck {
        if token.trim().is_empty() {
            return TokenCheck::invalid("Please enter a GitHub token first");
        }
        self.reconciler.board().test_token(token.trim()).await
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, message: &Outgoing) -> Result<()> {
    let mut line = serde_json::to_vec(message).context("Failed to encode message")?;
    line.push(b'\n');
    output
        .write_all(&line)
        .await
        .context("Failed to write to output")?;
    output.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Serve commands from `input` until it closes and every in-flight command
/// has finished, writing replies and toasts to `output`.
pub async fn serve<R, W>(
    relay: Arc<Relay>,
    input: R,
    mut output: W,
    mut toasts: mpsc::UnboundedReceiver<Notification>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(event::run_event_loop(input, event_tx));

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
    let mut tasks = JoinSet::new();
    let mut input_open = true;

    loop {
        tokio::select! {
            event = event_rx.recv(), if input_open => match event {
                Some(Event::Command(envelope)) => {
                    let relay = relay.clone();
                    let out_tx = out_tx.clone();
                    tasks.spawn(async move {
                        if let Some(reply) = relay.handle(envelope.command).await {
                            let _ = out_tx.send(Outgoing::Reply { id: envelope.id, reply });
                        }
                    });
                }
                Some(Event::Malformed(error)) => {
                    warn!(%error, "malformed command");
                    let reply = Reply::Rejected { success: false, error };
                    write_line(&mut output, &Outgoing::Reply { id: None, reply }).await?;
                }
                None => input_open = false,
            },
            Some(message) = out_rx.recv() => write_line(&mut output, &message).await?,
            Some(toast) = toasts.recv() => write_line(&mut output, &Outgoing::Toast(toast)).await?,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(err) = joined {
                    warn!(?err, "command task panicked");
                }
            }
        }

        if !input_open && tasks.is_empty() {
            while let Ok(message) = out_rx.try_recv() {
                write_line(&mut output, &message).await?;
            }
            while let Ok(toast) = toasts.try_recv() {
                write_line(&mut output, &Outgoing::Toast(toast)).await?;
            }
            break;
        }
    }

    info!("input closed; relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLog;
    use crate::github::mock::MockGitHub;
    use crate::github::BoardClient;
    use crate::notify::NotificationRelay;
    use serde_json::{json, Value};

    const FIELD: &str = "PVTSSF_status";

    struct Fixture {
        relay: Arc<Relay>,
        mock: MockGitHub,
        store: SettingsStore,
        toasts: mpsc::UnboundedReceiver<Notification>,
        _dir: tempfile::TempDir,
    }

    fn issue() -> IssueRef {
        IssueRef::new("acme", "widgets", 42)
    }

    fn ready_settings() -> Settings {
        Settings {
            token: "ghp_test".into(),
            project_owner: "acme".into(),
            project_number: Some(1),
            project_id: "PVT_board".into(),
            status_field_id: FIELD.into(),
            todo_option_id: "T1".into(),
            in_progress_option_id: "P1".into(),
            done_option_id: "D1".into(),
            allowed_repos: vec!["acme/widgets".into()],
            ..Default::default()
        }
    }

    fn fixture(mock: MockGitHub, settings: Option<Settings>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        if let Some(settings) = settings {
            store.save(&settings).unwrap();
        }
        let (tx, toasts) = mpsc::unbounded_channel();
        let reconciler = Arc::new(Reconciler::new(
            BoardClient::new(Arc::new(mock.clone())),
            Arc::new(ActivityLog::new(dir.path())),
            NotificationRelay::new(tx),
        ));
        Fixture {
            relay: Arc::new(Relay::new(store.clone(), reconciler)),
            mock,
            store,
            toasts,
            _dir: dir,
        }
    }

    fn command(value: Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    fn reaction(done: bool) -> Command {
        command(json!({
            "type": "REACTION_DETECTED",
            "issueInfo": {
                "owner": "acme",
                "repo": "widgets",
                "issueNumber": 42,
                "title": "Crash"
            },
            "reactions": { "todo": false, "inProgress": false, "done": done }
        }))
    }

    #[tokio::test]
    async fn add_to_project_reports_added_then_unchanged() {
        let mut f = fixture(
            MockGitHub::new().with_issue(&issue(), "I_42"),
            Some(ready_settings()),
        );
        let add = command(json!({
            "type": "ADD_TO_PROJECT",
            "issueInfo": { "owner": "acme", "repo": "widgets", "issueNumber": 42 },
            "targetStatus": "Done"
        }));

        let first = f.relay.handle(add.clone()).await.unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            json!({ "success": true, "itemId": "PVTI_new_1", "status": "Done", "added": true })
        );
        let toast = f.toasts.try_recv().unwrap();
        assert_eq!(toast.issue_info.url, "https://github.com/acme/widgets/issues/42");

        let second = f.relay.handle(add).await.unwrap();
        assert_eq!(
            serde_json::to_value(&second).unwrap(),
            json!({ "success": true, "itemId": "PVTI_new_1", "status": "Done", "updated": false })
        );
        assert!(f.toasts.try_recv().is_err());
    }

    #[tokio::test]
    async fn add_to_project_reports_update() {
        let f = fixture(
            MockGitHub::new()
                .with_issue(&issue(), "I_42")
                .with_item("PVTI_42", "I_42", FIELD, Some("T1")),
            Some(ready_settings()),
        );
        let reply = f
            .relay
            .handle(Command::AddToProject {
                issue_info: issue(),
                target_status: Status::InProgress,
            })
            .await
            .unwrap();
        assert_eq!(
            reply,
            Reply::Add(AddReply {
                success: true,
                item_id: Some("PVTI_42".into()),
                status: Some(Status::InProgress),
                updated: Some(true),
                ..Default::default()
            })
        );
    }

    #[tokio::test]
    async fn add_to_project_without_settings_fails_cleanly() {
        let f = fixture(MockGitHub::new(), None);
        let reply = f
            .relay
            .handle(Command::AddToProject {
                issue_info: issue(),
                target_status: Status::Todo,
            })
            .await
            .unwrap();
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["error"]
            .as_str()
            .unwrap()
            .contains("not configured"));
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn reaction_syncs_once_per_change() {
        let mut f = fixture(
            MockGitHub::new().with_issue(&issue(), "I_42"),
            Some(ready_settings()),
        );

        assert!(f.relay.handle(reaction(true)).await.is_none());
        assert!(f.relay.handle(reaction(true)).await.is_none());

        assert_eq!(f.mock.count("add_item"), 1);
        assert_eq!(f.mock.count("issue_node_id"), 2);
        assert_eq!(f.toasts.try_recv().unwrap().status, Status::Done);
    }

    #[tokio::test]
    async fn reaction_respects_allow_list() {
        let settings = Settings {
            allowed_repos: vec!["acme/other".into()],
            ..ready_settings()
        };
        let f = fixture(MockGitHub::new().with_issue(&issue(), "I_42"), Some(settings));

        f.relay.handle(reaction(true)).await;

        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn reaction_ignored_until_configured() {
        let settings = Settings {
            project_number: None,
            ..ready_settings()
        };
        let f = fixture(MockGitHub::new().with_issue(&issue(), "I_42"), Some(settings));

        f.relay.handle(reaction(true)).await;

        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn reaction_errors_are_swallowed() {
        let mut f = fixture(
            MockGitHub::new()
                .with_issue(&issue(), "I_42")
                .failing_add("boom"),
            Some(ready_settings()),
        );

        assert!(f.relay.handle(reaction(true)).await.is_none());
        assert!(f.toasts.try_recv().is_err());
    }

    #[tokio::test]
    async fn raw_reactions_use_configured_emoji() {
        let settings = Settings {
            progress_emoji: "\u{1F525}".into(),
            ..ready_settings()
        };
        let f = fixture(
            MockGitHub::new()
                .with_issue(&issue(), "I_42")
                .with_item("PVTI_42", "I_42", FIELD, Some("T1")),
            Some(settings),
        );

        f.relay
            .handle(command(json!({
                "type": "REACTION_DETECTED",
                "issueInfo": { "owner": "acme", "repo": "widgets", "issueNumber": 42 },
                "reactions": [
                    { "emoji": "\u{1F525}", "mine": true },
                    { "emoji": "\u{2705}", "mine": false }
                ]
            })))
            .await;

        assert_eq!(f.mock.status_of("PVTI_42", FIELD).as_deref(), Some("P1"));
    }

    #[tokio::test]
    async fn save_settings_merges_camel_case_keys() {
        let f = fixture(MockGitHub::new(), Some(ready_settings()));

        let saved = f
            .relay
            .handle(command(json!({
                "type": "SAVE_SETTINGS",
                "settings": {
                    "token": "ghp_new",
                    "projectId": "PVT_other",
                    "doneOptionId": "D2",
                    "allowedRepos": ["acme/gadgets"],
                    "applyToAll": true
                }
            })))
            .await
            .unwrap();
        assert_eq!(
            saved,
            Reply::Saved {
                success: true,
                error: None
            }
        );

        let stored = f.store.load().unwrap();
        assert_eq!(stored.token, "ghp_new");
        assert_eq!(stored.project_id, "PVT_other");
        assert_eq!(stored.done_option_id, "D2");
        assert_eq!(stored.allowed_repos, vec!["acme/gadgets"]);
        assert!(stored.apply_to_all);
        // untouched keys survive the save
        assert_eq!(stored.status_field_id, FIELD);
        assert_eq!(stored.todo_option_id, "T1");
        assert_eq!(stored.project_number, Some(1));

        let reply = f.relay.handle(Command::GetSettings).await.unwrap();
        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(wire["projectId"], "PVT_other");
        assert_eq!(wire["statusFieldId"], FIELD);
        assert_eq!(wire["allowedRepos"], json!(["acme/gadgets"]));
        assert!(wire.get("project_id").is_none());
        assert_eq!(reply, Reply::Settings(stored));
    }

    #[tokio::test]
    async fn save_settings_rejects_unknown_keys_without_writing() {
        let f = fixture(MockGitHub::new(), Some(ready_settings()));

        let reply = f
            .relay
            .handle(command(json!({
                "type": "SAVE_SETTINGS",
                "settings": { "project_id": "PVT_other" }
            })))
            .await
            .unwrap();

        let wire = serde_json::to_value(&reply).unwrap();
        assert_eq!(wire["success"], false);
        assert!(wire["error"].as_str().unwrap().contains("project_id"));
        assert_eq!(f.store.load().unwrap(), ready_settings());
    }

    #[tokio::test]
    async fn reaction_syncs_once_repo_is_allowed_later() {
        let settings = Settings {
            allowed_repos: vec!["acme/other".into()],
            ..ready_settings()
        };
        let f = fixture(MockGitHub::new().with_issue(&issue(), "I_42"), Some(settings));

        f.relay.handle(reaction(true)).await;
        assert!(f.mock.calls().is_empty());

        f.relay
            .handle(command(json!({
                "type": "SAVE_SETTINGS",
                "settings": { "allowedRepos": ["acme/other", "acme/widgets"] }
            })))
            .await;
        f.relay.handle(reaction(true)).await;

        assert_eq!(f.mock.count("add_item"), 1);
    }

    #[tokio::test]
    async fn test_token_command() {
        let f = fixture(MockGitHub::new().with_user("ghp_good", "octocat"), None);

        let good = f
            .relay
            .handle(Command::TestToken {
                token: "ghp_good".into(),
            })
            .await
            .unwrap();
        assert_eq!(good, Reply::Token(TokenCheck::valid("octocat".into())));

        let bad = f
            .relay
            .handle(Command::TestToken {
                token: "ghp_bad".into(),
            })
            .await
            .unwrap();
        assert_eq!(bad, Reply::Token(TokenCheck::invalid("Invalid token")));

        let empty = f
            .relay
            .handle(Command::TestToken { token: " ".into() })
            .await
            .unwrap();
        assert!(matches!(empty, Reply::Token(ref check) if !check.is_valid()));
        assert_eq!(f.mock.count("viewer"), 2);
    }

    #[tokio::test]
    async fn serve_answers_each_command_and_relays_toasts() {
        let f = fixture(
            MockGitHub::new()
                .with_issue(&issue(), "I_42")
                .with_user("ghp_test", "octocat"),
            Some(ready_settings()),
        );
        let input = concat!(
            r#"{"id":1,"type":"ADD_TO_PROJECT","targetStatus":"Todo","#,
            r#""issueInfo":{"owner":"acme","repo":"widgets","issueNumber":42}}"#,
            "\n",
            r#"{"id":2,"type":"TEST_TOKEN","token":"ghp_test"}"#,
            "\n",
            "oops\n",
        );
        let mut output = Vec::new();

        serve(
            f.relay.clone(),
            std::io::Cursor::new(input.as_bytes().to_vec()),
            &mut output,
            f.toasts,
        )
        .await
        .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);

        let by_id = |id: u64| lines.iter().find(|l| l["id"] == id).unwrap();
        assert_eq!(by_id(1)["added"], true);
        assert_eq!(by_id(1)["status"], "Todo");
        assert_eq!(by_id(2)["valid"], true);
        assert_eq!(by_id(2)["username"], "octocat");

        let toast = lines.iter().find(|l| l["type"] == "SHOW_TOAST").unwrap();
        assert_eq!(toast["status"], "Todo");
        let rejected = lines
            .iter()
            .find(|l| l.get("id").is_none() && l["success"] == false)
            .unwrap();
        assert!(rejected["error"].is_string());
    }
}
