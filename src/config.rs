use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::reaction::{DEFAULT_DONE_EMOJI, DEFAULT_IN_PROGRESS_EMOJI, DEFAULT_TODO_EMOJI};
use crate::model::{EmojiSet, IssueRef, Status};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Board credentials, identifiers and emoji configuration.
///
/// Read once per command and treated as an immutable snapshot for that call chain.
/// Keys are camelCase on disk and on the wire; snake_case keys are still read.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub token: String,
    #[serde(alias = "project_owner")]
    pub project_owner: String,
    #[serde(alias = "project_number")]
    pub project_number: Option<u64>,
    /// GraphQL node id of the ProjectV2 board.
    #[serde(alias = "project_id")]
    pub project_id: String,
    #[serde(alias = "status_field_id")]
    pub status_field_id: String,
    #[serde(alias = "todo_option_id")]
    pub todo_option_id: String,
    #[serde(alias = "in_progress_option_id")]
    pub in_progress_option_id: String,
    #[serde(alias = "done_option_id")]
    pub done_option_id: String,
    #[serde(alias = "todo_emoji")]
    pub todo_emoji: String,
    #[serde(alias = "progress_emoji")]
    pub progress_emoji: String,
    #[serde(alias = "done_emoji")]
    pub done_emoji: String,
    #[serde(alias = "allowed_repos")]
    pub allowed_repos: Vec<String>,
    #[serde(alias = "apply_to_all")]
    pub apply_to_all: bool,
    #[serde(alias = "api_base", skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

/// A partial settings update, as sent by `SAVE_SETTINGS`. Absent keys keep
/// their stored value; unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    pub token: Option<String>,
    pub project_owner: Option<String>,
    pub project_number: Option<u64>,
    pub project_id: Option<String>,
    pub status_field_id: Option<String>,
    pub todo_option_id: Option<String>,
    pub in_progress_option_id: Option<String>,
    pub done_option_id: Option<String>,
    pub todo_emoji: Option<String>,
    pub progress_emoji: Option<String>,
    pub done_emoji: Option<String>,
    pub allowed_repos: Option<Vec<String>>,
    pub apply_to_all: Option<bool>,
    pub api_base: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: String::new(),
            project_owner: String::new(),
            project_number: None,
            project_id: String::new(),
            status_field_id: String::new(),
            todo_option_id: String::new(),
            in_progress_option_id: String::new(),
            done_option_id: String::new(),
            todo_emoji: DEFAULT_TODO_EMOJI.into(),
            progress_emoji: DEFAULT_IN_PROGRESS_EMOJI.into(),
            done_emoji: DEFAULT_DONE_EMOJI.into(),
            allowed_repos: Vec::new(),
            apply_to_all: false,
            api_base: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("token", &if self.token.is_empty() { "" } else { "[REDACTED]" })
            .field("project_owner", &self.project_owner)
            .field("project_number", &self.project_number)
            .field("project_id", &self.project_id)
            .field("status_field_id", &self.status_field_id)
            .field("allowed_repos", &self.allowed_repos)
            .field("apply_to_all", &self.apply_to_all)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Ready,
    ConfigurationRequired,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Ready => f.write_str("Connected and ready"),
            ConnectionState::ConfigurationRequired => f.write_str("Configuration required"),
        }
    }
}

fn present(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

impl Settings {
    pub fn token(&self) -> Option<&str> {
        present(&self.token)
    }

    pub fn project_id(&self) -> Option<&str> {
        present(&self.project_id)
    }

    pub fn status_field_id(&self) -> Option<&str> {
        present(&self.status_field_id)
    }

    /// Single-select option id configured for a status column.
    pub fn option_id(&self, status: Status) -> Option<&str> {
        match status {
            Status::Todo => present(&self.todo_option_id),
            Status::InProgress => present(&self.in_progress_option_id),
            Status::Done => present(&self.done_option_id),
        }
    }

    pub fn emoji_set(&self) -> EmojiSet {
        let pick = |value: &str, fallback: &str| present(value).unwrap_or(fallback).to_string();
        EmojiSet {
            todo: pick(&self.todo_emoji, DEFAULT_TODO_EMOJI),
            in_progress: pick(&self.progress_emoji, DEFAULT_IN_PROGRESS_EMOJI),
            done: pick(&self.done_emoji, DEFAULT_DONE_EMOJI),
        }
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .and_then(present)
            .map(|b| b.trim_end_matches('/'))
            .unwrap_or(DEFAULT_API_BASE)
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.token().is_some()
            && present(&self.project_owner).is_some()
            && self.project_number.is_some()
        {
            ConnectionState::Ready
        } else {
            ConnectionState::ConfigurationRequired
        }
    }

    /// Whether reactions on this issue's repository should be synced at all.
    pub fn allows_repo(&self, issue: &IssueRef) -> bool {
        if self.apply_to_all {
            return true;
        }
        let slug = issue.repo_slug().to_lowercase();
        self.allowed_repos
            .iter()
            .any(|entry| entry.trim().to_lowercase() == slug)
    }

    /// Overlay every key present in `patch`.
    pub fn merge(&mut self, patch: SettingsPatch) {
        fn take<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        take(&mut self.token, patch.token);
        take(&mut self.project_owner, patch.project_owner);
        if patch.project_number.is_some() {
            self.project_number = patch.project_number;
        }
        take(&mut self.project_id, patch.project_id);
        take(&mut self.status_field_id, patch.status_field_id);
        take(&mut self.todo_option_id, patch.todo_option_id);
        take(&mut self.in_progress_option_id, patch.in_progress_option_id);
        take(&mut self.done_option_id, patch.done_option_id);
        take(&mut self.todo_emoji, patch.todo_emoji);
        take(&mut self.progress_emoji, patch.progress_emoji);
        take(&mut self.done_emoji, patch.done_emoji);
        take(&mut self.allowed_repos, patch.allowed_repos);
        take(&mut self.apply_to_all, patch.apply_to_all);
        if patch.api_base.is_some() {
            self.api_base = patch.api_base;
        }
    }

    /// Update one field from its string form, as typed on the command line.
    /// Keys may be written `project_id`, `project-id` or `projectId`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match snake_case(key).as_str() {
            "token" => self.token = value.into(),
            "project_owner" => self.project_owner = value.into(),
            "project_number" => {
                self.project_number = if value.is_empty() {
                    None
                } else {
                    let number = value.parse().with_context(|| {
                        format!("project_number must be a number, got '{value}'")
                    })?;
                    Some(number)
                }
            }
            "project_id" => self.project_id = value.into(),
            "status_field_id" => self.status_field_id = value.into(),
            "todo_option_id" => self.todo_option_id = value.into(),
            "in_progress_option_id" => self.in_progress_option_id = value.into(),
            "done_option_id" => self.done_option_id = value.into(),
            "todo_emoji" => self.todo_emoji = value.into(),
            "progress_emoji" => self.progress_emoji = value.into(),
            "done_emoji" => self.done_emoji = value.into(),
            "allowed_repos" => {
                self.allowed_repos = value
                    .split([',', '\n'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            }
            "apply_to_all" => {
                self.apply_to_all = match value.to_ascii_lowercase().as_str() {
                    "true" | "yes" | "1" => true,
                    "false" | "no" | "0" => false,
                    other => bail!("apply_to_all must be true or false, got '{other}'"),
                }
            }
            "api_base" => {
                self.api_base = (!value.is_empty()).then(|| value.to_string());
            }
            other => bail!("Unknown setting '{other}'"),
        }
        Ok(())
    }
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.trim().chars() {
        match c {
            '-' => out.push('_'),
            c if c.is_ascii_uppercase() => {
                out.push('_');
                out.push(c.to_ascii_lowercase());
            }
            c => out.push(c),
        }
    }
    out
}

/// Root of everything this tool persists.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REACTION_SYNC_HOME") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reaction-sync")
}

/// TOML-backed key-value store for [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("settings.toml"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))?;
        Ok(())
    }
}
