use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::GitHubApi;
use crate::config::Settings;
use crate::error::SyncError;
use crate::model::IssueRef;

/// Boards bigger than this many pages may miss an existing item.
pub const MAX_PAGES: usize = 10;

/// A board row linked to exactly one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectItem {
    pub item_id: String,
    pub issue_node_id: String,
    pub current_status_option_id: Option<String>,
}

/// Result of probing a token against `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TokenCheck {
    Valid { valid: bool, username: String },
    Invalid { valid: bool, error: String },
}

impl TokenCheck {
    pub fn valid(username: String) -> Self {
        TokenCheck::Valid {
            valid: true,
            username,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        TokenCheck::Invalid {
            valid: false,
            error: error.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TokenCheck::Valid { .. })
    }
}

/// Board operations for one ProjectV2, built on the raw [`GitHubApi`] calls.
#[derive(Clone)]
pub struct BoardClient {
    api: Arc<dyn GitHubApi>,
}

struct Target<'a> {
    token: &'a str,
    project_id: &'a str,
    status_field_id: &'a str,
}

fn target(settings: &Settings) -> Result<Target<'_>, SyncError> {
    Ok(Target {
        token: settings
            .token()
            .ok_or(SyncError::Configuration("missing GitHub token"))?,
        project_id: settings
            .project_id()
            .ok_or(SyncError::Configuration("missing project id"))?,
        status_field_id: settings
            .status_field_id()
            .ok_or(SyncError::Configuration("missing status field id"))?,
    })
}

impl BoardClient {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }

    /// Look for the board item linked to `issue`, matching on the issue's node id.
    pub async fn find_item(
        &self,
        issue: &IssueRef,
        settings: &Settings,
    ) -> Result<Option<ProjectItem>, SyncError> {
        let t = target(settings)?;
        let node_id = self.api.issue_node_id(t.token, issue).await?;

        let mut cursor: Option<String> = None;
        for page_no in 0..MAX_PAGES {
            let page = self
                .api
                .project_items_page(t.token, t.project_id, cursor.as_deref())
                .await?;

            if let Some(item) = page
                .items
                .iter()
                .find(|item| item.content_id.as_deref() == Some(node_id.as_str()))
            {
                debug!(%issue, item_id = %item.id, page_no, "found existing board item");
                return Ok(Some(ProjectItem {
                    item_id: item.id.clone(),
                    issue_node_id: node_id,
                    current_status_option_id: item
                        .option_for_field(t.status_field_id)
                        .map(String::from),
                }));
            }

            if !page.has_next_page {
                return Ok(None);
            }
            cursor = page.end_cursor;
        }

        info!(%issue, max_pages = MAX_PAGES, "stopped searching board at page cap");
        Ok(None)
    }

    /// Link `issue` to the board and set its status to `option_id`.
    pub async fn create_item(
        &self,
        issue: &IssueRef,
        option_id: &str,
        settings: &Settings,
    ) -> Result<ProjectItem, SyncError> {
        let t = target(settings)?;
        let node_id = self.api.issue_node_id(t.token, issue).await?;
        let item_id = self
            .api
            .add_item(t.token, t.project_id, &node_id)
            .await?
            .ok_or(SyncError::CreateFailed)?;
        let updated = self
            .api
            .set_single_select(t.token, t.project_id, &item_id, t.status_field_id, option_id)
            .await?
            .ok_or(SyncError::CreateFailed)?;

        Ok(ProjectItem {
            item_id: updated,
            issue_node_id: node_id,
            current_status_option_id: Some(option_id.to_string()),
        })
    }

    pub async fn set_status(
        &self,
        item_id: &str,
        option_id: &str,
        settings: &Settings,
    ) -> Result<(), SyncError> {
        let t = target(settings)?;
        self.api
            .set_single_select(t.token, t.project_id, item_id, t.status_field_id, option_id)
            .await?
            .ok_or_else(|| SyncError::Remote("Status update returned no project item".into()))?;
        Ok(())
    }

    pub async fn test_token(&self, token: &str) -> TokenCheck {
        match self.api.viewer(token).await {
            Ok(login) => TokenCheck::valid(login),
            Err(err) if err.is_http() => TokenCheck::invalid("Invalid token"),
            Err(err) => TokenCheck::invalid(err.to_string()),
        }
    }
}
