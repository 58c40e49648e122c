pub mod board;
pub mod client;
mod queries;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::model::IssueRef;

pub use board::{BoardClient, TokenCheck};
pub use client::GitHubClient;

/// One board row as returned by the items query, before any matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub id: String,
    /// Node id of the linked issue or pull request. Draft items have none.
    pub content_id: Option<String>,
    /// `(field id, option id)` for every single-select value set on the item.
    pub single_select_values: Vec<(String, String)>,
}

impl RawItem {
    pub fn option_for_field(&self, field_id: &str) -> Option<&str> {
        self.single_select_values
            .iter()
            .find(|(field, _)| field == field_id)
            .map(|(_, option)| option.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemsPage {
    pub items: Vec<RawItem>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// The raw GitHub calls the board logic is built from.
///
/// Every call takes the token explicitly so a settings change is picked up on
/// the next command without rebuilding the client.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /user`, returning the login.
    async fn viewer(&self, token: &str) -> Result<String, SyncError>;

    /// `GET /repos/{owner}/{repo}/issues/{number}`, returning `node_id`.
    async fn issue_node_id(&self, token: &str, issue: &IssueRef) -> Result<String, SyncError>;

    async fn project_items_page(
        &self,
        token: &str,
        project_id: &str,
        cursor: Option<&str>,
    ) -> Result<ItemsPage, SyncError>;

    /// `addProjectV2ItemById`. `None` when the response carried no item id.
    async fn add_item(
        &self,
        token: &str,
        project_id: &str,
        content_id: &str,
    ) -> Result<Option<String>, SyncError>;

    /// `updateProjectV2ItemFieldValue` with a single-select option.
    async fn set_single_select(
        &self,
        token: &str,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<Option<String>, SyncError>;
}
