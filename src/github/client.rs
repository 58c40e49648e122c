use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use super::queries::{self, AddItemData, GqlResponse, ItemsData, SetFieldData};
use super::{GitHubApi, ItemsPage};
use crate::config::DEFAULT_API_BASE;
use crate::error::SyncError;
use crate::model::IssueRef;

const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const AGENT: &str = concat!("reaction-sync/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed [`GitHubApi`] against api.github.com or an Enterprise host.
#[derive(Clone)]
pub struct GitHubClient {
    base: String,
    client: reqwest::Client,
}

impl fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

#[derive(Deserialize)]
struct User {
    login: String,
}

#[derive(Deserialize)]
struct Issue {
    node_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl GitHubClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// REST call with the classic `token` scheme.
    pub fn rest_request(&self, token: &str, path: &str) -> Result<reqwest::Request, SyncError> {
        Ok(self
            .client
            .get(format!("{}{path}", self.base))
            .header(AUTHORIZATION, format!("token {token}"))
            .header(ACCEPT, ACCEPT_V3)
            .header(USER_AGENT, AGENT)
            .build()?)
    }

    pub fn graphql_request(
        &self,
        token: &str,
        body: &Value,
    ) -> Result<reqwest::Request, SyncError> {
        Ok(self
            .client
            .post(format!("{}/graphql", self.base))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, ACCEPT_V3)
            .header(USER_AGENT, AGENT)
            .json(body)
            .build()?)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::Request,
    ) -> Result<T, SyncError> {
        debug!(method = %request.method(), url = %request.url(), "github request");
        let resp = self.client.execute(request).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or(body);
            debug!(status = status.as_u16(), %message, "github rejected request");
            return Err(SyncError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        token: &str,
        body: Value,
    ) -> Result<Option<T>, SyncError> {
        let request = self.graphql_request(token, &body)?;
        let resp: GqlResponse<T> = self.execute(request).await?;
        resp.into_data()
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn viewer(&self, token: &str) -> Result<String, SyncError> {
        let user: User = self.execute(self.rest_request(token, "/user")?).await?;
        Ok(user.login)
    }

    async fn issue_node_id(&self, token: &str, issue: &IssueRef) -> Result<String, SyncError> {
        let path = format!(
            "/repos/{}/{}/issues/{}",
            urlencoding::encode(&issue.owner),
            urlencoding::encode(&issue.repo),
            issue.issue_number
        );
        let found: Issue = self.execute(self.rest_request(token, &path)?).await?;
        Ok(found.node_id)
    }

    async fn project_items_page(
        &self,
        token: &str,
        project_id: &str,
        cursor: Option<&str>,
    ) -> Result<ItemsPage, SyncError> {
        let data: Option<ItemsData> = self
            .graphql(token, queries::items_body(project_id, cursor))
            .await?;
        data.ok_or_else(|| SyncError::Remote("No data in GitHub response".into()))?
            .into_page()
    }

    async fn add_item(
        &self,
        token: &str,
        project_id: &str,
        content_id: &str,
    ) -> Result<Option<String>, SyncError> {
        let data: Option<AddItemData> = self
            .graphql(token, queries::add_item_body(project_id, content_id))
            .await?;
        Ok(data.and_then(AddItemData::item_id))
    }

    async fn set_single_select(
        &self,
        token: &str,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<Option<String>, SyncError> {
        let data: Option<SetFieldData> = self
            .graphql(
                token,
                queries::set_field_body(project_id, item_id, field_id, option_id),
            )
            .await?;
        Ok(data.and_then(SetFieldData::item_id))
    }
}
