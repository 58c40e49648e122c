use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{GitHubApi, ItemsPage, RawItem};
use crate::error::SyncError;
use crate::model::IssueRef;

/// In-memory board that records every call made against it.
#[derive(Clone, Default)]
pub struct MockGitHub {
    inner: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    logins: HashMap<String, String>,
    node_ids: HashMap<String, String>,
    items: Vec<RawItem>,
    page_size: usize,
    endless_pages: bool,
    next_item: u32,
    fail_add: Option<String>,
    fail_set: Option<String>,
    add_without_id: bool,
    set_without_id: bool,
    network_down: bool,
    calls: Vec<String>,
    failures: VecDeque<String>,
}

impl MockGitHub {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.inner.lock().unwrap().page_size = 100;
        mock
    }

    pub fn with_user(self, token: &str, login: &str) -> Self {
        self.state().logins.insert(token.into(), login.into());
        self
    }

    pub fn with_issue(self, issue: &IssueRef, node_id: &str) -> Self {
        self.state().node_ids.insert(issue.key(), node_id.into());
        self
    }

    pub fn with_item(
        self,
        item_id: &str,
        content_id: &str,
        field: &str,
        option: Option<&str>,
    ) -> Self {
        self.state().items.push(RawItem {
            id: item_id.into(),
            content_id: Some(content_id.into()),
            single_select_values: option
                .map(|o| vec![(field.to_string(), o.to_string())])
                .unwrap_or_default(),
        });
        self
    }

    pub fn with_filler_items(self, count: usize) -> Self {
        {
            let mut state = self.state();
            for i in 0..count {
                state.items.push(RawItem {
                    id: format!("PVTI_filler_{i}"),
                    content_id: Some(format!("I_filler_{i}")),
                    single_select_values: vec![],
                });
            }
        }
        self
    }

    pub fn with_page_size(self, size: usize) -> Self {
        self.state().page_size = size;
        self
    }

    /// Every page claims there is another one after it.
    pub fn with_endless_pages(self) -> Self {
        self.state().endless_pages = true;
        self
    }

    pub fn failing_add(self, message: &str) -> Self {
        self.state().fail_add = Some(message.into());
        self
    }

    pub fn failing_set(self, message: &str) -> Self {
        self.state().fail_set = Some(message.into());
        self
    }

    pub fn add_without_id(self) -> Self {
        self.state().add_without_id = true;
        self
    }

    pub fn set_without_id(self) -> Self {
        self.state().set_without_id = true;
        self
    }

    pub fn network_down(self) -> Self {
        self.state().network_down = true;
        self
    }

    /// Stop failing mutations configured with `failing_add`/`failing_set`.
    pub fn heal(&self) {
        let mut state = self.state();
        state.fail_add = None;
        state.fail_set = None;
    }

    /// Queue a one-shot remote error for the next call of any kind.
    pub fn fail_next(&self, message: &str) {
        self.state().failures.push_back(message.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn status_of(&self, item_id: &str, field: &str) -> Option<String> {
        self.state()
            .items
            .iter()
            .find(|i| i.id == item_id)
            .and_then(|i| i.option_for_field(field).map(String::from))
    }

    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.lock().unwrap()
    }

    fn begin(&self, call: String) -> Result<std::sync::MutexGuard<'_, State>, SyncError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.network_down {
            return Err(SyncError::Remote("connection refused".into()));
        }
        if let Some(message) = state.failures.pop_front() {
            return Err(SyncError::Remote(message));
        }
        Ok(state)
    }
}

#[async_trait]
impl GitHubApi for MockGitHub {
    async fn viewer(&self, token: &str) -> Result<String, SyncError> {
        let state = self.begin("viewer".into())?;
        state.logins.get(token).cloned().ok_or(SyncError::Http {
            status: 401,
            message: "Bad credentials".into(),
        })
    }

    async fn issue_node_id(&self, _token: &str, issue: &IssueRef) -> Result<String, SyncError> {
        let state = self.begin(format!("issue_node_id {issue}"))?;
        state.node_ids.get(&issue.key()).cloned().ok_or(SyncError::Http {
            status: 404,
            message: "Not Found".into(),
        })
    }

    async fn project_items_page(
        &self,
        _token: &str,
        _project_id: &str,
        cursor: Option<&str>,
    ) -> Result<ItemsPage, SyncError> {
        let state = self.begin(format!("items_page {}", cursor.unwrap_or("-")))?;
        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + state.page_size).min(state.items.len());
        let items = state.items.get(start..end).unwrap_or_default().to_vec();
        Ok(ItemsPage {
            items,
            has_next_page: state.endless_pages || end < state.items.len(),
            end_cursor: Some(end.max(start + state.page_size).to_string()),
        })
    }

    async fn add_item(
        &self,
        _token: &str,
        _project_id: &str,
        content_id: &str,
    ) -> Result<Option<String>, SyncError> {
        let mut state = self.begin(format!("add_item {content_id}"))?;
        if let Some(message) = state.fail_add.clone() {
            return Err(SyncError::Remote(message));
        }
        if state.add_without_id {
            return Ok(None);
        }
        state.next_item += 1;
        let id = format!("PVTI_new_{}", state.next_item);
        state.items.push(RawItem {
            id: id.clone(),
            content_id: Some(content_id.into()),
            single_select_values: vec![],
        });
        Ok(Some(id))
    }

    async fn set_single_select(
        &self,
        _token: &str,
        _project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<Option<String>, SyncError> {
        let mut state = self.begin(format!("set_status {item_id} {option_id}"))?;
        if let Some(message) = state.fail_set.clone() {
            return Err(SyncError::Remote(message));
        }
        if state.set_without_id {
            return Ok(None);
        }
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| SyncError::Remote(format!("no item {item_id}")))?;
        item.single_select_values.retain(|(f, _)| f != field_id);
        item.single_select_values
            .push((field_id.into(), option_id.into()));
        Ok(Some(item_id.to_string()))
    }
}
