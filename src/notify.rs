use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::model::{IssueRef, Status};

/// Toast sent back to the page an issue was synced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "SHOW_TOAST", rename_all = "camelCase")]
pub struct Notification {
    pub status: Status,
    pub issue_info: IssueRef,
    pub message: String,
}

impl Notification {
    pub fn moved(issue: &IssueRef, status: Status) -> Self {
        Self {
            status,
            issue_info: issue.clone(),
            message: format!("Issue moved to {status} column!"),
        }
    }
}

/// Fire-and-forget channel towards whoever renders toasts.
#[derive(Debug, Clone)]
pub struct NotificationRelay {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl NotificationRelay {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Drops every notification.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, notification: Notification) {
        if let Some(tx) = &self.tx {
            if tx.send(notification).is_err() {
                debug!("notification receiver gone; toast dropped");
            }
        }
    }
}
