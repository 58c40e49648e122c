use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::IssueRef;
use super::status::Status;

/// One line of the activity log: an issue and the column it was synced to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedIssueRecord {
    #[serde(flatten)]
    pub issue: IssueRef,
    pub status: Status,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedIssueRecord {
    pub fn new(issue: &IssueRef, status: Status) -> Self {
        Self {
            issue: issue.clone(),
            status,
            processed_at: Utc::now(),
        }
    }
}
