use thiserror::Error;

use crate::model::Status;

/// Everything that can end a reconciliation attempt. None of these are retried.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("GitHub settings not configured: {0}")]
    Configuration(&'static str),
    #[error("No optionId found for status: {0}")]
    UnmappedStatus(Status),
    #[error("request to GitHub failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("GitHub returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Remote(String),
    #[error("Failed to add issue to project")]
    CreateFailed,
}

impl SyncError {
    /// Rejected by GitHub at the HTTP level (bad token, missing repo, ...).
    pub fn is_http(&self) -> bool {
        matches!(self, SyncError::Http { .. })
    }
}
