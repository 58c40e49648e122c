mod locks;


use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::activity::ActivityLog;
use crate::config::Settings;
use crate::error::SyncError;
use crate::github::BoardClient;
use crate::model::{IssueRef, Status};
use crate::notify::{Notification, NotificationRelay};

pub use locks::KeyedLocks;

/// What a successful reconciliation did to the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Issue was not on the board; it was linked with the target status.
    Created { item_id: String },
    /// Issue was on the board in another column and has been moved.
    Updated { item_id: String },
    /// Already in the target column; nothing was sent.
    Unchanged { item_id: String },
}

impl Outcome {
    pub fn item_id(&self) -> &str {
        match self {
            Outcome::Created { item_id }
            | Outcome::Updated { item_id }
            | Outcome::Unchanged { item_id } => item_id,
        }
    }

    pub fn applied(&self) -> bool {
        !matches!(self, Outcome::Unchanged { .. })
    }

    pub fn created(&self) -> bool {
        matches!(self, Outcome::Created { .. })
    }
}

/// Gate applied before any sync is attempted for an issue's repository.
pub fn is_repo_allowed(issue: &IssueRef, settings: &Settings) -> bool {
    settings.allows_repo(issue)
}

/// Moves an issue's board item to the column matching a status,
/// touching the board as little as possible.
pub struct Reconciler {
    board: BoardClient,
    activity: Arc<ActivityLog>,
    notifier: NotificationRelay,
    locks: KeyedLocks,
}

impl Reconciler {
    pub fn new(
        board: BoardClient,
        activity: Arc<ActivityLog>,
        notifier: NotificationRelay,
    ) -> Self {
        Self {
            board,
            activity,
            notifier,
            locks: KeyedLocks::new(),
        }
    }

    pub fn board(&self) -> &BoardClient {
        &self.board
    }

    #[instrument(skip_all, fields(issue = %issue, status = %status))]
    pub async fn reconcile(
        &self,
        issue: &IssueRef,
        status: Status,
        settings: &Settings,
    ) -> Result<Outcome, SyncError> {
        check_configured(settings)?;
        let option_id = settings
            .option_id(status)
            .ok_or(SyncError::UnmappedStatus(status))?;

        let _guard = self.locks.lock(&issue.key()).await;

        let outcome = match self.board.find_item(issue, settings).await? {
            Some(item) if item.current_status_option_id.as_deref() == Some(option_id) => {
                Outcome::Unchanged {
                    item_id: item.item_id,
                }
            }
            Some(item) => {
                self.board
                    .set_status(&item.item_id, option_id, settings)
                    .await?;
                Outcome::Updated {
                    item_id: item.item_id,
                }
            }
            None => {
                let item = self.board.create_item(issue, option_id, settings).await?;
                Outcome::Created {
                    item_id: item.item_id,
                }
            }
        };

        info!(
            item_id = outcome.item_id(),
            applied = outcome.applied(),
            created = outcome.created(),
            "reconciled"
        );

        if let Err(err) = self.activity.record(issue, status).await {
            warn!(?err, "failed to write activity log");
        }
        if outcome.applied() {
            self.notifier.send(Notification::moved(issue, status));
        }

        Ok(outcome)
    }
}

fn check_configured(settings: &Settings) -> Result<(), SyncError> {
    if settings.token().is_none() {
        return Err(SyncError::Configuration("missing GitHub token"));
    }
    if settings.project_id().is_none() {
        return Err(SyncError::Configuration("missing project id"));
    }
    if settings.status_field_id().is_none() {
        return Err(SyncError::Configuration("missing status field id"));
    }
    Ok(())
}
