use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::model::{IssueRef, ProcessedIssueRecord, Status};

pub const MAX_RECORDS: usize = 100;

/// Newest-first log of synced issues, kept in a single JSON file.
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Put `record` at the front and drop whatever falls past the cap.
pub fn push_capped(records: &mut Vec<ProcessedIssueRecord>, record: ProcessedIssueRecord) {
    records.insert(0, record);
    records.truncate(MAX_RECORDS);
}

impl ActivityLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("activity.json"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, issue: &IssueRef, status: Status) -> Result<ProcessedIssueRecord> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await;
        let record = ProcessedIssueRecord::new(issue, status);
        push_capped(&mut records, record.clone());
        self.write_all(&records).await?;
        Ok(record)
    }

    pub async fn list(&self, limit: Option<usize>) -> Vec<ProcessedIssueRecord> {
        let mut records = self.read_all().await;
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_all(&[]).await
    }

    async fn read_all(&self) -> Vec<ProcessedIssueRecord> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn write_all(&self, records: &[ProcessedIssueRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}
