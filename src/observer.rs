use std::collections::HashMap;

use crate::model::{IssueRef, ReactionState, Status};

/// Issues remembered at once; the least recently observed is forgotten first.
pub const MAX_TRACKED: usize = 1000;

/// Remembers the last reaction snapshot per issue so repeated reports of the
/// same state do not trigger another sync.
#[derive(Debug)]
pub struct ReactionTracker {
    last: HashMap<String, (ReactionState, u64)>,
    capacity: usize,
    tick: u64,
}

impl Default for ReactionTracker {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED)
    }
}

impl ReactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            last: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    /// Record `state` for `issue` and return the status to sync to, if any.
    pub fn observe(&mut self, issue: &IssueRef, state: ReactionState) -> Option<Status> {
        self.tick += 1;
        let key = issue.key();
        if !self.last.contains_key(&key) && self.last.len() >= self.capacity {
            self.evict_oldest();
        }
        let previous = self.last.insert(key, (state, self.tick));
        if previous.map(|(s, _)| s) == Some(state) {
            return None;
        }
        state.target_status()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.last.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .last
            .iter()
            .min_by_key(|(_, (_, seen))| *seen)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.last.remove(&key);
        }
    }
}
