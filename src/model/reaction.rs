use serde::{Deserialize, Serialize};

use super::status::Status;

pub const DEFAULT_TODO_EMOJI: &str = "\u{1F440}";
pub const DEFAULT_IN_PROGRESS_EMOJI: &str = "\u{1F680}";
pub const DEFAULT_DONE_EMOJI: &str = "\u{2705}";

/// Which of the three tracked reactions the current user has set on an issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionState {
    #[serde(default)]
    pub todo: bool,
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default)]
    pub done: bool,
}

impl ReactionState {
    pub fn target_status(&self) -> Option<Status> {
        if self.done {
            Some(Status::Done)
        } else if self.in_progress {
            Some(Status::InProgress)
        } else if self.todo {
            Some(Status::Todo)
        } else {
            None
        }
    }

    /// Classify raw reaction buttons using the configured emoji.
    pub fn from_reactions(reactions: &[ObservedReaction], emoji: &EmojiSet) -> Self {
        let mut state = ReactionState::default();
        for reaction in reactions.iter().filter(|r| r.mine) {
            let e = reaction.emoji.trim();
            if e == emoji.todo.trim() {
                state.todo = true;
            }
            if e == emoji.in_progress.trim() {
                state.in_progress = true;
            }
            if e == emoji.done.trim() {
                state.done = true;
            }
        }
        state
    }
}

/// A single reaction button as seen on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedReaction {
    pub emoji: String,
    /// The current user is among the reactors.
    #[serde(default)]
    pub mine: bool,
}

/// Reactions as sent by the page: either already classified, or the raw buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reactions {
    State(ReactionState),
    Observed(Vec<ObservedReaction>),
}

impl Reactions {
    pub fn resolve(&self, emoji: &EmojiSet) -> ReactionState {
        match self {
            Reactions::State(state) => *state,
            Reactions::Observed(list) => ReactionState::from_reactions(list, emoji),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiSet {
    pub todo: String,
    pub in_progress: String,
    pub done: String,
}

impl Default for EmojiSet {
    fn default() -> Self {
        Self {
            todo: DEFAULT_TODO_EMOJI.into(),
            in_progress: DEFAULT_IN_PROGRESS_EMOJI.into(),
            done: DEFAULT_DONE_EMOJI.into(),
        }
    }
}
