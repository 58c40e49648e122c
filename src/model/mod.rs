pub mod issue;
pub mod reaction;
pub mod record;
pub mod status;

pub use issue::IssueRef;
pub use reaction::{EmojiSet, ReactionState, Reactions};
pub use record::ProcessedIssueRecord;
pub use status::Status;
