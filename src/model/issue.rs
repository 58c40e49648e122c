use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const UNKNOWN_TITLE: &str = "Unknown Issue";

/// One issue on GitHub, as captured from the page that triggered a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

fn default_title() -> String {
    UNKNOWN_TITLE.to_string()
}

impl IssueRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, issue_number: u64) -> Self {
        let owner = owner.into();
        let repo = repo.into();
        let url = format!("https://github.com/{owner}/{repo}/issues/{issue_number}");
        Self {
            owner,
            repo,
            issue_number,
            title: default_title(),
            url,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        if !title.trim().is_empty() {
            self.title = title.trim().to_string();
        }
        self
    }

    /// Fills in the canonical URL when the sender left it out.
    pub fn normalized(mut self) -> Self {
        if self.url.trim().is_empty() {
            self.url = format!(
                "https://github.com/{}/{}/issues/{}",
                self.owner, self.repo, self.issue_number
            );
        }
        self
    }

    /// `owner/repo`, as written in the allow-list.
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Case-insensitive identity used to key per-issue state.
    pub fn key(&self) -> String {
        format!("{}#{}", self.repo_slug(), self.issue_number).to_lowercase()
    }
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.issue_number)
    }
}

/// Accepts `owner/repo#42` or `https://github.com/owner/repo/issues/42`.
impl FromStr for IssueRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(rest) = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
        {
            // host/owner/repo/issues/N[/...][?..][#..]
            let path = rest.split(['?', '#']).next().unwrap_or_default();
            let parts: Vec<&str> = path.split('/').collect();
            if parts.len() < 5 || parts[3] != "issues" {
                bail!("Not an issue URL: {s}");
            }
            let number = parts[4]
                .parse::<u64>()
                .with_context(|| format!("Invalid issue number in {s}"))?;
            let mut issue = IssueRef::new(parts[1], parts[2], number);
            issue.url = s.to_string();
            return Ok(issue);
        }

        let (slug, number) = s
            .split_once('#')
            .with_context(|| format!("Expected owner/repo#number, got '{s}'"))?;
        let (owner, repo) = slug
            .split_once('/')
            .with_context(|| format!("Expected owner/repo#number, got '{s}'"))?;
        if owner.is_empty() || repo.is_empty() {
            bail!("Expected owner/repo#number, got '{s}'");
        }
        let number = number
            .parse::<u64>()
            .with_context(|| format!("Invalid issue number in '{s}'"))?;
        Ok(IssueRef::new(owner, repo, number))
    }
}
