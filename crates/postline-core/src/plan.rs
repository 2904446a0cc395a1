use crate::catalog::RotationCatalog;
use crate::config::{ConfigWarning, WarnLevel};
use crate::error::Result;
use crate::paths;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Telegram accepts polls with 2..=10 options.
pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 10;

// ---------------------------------------------------------------------------
// PlannedEntry
// ---------------------------------------------------------------------------

/// One operator-authored post pinned to a calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedEntry {
    pub date: NaiveDate,
    #[serde(rename = "type", alias = "archetype")]
    pub archetype: String,
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub include_poll: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_options: Option<Vec<String>>,
}

/// A poll that is ready to send alongside the post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec<'a> {
    pub question: &'a str,
    pub options: &'a [String],
}

impl PlannedEntry {
    /// The entry's poll, if it asks for one and the poll is well-formed.
    pub fn poll(&self) -> Option<PollSpec<'_>> {
        if !self.include_poll {
            return None;
        }
        let question = self.poll_question.as_deref().filter(|q| !q.trim().is_empty())?;
        let options = self.poll_options.as_deref()?;
        if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&options.len()) {
            return None;
        }
        Some(PollSpec { question, options })
    }
}

// ---------------------------------------------------------------------------
// ContentPlan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPlan {
    #[serde(default)]
    posts: Vec<PlannedEntry>,
}

impl ContentPlan {
    pub fn new(posts: Vec<PlannedEntry>) -> Self {
        Self { posts }
    }

    /// Load `.postline/content_plan.yaml`. A missing or empty file is an
    /// empty plan; a malformed one is an error.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::plan_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let plan = Self::from_yaml_str(&data)?;
        tracing::debug!(path = %path.display(), entries = plan.posts.len(), "loaded content plan");
        Ok(plan)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn entries(&self) -> &[PlannedEntry] {
        &self.posts
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Entry for `date`. When several entries share a date the first one in
    /// file order wins.
    pub fn entry_for_date(&self, date: NaiveDate) -> Option<&PlannedEntry> {
        self.posts.iter().find(|p| p.date == date)
    }

    /// Earliest entry strictly after `date`.
    pub fn next_entry_after(&self, date: NaiveDate) -> Option<&PlannedEntry> {
        self.posts
            .iter()
            .filter(|p| p.date > date)
            .min_by_key(|p| p.date)
    }

    pub fn validate(&self, catalog: &RotationCatalog) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for (i, post) in self.posts.iter().enumerate() {
            let label = format!("posts[{i}] ({})", post.date);

            if !seen.insert(post.date) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{label}: duplicate date, only the first entry is used"),
                });
            }

            if catalog.get(&post.archetype).is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "{label}: unknown type '{}', will publish as '{}'",
                        post.archetype,
                        catalog.default_archetype().key
                    ),
                });
            }

            if post.topic.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{label}: topic is empty"),
                });
            }

            if post.include_poll && post.poll().is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "{label}: include_poll needs a question and {MIN_POLL_OPTIONS}-{MAX_POLL_OPTIONS} options"
                    ),
                });
            }
        }

        warnings
    }
}
