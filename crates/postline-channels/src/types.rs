use chrono::{DateTime, Utc};
use postline_core::cadence::Decorations;
use postline_core::catalog::Archetype;
use postline_core::plan::PlannedEntry;
use serde::{Deserialize, Serialize};

// ─── Sources ──────────────────────────────────────────────────────────────

/// A piece of collected material the generator may draw on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub content: String,
    pub url: String,
    /// Where the source came from (`exa`, `habr`, `manual`, ...).
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

// ─── Generation ───────────────────────────────────────────────────────────

/// Operator-mandated topic for a content-plan day. Generation must treat
/// every field as binding and ignore topics suggested by the sources.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopicOverride {
    pub topic: String,
    pub keywords: Vec<String>,
    pub structure: Option<String>,
    pub facts: Vec<String>,
    pub tags: Vec<String>,
}

impl From<&PlannedEntry> for TopicOverride {
    fn from(entry: &PlannedEntry) -> Self {
        Self {
            topic: entry.topic.clone(),
            keywords: entry.keywords.clone(),
            structure: entry.structure.clone(),
            facts: entry.facts.clone().unwrap_or_default(),
            tags: entry.tags.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub sources: Vec<Source>,
    pub archetype: Archetype,
    pub decorations: Decorations,
    pub topic_override: Option<TopicOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPost {
    pub text: String,
    /// Hashtags without the leading `#`.
    pub tags: Vec<String>,
}

impl GeneratedPost {
    /// Final message body: the text followed by its hashtags.
    pub fn render(&self) -> String {
        let text = self.text.trim();
        if self.tags.is_empty() {
            return text.to_string();
        }
        let tags: Vec<String> = self.tags.iter().map(|t| format!("#{t}")).collect();
        format!("{text}\n\n{}", tags.join(" "))
    }
}

// ─── Publishing ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Published {
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPublished {
    pub post_message_id: i64,
    pub poll_message_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn render_appends_hashtags() {
        let post = GeneratedPost {
            text: "  Body text\n".to_string(),
            tags: vec!["ozon".to_string(), "analytics".to_string()],
        };
        assert_eq!(post.render(), "Body text\n\n#ozon #analytics");

        let bare = GeneratedPost {
            text: "Only text".to_string(),
            tags: vec![],
        };
        assert_eq!(bare.render(), "Only text");
    }

    #[test]
    fn override_copies_plan_fields_verbatim() {
        let entry = PlannedEntry {
            date: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
            archetype: "checklist".to_string(),
            topic: "Spring sale preparation".to_string(),
            keywords: vec!["spring".to_string()],
            structure: Some("7 items".to_string()),
            facts: None,
            tags: Some(vec!["sale".to_string()]),
            include_poll: false,
            poll_question: None,
            poll_options: None,
        };
        let o = TopicOverride::from(&entry);
        assert_eq!(o.topic, "Spring sale preparation");
        assert_eq!(o.keywords, ["spring"]);
        assert_eq!(o.structure.as_deref(), Some("7 items"));
        assert!(o.facts.is_empty());
        assert_eq!(o.tags, ["sale"]);
    }
}
