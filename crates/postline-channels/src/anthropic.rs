//! Post generation through the Anthropic Messages API.

use crate::error::ChannelError;
use crate::traits::Generator;
use crate::types::{GeneratedPost, GenerationRequest, Source};
use postline_core::config::{env_secret, AnthropicConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::OnceLock;

const SERVICE: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

/// Characters of each source's content included in the prompt.
pub const SOURCE_EXCERPT_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You write posts for a Telegram channel about marketplace \
analytics for sellers. Write in a lively, practical voice, use Telegram HTML \
(<b>, <i>, <a href>) only, and keep the post under 900 characters.";

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Render the user prompt for one generation request.
pub fn build_prompt(request: &GenerationRequest) -> String {
    let archetype = &request.archetype;
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Post format: {} ({})", archetype.display_name, archetype.key);
    let _ = writeln!(prompt, "{}", archetype.description);
    let _ = writeln!(prompt, "Guidance: {}\n", archetype.guidance);

    if let Some(o) = &request.topic_override {
        prompt.push_str("The operator has fixed this post. Follow it exactly and ignore any other topics the sources suggest.\n");
        let _ = writeln!(prompt, "Topic: {}", o.topic);
        if !o.keywords.is_empty() {
            let _ = writeln!(prompt, "Keywords: {}", o.keywords.join(", "));
        }
        if let Some(structure) = &o.structure {
            let _ = writeln!(prompt, "Structure: {structure}");
        }
        if !o.facts.is_empty() {
            prompt.push_str("Facts to use:\n");
            for fact in &o.facts {
                let _ = writeln!(prompt, "- {fact}");
            }
        }
        if !o.tags.is_empty() {
            let _ = writeln!(prompt, "Required tags: {}", o.tags.join(" "));
        }
        prompt.push('\n');
    }

    if request.decorations.personal_experience {
        prompt.push_str(
            "Open with a short first-person remark from the channel's own experience.\n",
        );
    }
    match &request.decorations.call_to_action {
        Some(cta) => {
            let _ = writeln!(prompt, "End the post with this call to action, verbatim:\n{cta}");
        }
        None => prompt.push_str("Do not add any call to action or links to our bot.\n"),
    }

    if request.sources.is_empty() {
        prompt.push_str("\nNo sources were collected. Rely on the topic above.\n");
    } else {
        prompt.push_str("\nSources:\n");
        prompt.push_str(&summarize_sources(&request.sources));
    }

    prompt.push_str(
        "\nAnswer in exactly this layout:\nPOST:\n<post text>\n\nTAGS: #tag1 #tag2 #tag3\n",
    );
    prompt
}

fn summarize_sources(sources: &[Source]) -> String {
    let mut out = String::new();
    for (i, s) in sources.iter().enumerate() {
        let excerpt: String = s.content.chars().take(SOURCE_EXCERPT_CHARS).collect();
        let _ = writeln!(out, "{}. [{}] {}", i + 1, s.source_type, s.title);
        let _ = writeln!(out, "   URL: {}", s.url);
        let _ = writeln!(out, "   {excerpt}");
    }
    out
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

fn post_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)POST:\s*\n(.*?)\n\s*TAGS:").unwrap())
}

fn tags_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"TAGS:[ \t]*([^\n]*)").unwrap())
}

/// Split a model reply into post text and hashtags. A reply without the
/// `POST:` marker is used whole; a missing `TAGS:` line means no tags.
pub fn parse_reply(raw: &str) -> GeneratedPost {
    let text = post_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| raw.trim().to_string());

    let tags = tags_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split_whitespace()
                .filter_map(|t| t.strip_prefix('#'))
                .map(|t| t.trim_end_matches([',', '.']).to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    GeneratedPost { text, tags }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnthropicGenerator {
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicGenerator {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 2000,
            temperature: 0.7,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &AnthropicConfig) -> Result<Self, ChannelError> {
        let key = env_secret(&config.api_key_env)?;
        let mut generator = Self::new(&config.api_base, key, &config.model);
        generator.max_tokens = config.max_tokens;
        generator.temperature = config.temperature;
        Ok(generator)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ChannelError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(ChannelError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                service: SERVICE,
                message: format!("{status}: {message}"),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect();
        if text.trim().is_empty() {
            return Err(ChannelError::Parse {
                service: SERVICE,
                detail: "reply contained no text".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPost, ChannelError> {
        let prompt = build_prompt(request);
        tracing::debug!(
            archetype = %request.archetype.key,
            sources = request.sources.len(),
            prompt_chars = prompt.chars().count(),
            "requesting generation"
        );
        let reply = self.complete(&prompt).await?;
        let post = parse_reply(&reply);
        tracing::info!(
            archetype = %request.archetype.key,
            chars = post.text.chars().count(),
            tags = post.tags.len(),
            "post generated"
        );
        Ok(post)
    }
}
