//! Exa search source collector.

use crate::error::ChannelError;
use crate::traits::SourceCollector;
use crate::types::Source;
use chrono::{DateTime, Duration, Utc};
use postline_core::config::{env_secret, ExaConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const SERVICE: &str = "exa";

/// Upper bound on the text Exa returns per result.
pub const MAX_SOURCE_CHARS: usize = 2000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: u32,
    start_published_date: String,
    contents: Contents,
}

#[derive(Debug, Serialize)]
struct Contents {
    text: TextOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextOptions {
    max_characters: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    url: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExaCollector {
    api_base: String,
    api_key: String,
    queries: Vec<String>,
    num_results: u32,
    days_back: u32,
    client: reqwest::Client,
}

impl ExaCollector {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, queries: Vec<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            queries,
            num_results: 3,
            days_back: 14,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ExaConfig) -> Result<Self, ChannelError> {
        let key = env_secret(&config.api_key_env)?;
        Ok(Self::new(&config.api_base, key, config.queries.clone())
            .with_limits(config.num_results, config.days_back))
    }

    pub fn with_limits(mut self, num_results: u32, days_back: u32) -> Self {
        self.num_results = num_results;
        self.days_back = days_back;
        self
    }

    /// Queries for one run: the plan's topic and keywords first, then the
    /// configured list.
    pub fn queries_for(&self, keywords: Option<&[String]>, topic: Option<&str>) -> Vec<String> {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(t) = topic.map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(t);
        }
        if let Some(kw) = keywords {
            parts.extend(kw.iter().map(String::as_str).filter(|k| !k.trim().is_empty()));
        }

        let mut queries = Vec::with_capacity(self.queries.len() + 1);
        if !parts.is_empty() {
            queries.push(parts.join(" "));
        }
        queries.extend(self.queries.iter().cloned());
        queries
    }

    async fn search(&self, query: &str, since: DateTime<Utc>) -> Result<Vec<Source>, ChannelError> {
        let body = SearchRequest {
            query,
            num_results: self.num_results,
            start_published_date: since.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            contents: Contents {
                text: TextOptions {
                    max_characters: MAX_SOURCE_CHARS,
                },
            },
        };
        let response = self
            .client
            .post(format!("{}/search", self.api_base))
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                service: SERVICE,
                message: format!("{status}: {message}"),
            });
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results.into_iter().map(into_source).collect())
    }
}

fn into_source(result: SearchResult) -> Source {
    let content: String = result
        .text
        .unwrap_or_default()
        .chars()
        .take(MAX_SOURCE_CHARS)
        .collect();
    Source {
        title: result.title.unwrap_or_else(|| result.url.clone()),
        content,
        url: result.url,
        source_type: SERVICE.to_string(),
        published_at: result
            .published_date
            .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.with_timezone(&Utc)),
    }
}

#[async_trait::async_trait]
impl SourceCollector for ExaCollector {
    async fn collect(
        &self,
        keywords: Option<&[String]>,
        topic: Option<&str>,
    ) -> Result<Vec<Source>, ChannelError> {
        let since = Utc::now() - Duration::days(i64::from(self.days_back));
        let queries = self.queries_for(keywords, topic);

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for query in &queries {
            match self.search(query, since).await {
                Ok(found) => {
                    succeeded += 1;
                    tracing::debug!(query = %query, found = found.len(), "exa search");
                    sources.extend(found.into_iter().filter(|s| seen.insert(s.url.clone())));
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "exa search failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => {
                tracing::info!(queries = queries.len(), sources = sources.len(), "sources collected");
                Ok(sources)
            }
        }
    }
}
