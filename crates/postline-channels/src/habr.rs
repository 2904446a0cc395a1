//! Habr article search, scraped from the public search page.

use crate::error::ChannelError;
use crate::traits::SourceCollector;
use crate::types::Source;
use chrono::{DateTime, Duration, Utc};
use postline_core::config::HabrConfig;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;

const SERVICE: &str = "habr";

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Upper bound on the text kept per article.
pub const MAX_ARTICLE_CHARS: usize = 1000;

struct Selectors {
    article: Selector,
    title: Selector,
    lead: Selector,
    time: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        article: Selector::parse("article.tm-articles-list__item").unwrap(),
        title: Selector::parse("h2.tm-title a").unwrap(),
        lead: Selector::parse(".tm-article-snippet__lead").unwrap(),
        time: Selector::parse("time[datetime]").unwrap(),
    })
}

#[derive(Debug, Clone)]
pub struct HabrCollector {
    base_url: String,
    tags: Vec<String>,
    max_per_tag: usize,
    days_back: u32,
    client: reqwest::Client,
}

impl HabrCollector {
    pub fn new(base_url: impl Into<String>, tags: Vec<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tags,
            max_per_tag: 3,
            days_back: 7,
            client,
        }
    }

    pub fn from_config(config: &HabrConfig) -> Self {
        Self::new(&config.base_url, config.tags.clone())
            .with_limits(config.max_per_tag, config.days_back)
    }

    pub fn with_limits(mut self, max_per_tag: usize, days_back: u32) -> Self {
        self.max_per_tag = max_per_tag;
        self.days_back = days_back;
        self
    }

    /// Tags for one run: the plan's keywords first, then the configured
    /// tags, without repeats.
    pub fn tags_for(&self, keywords: Option<&[String]>) -> Vec<String> {
        let mut seen = HashSet::new();
        keywords
            .unwrap_or_default()
            .iter()
            .chain(self.tags.iter())
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_lowercase()))
            .map(str::to_string)
            .collect()
    }

    async fn search(&self, tag: &str) -> Result<Vec<Source>, ChannelError> {
        let response = self
            .client
            .get(format!("{}/ru/search/", self.base_url))
            .query(&[("q", tag), ("target_type", "posts"), ("order", "date")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Api {
                service: SERVICE,
                message: format!("search for '{tag}' returned {status}"),
            });
        }

        let html = response.text().await?;
        Ok(parse_search_page(&html, &self.base_url, self.max_per_tag))
    }
}

/// Articles listed on one search results page, at most `limit` of them.
/// Blocks without a title link are skipped.
pub fn parse_search_page(html: &str, base_url: &str, limit: usize) -> Vec<Source> {
    let document = Html::parse_document(html);
    let sel = selectors();
    document
        .select(&sel.article)
        .take(limit)
        .filter_map(|block| parse_article(block, base_url))
        .collect()
}

fn parse_article(block: ElementRef<'_>, base_url: &str) -> Option<Source> {
    let sel = selectors();
    let link = block.select(&sel.title).next()?;
    let title = element_text(link);
    let href = link.value().attr("href").unwrap_or_default();
    let url = if href.starts_with('/') {
        format!("{base_url}{href}")
    } else {
        href.to_string()
    };
    if title.is_empty() || url.is_empty() {
        return None;
    }

    let lead = block
        .select(&sel.lead)
        .next()
        .map(element_text)
        .unwrap_or_default();
    let published_at = block
        .select(&sel.time)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc));

    Some(Source {
        content: format!("{title}\n\n{lead}")
            .chars()
            .take(MAX_ARTICLE_CHARS)
            .collect(),
        title,
        url,
        source_type: SERVICE.to_string(),
        published_at,
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait::async_trait]
impl SourceCollector for HabrCollector {
    async fn collect(
        &self,
        keywords: Option<&[String]>,
        _topic: Option<&str>,
    ) -> Result<Vec<Source>, ChannelError> {
        let cutoff = Utc::now() - Duration::days(i64::from(self.days_back));
        let tags = self.tags_for(keywords);

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for tag in &tags {
            match self.search(tag).await {
                Ok(found) => {
                    succeeded += 1;
                    // Undated articles are kept.
                    let recent: Vec<Source> = found
                        .into_iter()
                        .filter(|s| s.published_at.map_or(true, |at| at >= cutoff))
                        .collect();
                    tracing::debug!(tag = %tag, recent = recent.len(), "habr search");
                    sources.extend(recent.into_iter().filter(|s| seen.insert(s.url.clone())));
                }
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "habr search failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => {
                tracing::info!(tags = tags.len(), sources = sources.len(), "habr articles collected");
                Ok(sources)
            }
        }
    }
}
