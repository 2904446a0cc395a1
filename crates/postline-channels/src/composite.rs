//! Several source feeds behind one [`SourceCollector`].

use crate::error::ChannelError;
use crate::traits::SourceCollector;
use crate::types::Source;
use std::collections::HashSet;

/// Asks every feed in turn and merges their sources, first URL wins.
/// A feed that fails is logged and skipped; the run only fails when every
/// feed does.
#[derive(Default)]
pub struct CompositeCollector {
    feeds: Vec<(&'static str, Box<dyn SourceCollector>)>,
}

impl CompositeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, feed: impl SourceCollector + 'static) -> Self {
        self.feeds.push((name, Box::new(feed)));
        self
    }
}

#[async_trait::async_trait]
impl SourceCollector for CompositeCollector {
    async fn collect(
        &self,
        keywords: Option<&[String]>,
        topic: Option<&str>,
    ) -> Result<Vec<Source>, ChannelError> {
        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for (name, feed) in &self.feeds {
            match feed.collect(keywords, topic).await {
                Ok(found) => {
                    succeeded += 1;
                    tracing::info!(feed = *name, found = found.len(), "feed collected");
                    sources.extend(found.into_iter().filter(|s| seen.insert(s.url.clone())));
                }
                Err(e) => {
                    tracing::warn!(feed = *name, error = %e, "feed failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(sources),
        }
    }
}
