//! Collaborator seams consumed by the publication pipeline.

use crate::error::ChannelError;
use crate::types::{GeneratedPost, GenerationRequest, PollPublished, Published, Source};

/// Collects material for the next post. An empty list is a valid answer.
#[async_trait::async_trait]
pub trait SourceCollector: Send + Sync {
    async fn collect(
        &self,
        keywords: Option<&[String]>,
        topic: Option<&str>,
    ) -> Result<Vec<Source>, ChannelError>;
}

/// Turns sources, an archetype and decoration flags into finished text.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedPost, ChannelError>;
}

/// Delivers finished posts to the channel.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str) -> Result<Published, ChannelError>;

    /// Publish `text`, then a poll under it. When the post is delivered but
    /// the poll is not, implementations return [`ChannelError::PollFailed`]
    /// carrying the post's message id.
    async fn publish_with_poll(
        &self,
        text: &str,
        question: &str,
        options: &[String],
    ) -> Result<PollPublished, ChannelError>;
}

/// Out-of-band alerts for the operator (failed runs and the like).
#[async_trait::async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), ChannelError>;
}
