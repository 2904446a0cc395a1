use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} API error: {message}")]
    Api {
        service: &'static str,
        message: String,
    },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    /// The post went out but the poll that should follow it did not.
    #[error("post {post_message_id} published but its poll failed: {source}")]
    PollFailed {
        post_message_id: i64,
        #[source]
        source: Box<ChannelError>,
    },

    #[error("Unexpected response from {service}: {detail}")]
    Parse {
        service: &'static str,
        detail: String,
    },
}

impl From<postline_core::PostlineError> for ChannelError {
    fn from(e: postline_core::PostlineError) -> Self {
        ChannelError::Config(e.to_string())
    }
}
