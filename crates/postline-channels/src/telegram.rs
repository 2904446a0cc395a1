//! Telegram Bot API publisher.
//!
//! Posts go to the configured channel through `sendMessage` in HTML parse
//! mode; polls follow the post through `sendPoll`. The same client doubles
//! as the operator notifier when an admin chat is configured.

use crate::error::ChannelError;
use crate::traits::{OperatorNotifier, Publisher};
use crate::types::{PollPublished, Published};
use postline_core::config::{env_secret, TelegramConfig};
use serde_json::{json, Value};

const SERVICE: &str = "telegram";

/// Fallback when a 429 response carries no `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TelegramPublisher {
    api_base: String,
    bot_token: String,
    channel_id: String,
    admin_chat_id: Option<String>,
    client: reqwest::Client,
}

impl TelegramPublisher {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Result<Self, ChannelError> {
        let bot_token = bot_token.into();
        if bot_token.is_empty() {
            return Err(ChannelError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }
        let channel_id = channel_id.into();
        if channel_id.is_empty() {
            return Err(ChannelError::Config(
                "telegram.channel_id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token,
            channel_id,
            admin_chat_id: None,
            client: reqwest::Client::new(),
        })
    }

    /// Build from the `telegram` config section, reading the bot token from
    /// the environment variable it names.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, ChannelError> {
        let channel_id = config
            .channel_id
            .clone()
            .ok_or_else(|| ChannelError::Config("telegram.channel_id is not set".to_string()))?;
        let token = env_secret(&config.bot_token_env)?;
        let publisher = Self::new(&config.api_base, token, channel_id)?;
        Ok(match &config.admin_chat_id {
            Some(admin) => publisher.with_admin_chat(admin.clone()),
            None => publisher,
        })
    }

    pub fn with_admin_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.admin_chat_id = Some(chat_id.into());
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// Call a Bot API method and return its `result` object.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let resp_body: Value = response.json().await?;

        if resp_body.get("ok") == Some(&Value::Bool(true)) {
            return Ok(resp_body.get("result").cloned().unwrap_or(Value::Null));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp_body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ChannelError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let description = resp_body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Telegram API error");
        Err(ChannelError::Api {
            service: SERVICE,
            message: description.to_string(),
        })
    }

    /// Send a text message. Generated HTML is not always well-formed, so a
    /// parse rejection is retried once without a parse mode.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<i64, ChannelError> {
        let html = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let result = match self.call("sendMessage", &html).await {
            Err(ChannelError::Api { message, .. }) if is_entity_parse_error(&message) => {
                tracing::warn!(chat_id, error = %message, "HTML rejected, resending as plain text");
                let plain = json!({
                    "chat_id": chat_id,
                    "text": text,
                    "disable_web_page_preview": true,
                });
                self.call("sendMessage", &plain).await?
            }
            other => other?,
        };
        message_id(&result)
    }
}

fn is_entity_parse_error(description: &str) -> bool {
    description.to_ascii_lowercase().contains("can't parse entities")
}

fn message_id(result: &Value) -> Result<i64, ChannelError> {
    result
        .get("message_id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ChannelError::Parse {
            service: SERVICE,
            detail: "result has no message_id".to_string(),
        })
}

#[async_trait::async_trait]
impl Publisher for TelegramPublisher {
    async fn publish(&self, text: &str) -> Result<Published, ChannelError> {
        tracing::debug!(channel = %self.channel_id, chars = text.chars().count(), "sending post");
        let message_id = self.send_text(&self.channel_id, text).await?;
        tracing::info!(channel = %self.channel_id, message_id, "post published");
        Ok(Published { message_id })
    }

    async fn publish_with_poll(
        &self,
        text: &str,
        question: &str,
        options: &[String],
    ) -> Result<PollPublished, ChannelError> {
        let post = self.publish(text).await?;
        let body = json!({
            "chat_id": self.channel_id,
            "question": question,
            "options": options,
            "is_anonymous": true,
        });
        let poll_message_id = self
            .call("sendPoll", &body)
            .await
            .and_then(|result| message_id(&result))
            .map_err(|e| ChannelError::PollFailed {
            post_message_id: post.message_id,
            source: Box::new(e),
        })?;
        tracing::info!(channel = %self.channel_id, poll_message_id, "poll published");
        Ok(PollPublished {
            post_message_id: post.message_id,
            poll_message_id,
        })
    }
}

#[async_trait::async_trait]
impl OperatorNotifier for TelegramPublisher {
    async fn notify(&self, text: &str) -> Result<(), ChannelError> {
        let Some(admin) = self.admin_chat_id.as_deref() else {
            tracing::debug!("no admin chat configured, dropping operator notice");
            return Ok(());
        };
        let body = json!({ "chat_id": admin, "text": text });
        self.call("sendMessage", &body).await?;
        Ok(())
    }
}
