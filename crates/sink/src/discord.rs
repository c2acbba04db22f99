//! Discord REST client implementing the sink and resolver traits.
//!
//! Talks plain HTTPS to the Discord API (no gateway connection). Rate
//! limits (HTTP 429) are surfaced with the server-provided `retry_after`
//! so callers can decide whether to retry.

use serde_json::Value;

use statuswatch_core::config::DiscordConfig;

use crate::traits::{LabelSink, NotificationLocation, NotificationSink, Resolver, SinkError};

/// Number of recent messages scanned when looking for an announcement.
const ANNOUNCEMENT_SCAN_LIMIT: u8 = 10;

fn retry_after_secs(body: &Value) -> u64 {
    // Discord reports fractional seconds; round up so a retry never lands
    // inside the limited window.
    body.get("retry_after")
        .and_then(|v| v.as_f64())
        .map(|secs| secs.ceil() as u64)
        .unwrap_or(30)
}

fn api_message(status: reqwest::StatusCode, body: &Value) -> String {
    let description = body
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown Discord API error");
    format!("HTTP {status}: {description}")
}

/// REST client for editing messages and renaming channels.
#[derive(Debug)]
pub struct DiscordClient {
    api_base: String,
    bot_token: String,
    client: reqwest::Client,
}

impl DiscordClient {
    /// Creates a new `DiscordClient` from configuration values.
    ///
    /// Returns [`SinkError::Config`] if no bot token is configured.
    pub fn from_config(config: &DiscordConfig) -> Result<Self, SinkError> {
        let bot_token = config
            .bot_token
            .clone()
            .ok_or_else(|| SinkError::Config("DISCORD_TOKEN is not set".to_string()))?;

        if bot_token.is_empty() {
            return Err(SinkError::Config(
                "Discord bot token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
            client: reqwest::Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, SinkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SinkError::NotFound);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SinkError::RateLimited {
                retry_after_secs: retry_after_secs(&body),
            });
        }
        Err(SinkError::Api(api_message(status, &body)))
    }

    async fn get_json(&self, path: &str) -> Result<Value, SinkError> {
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await?;
        let response = self.check(response).await?;
        Ok(response.json().await?)
    }

    async fn patch_json(&self, path: &str, body: Value) -> Result<Value, SinkError> {
        let response = self
            .client
            .patch(self.url(path))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&body)
            .send()
            .await?;
        let response = self.check(response).await?;
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    /// Post a new message to a channel, returning its message id.
    pub async fn post_message(&self, channel_id: &str, content: &str) -> Result<String, SinkError> {
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;
        let body: Value = self.check(response).await?.json().await?;

        body.get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| SinkError::Api("message create response missing id".to_string()))
    }
}

#[async_trait::async_trait]
impl NotificationSink for DiscordClient {
    async fn update(&self, location: &NotificationLocation, text: &str) -> Result<(), SinkError> {
        tracing::debug!(
            channel_id = %location.channel_id,
            message_id = %location.message_id,
            "Editing status message"
        );
        self.patch_json(
            &format!(
                "/channels/{}/messages/{}",
                location.channel_id, location.message_id
            ),
            serde_json::json!({ "content": text }),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, location: &NotificationLocation) -> Result<(), SinkError> {
        let response = self
            .client
            .delete(self.url(&format!(
                "/channels/{}/messages/{}",
                location.channel_id, location.message_id
            )))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    async fn current_text(&self, location: &NotificationLocation) -> Result<String, SinkError> {
        let body = self
            .get_json(&format!(
                "/channels/{}/messages/{}",
                location.channel_id, location.message_id
            ))
            .await?;
        Ok(body
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait::async_trait]
impl LabelSink for DiscordClient {
    async fn rename(&self, channel_id: &str, label: &str) -> Result<(), SinkError> {
        tracing::debug!(channel_id = %channel_id, label = %label, "Renaming channel");
        self.patch_json(
            &format!("/channels/{channel_id}"),
            serde_json::json!({ "name": label }),
        )
        .await?;
        Ok(())
    }

    async fn current_label(&self, channel_id: &str) -> Result<String, SinkError> {
        let body = self.get_json(&format!("/channels/{channel_id}")).await?;
        Ok(body
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait::async_trait]
impl Resolver for DiscordClient {
    async fn resolve_notification(
        &self,
        location: &NotificationLocation,
    ) -> Result<bool, SinkError> {
        match self.current_text(location).await {
            Ok(_) => Ok(true),
            Err(SinkError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn resolve_label_target(&self, channel_id: &str) -> Result<bool, SinkError> {
        match self.current_label(channel_id).await {
            Ok(_) => Ok(true),
            Err(SinkError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn find_recent_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<Option<String>, SinkError> {
        let body = self
            .get_json(&format!(
                "/channels/{channel_id}/messages?limit={ANNOUNCEMENT_SCAN_LIMIT}"
            ))
            .await?;

        let Some(messages) = body.as_array() else {
            return Err(SinkError::Api(
                "message list response is not an array".to_string(),
            ));
        };

        Ok(messages.iter().find_map(|msg| {
            let matches = msg.get("content").and_then(|v| v.as_str()) == Some(content);
            if matches {
                msg.get("id").and_then(|v| v.as_str()).map(String::from)
            } else {
                None
            }
        }))
    }
}
