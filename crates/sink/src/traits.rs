//! Sink and resolver trait definitions with shared error types.

/// Errors that can occur while applying a change to a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The referenced message or channel no longer exists. Treated as
    /// authoritative by callers: the job owning the location is removed,
    /// never retried.
    #[error("target not found")]
    NotFound,

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Location of an editable notification message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationLocation {
    pub channel_id: String,
    pub message_id: String,
}

impl NotificationLocation {
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// An editable text notification (status message).
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Replace the notification's text.
    async fn update(&self, location: &NotificationLocation, text: &str) -> Result<(), SinkError>;

    /// Delete the notification.
    async fn delete(&self, location: &NotificationLocation) -> Result<(), SinkError>;

    /// The text the notification currently shows.
    async fn current_text(&self, location: &NotificationLocation) -> Result<String, SinkError>;
}

/// A renameable channel label.
#[async_trait::async_trait]
pub trait LabelSink: Send + Sync {
    /// Rename the channel.
    async fn rename(&self, channel_id: &str, label: &str) -> Result<(), SinkError>;

    /// The label the channel currently carries.
    async fn current_label(&self, channel_id: &str) -> Result<String, SinkError>;
}

/// Existence checks for persisted locations, used during recovery.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    /// Whether the referenced notification message still exists.
    async fn resolve_notification(
        &self,
        location: &NotificationLocation,
    ) -> Result<bool, SinkError>;

    /// Whether the channel still exists.
    async fn resolve_label_target(&self, channel_id: &str) -> Result<bool, SinkError>;

    /// Find a recently posted message whose content equals `content`,
    /// returning its message id. Used to clean up a stale tracking
    /// announcement after a restart.
    async fn find_recent_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<Option<String>, SinkError>;
}
