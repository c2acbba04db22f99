//! HTTP client for the mcsrvstat.us v3 status API.

use std::time::Duration;

use serde::Deserialize;

use statuswatch_core::config::StatusApiConfig;

/// Errors that can occur during a status fetch.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// The remote API could not be reached (DNS, connect, timeout,
    /// or a non-success HTTP status).
    #[error("status API unreachable: {0}")]
    Unreachable(String),

    /// The API answered but the body did not match the expected shape.
    #[error("malformed status response: {0}")]
    MalformedResponse(String),
}

/// The fields of a status response the tracker consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub online: bool,
    pub player_count: u32,
    /// Cleaned MOTD lines joined with newlines; empty when offline.
    pub motd: String,
}

/// Trait for status lookups, so scheduler and recovery tests can run
/// against scripted fixtures instead of the network.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current status for a server address.
    async fn fetch(&self, target_address: &str) -> Result<StatusSnapshot, StatusError>;
}

// ── Wire shape ────────────────────────────────────────────────

// Offline responses omit `players` and `motd` entirely, so both are
// optional at the wire level.
#[derive(Debug, Deserialize)]
struct WireStatus {
    online: bool,
    #[serde(default)]
    players: Option<WirePlayers>,
    #[serde(default)]
    motd: Option<WireMotd>,
}

#[derive(Debug, Deserialize)]
struct WirePlayers {
    #[serde(default)]
    online: u32,
}

#[derive(Debug, Deserialize)]
struct WireMotd {
    #[serde(default)]
    clean: Vec<String>,
}

fn parse_snapshot(body: &str) -> Result<StatusSnapshot, StatusError> {
    let wire: WireStatus = serde_json::from_str(body)
        .map_err(|e| StatusError::MalformedResponse(e.to_string()))?;

    Ok(StatusSnapshot {
        online: wire.online,
        player_count: wire.players.map(|p| p.online).unwrap_or(0),
        motd: wire
            .motd
            .map(|m| m.clean.join("\n"))
            .unwrap_or_default(),
    })
}

// ── Client ────────────────────────────────────────────────────

/// Fetches server status from the mcsrvstat.us v3 API.
#[derive(Debug, Clone)]
pub struct McStatusClient {
    base_url: String,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl McStatusClient {
    /// Create a client from configuration values.
    pub fn from_config(config: &StatusApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl StatusSource for McStatusClient {
    async fn fetch(&self, target_address: &str) -> Result<StatusSnapshot, StatusError> {
        let url = format!("{}/{}", self.base_url, target_address);

        tracing::debug!(address = %target_address, "Fetching server status");

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StatusError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::Unreachable(format!(
                "HTTP {} from status API",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StatusError::Unreachable(e.to_string()))?;

        parse_snapshot(&body)
    }
}
