use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub discord: DiscordConfig,
    pub status_api: StatusApiConfig,
    pub tracker: TrackerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            storage: StorageConfig::from_env(),
            discord: DiscordConfig::from_env(),
            status_api: StatusApiConfig::from_env(),
            tracker: TrackerConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:  data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  discord:  api={}, token={}",
            self.discord.api_base,
            if self.discord.bot_token.is_some() { "(set)" } else { "(missing)" }
        );
        tracing::info!(
            "  status:   api={}, timeout={}s",
            self.status_api.base_url,
            self.status_api.request_timeout_secs
        );
        tracing::info!(
            "  tracker:  poll={}s/{}s, lifetime={}ms, grace={}s",
            self.tracker.notification_poll_secs,
            self.tracker.label_poll_secs,
            self.tracker.notification_lifetime_ms,
            self.tracker.grace_secs
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_u16("PORT", 3001),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
        }
    }
}

// ── Discord sink ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token used for the REST sink. `None` disables the Discord client
    /// (useful for tests and the one-shot `status` subcommand).
    pub bot_token: Option<String>,
    pub api_base: String,
}

impl DiscordConfig {
    fn from_env() -> Self {
        Self {
            bot_token: env_opt("DISCORD_TOKEN"),
            api_base: env_or("DISCORD_API_BASE", "https://discord.com/api/v10"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

// ── Status source ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl StatusApiConfig {
    fn from_env() -> Self {
        Self {
            base_url: env_or("STATUS_API_URL", "https://api.mcsrvstat.us/3"),
            request_timeout_secs: env_u64("STATUS_API_TIMEOUT_SECS", 10),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Tracker timing ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Poll period for status-message jobs.
    pub notification_poll_secs: u64,
    /// Poll period for channel-label jobs (label renames are rate-limited
    /// by Discord, so this is deliberately slower).
    pub label_poll_secs: u64,
    /// Default time-to-live for a status-message job.
    pub notification_lifetime_ms: u64,
    /// Delay between the terminal "expired" edit and message deletion.
    pub grace_secs: u64,
}

impl TrackerConfig {
    fn from_env() -> Self {
        Self {
            notification_poll_secs: env_u64("NOTIFICATION_POLL_SECS", 60),
            label_poll_secs: env_u64("LABEL_POLL_SECS", 300),
            notification_lifetime_ms: env_u64("NOTIFICATION_LIFETIME_MS", 900_000),
            grace_secs: env_u64("GRACE_SECS", 60),
        }
    }

    pub fn notification_poll(&self) -> Duration {
        Duration::from_secs(self.notification_poll_secs)
    }

    pub fn label_poll(&self) -> Duration {
        Duration::from_secs(self.label_poll_secs)
    }

    pub fn notification_lifetime(&self) -> Duration {
        Duration::from_millis(self.notification_lifetime_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            notification_poll_secs: 60,
            label_poll_secs: 300,
            notification_lifetime_ms: 900_000,
            grace_secs: 60,
        }
    }
}
