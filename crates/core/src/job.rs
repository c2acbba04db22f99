//! Tracked-job model shared by the store, the scheduler, and recovery.
//!
//! Jobs persist as a single JSON document keyed category → job id → record:
//!
//! ```json
//! {
//!   "serverStatuses":  { "<uuid>": { "targetAddress": "...", ... } },
//!   "channelStatuses": { "<uuid>": { "targetAddress": "...", ... } }
//! }
//! ```
//!
//! Records are a tagged union over [`JobCategory`]; the category is the map
//! key, never a field inside the record. Parsing is per-record so a single
//! malformed entry can be dropped without rejecting the whole document.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque job identifier (uuid v4, never reused).
pub type JobId = String;

/// Mint a fresh job id.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

/// Default time-to-live for a status-message job: 15 minutes.
pub const DEFAULT_NOTIFICATION_LIFETIME_MS: u64 = 900_000;

// ── Categories ────────────────────────────────────────────────

/// The two kinds of tracked jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobCategory {
    /// Time-limited status message kept up to date by edits.
    #[serde(rename = "serverStatuses")]
    ServerStatus,
    /// Open-ended channel-name sync with the server's player count.
    #[serde(rename = "channelStatuses")]
    ChannelLabel,
}

impl JobCategory {
    pub const ALL: [JobCategory; 2] = [JobCategory::ServerStatus, JobCategory::ChannelLabel];

    /// The key this category uses in the persisted document.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::ServerStatus => "serverStatuses",
            JobCategory::ChannelLabel => "channelStatuses",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "serverStatuses" => Some(JobCategory::ServerStatus),
            "channelStatuses" => Some(JobCategory::ChannelLabel),
            _ => None,
        }
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ───────────────────────────────────────────────────

/// Persisted state of a status-message job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusJob {
    /// Game-server address passed to the status API.
    pub target_address: String,
    /// Channel holding the editable status message.
    pub channel_id: String,
    /// The editable status message itself.
    pub message_id: String,
    /// Time-to-live measured from the last persisted snapshot, not from
    /// job creation. Refreshed on every successful update so recovery can
    /// resume the countdown where it left off.
    #[serde(default = "default_lifetime_ms")]
    pub remaining_lifetime_ms: u64,
}

fn default_lifetime_ms() -> u64 {
    DEFAULT_NOTIFICATION_LIFETIME_MS
}

/// Persisted state of a channel-label job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelLabelJob {
    /// Game-server address passed to the status API.
    pub target_address: String,
    /// Channel whose name mirrors the player count.
    pub channel_id: String,
    /// Prefix composed into the label while the server is online.
    pub label_prefix: String,
}

/// A tracked job record; the variant matches the category map key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRecord {
    ServerStatus(ServerStatusJob),
    ChannelLabel(ChannelLabelJob),
}

impl JobRecord {
    pub fn category(&self) -> JobCategory {
        match self {
            JobRecord::ServerStatus(_) => JobCategory::ServerStatus,
            JobRecord::ChannelLabel(_) => JobCategory::ChannelLabel,
        }
    }

    pub fn target_address(&self) -> &str {
        match self {
            JobRecord::ServerStatus(job) => &job.target_address,
            JobRecord::ChannelLabel(job) => &job.target_address,
        }
    }

    /// Parse a record under a known category key. Unknown extra fields are
    /// ignored; missing required fields are an error so the caller can drop
    /// the entry.
    pub fn parse(category: JobCategory, value: serde_json::Value) -> serde_json::Result<Self> {
        match category {
            JobCategory::ServerStatus => {
                serde_json::from_value(value).map(JobRecord::ServerStatus)
            }
            JobCategory::ChannelLabel => {
                serde_json::from_value(value).map(JobRecord::ChannelLabel)
            }
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        match self {
            // Serializing these structs cannot fail: string and integer
            // fields only.
            JobRecord::ServerStatus(job) => serde_json::to_value(job).unwrap(),
            JobRecord::ChannelLabel(job) => serde_json::to_value(job).unwrap(),
        }
    }
}

// ── Job map ───────────────────────────────────────────────────

/// Full (or partial, for merge saves) registry: category → id → record.
pub type JobMap = BTreeMap<JobCategory, BTreeMap<JobId, JobRecord>>;

/// Build a one-record partial map, the usual argument to a merge save.
pub fn job_map_entry(id: JobId, record: JobRecord) -> JobMap {
    let mut inner = BTreeMap::new();
    let category = record.category();
    inner.insert(id, record);
    let mut map = BTreeMap::new();
    map.insert(category, inner);
    map
}
