//! Durable job registry: one JSON document on disk.
//!
//! Layout (see [`statuswatch_core::job`]):
//!
//! ```json
//! { "serverStatuses": { "<id>": { ... } }, "channelStatuses": { "<id>": { ... } } }
//! ```
//!
//! Saves are merge-on-save: each `(category, id)` present in the partial
//! replaces the stored record wholesale, everything else is left untouched —
//! including entries this build cannot parse, so an older document survives
//! a round-trip. Writes go through a temp file + rename so the document on
//! disk is always complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use statuswatch_core::job::{JobCategory, JobMap, JobRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job document root is not an object")]
    NotAnObject,
}

/// Filesystem-backed job registry.
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    /// Create a store over `{data_dir}/jobs.json`. Does not touch the disk;
    /// call [`ensure_exists`](JobStore::ensure_exists) at startup.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("jobs.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Initialize an empty document on first run so later loads never fail.
    pub fn ensure_exists(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.write_document(&Map::new())
    }

    fn read_document(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&json)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::NotAnObject),
        }
    }

    fn write_document(&self, doc: &Map<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&Value::Object(doc.clone()))?;
        // Write-then-rename: a crash mid-write leaves the old document
        // intact instead of a truncated one.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the full registry. Unknown categories and malformed records are
    /// dropped with a log line; they stay in the document on disk until a
    /// save or removal touches them.
    pub fn load(&self) -> Result<JobMap, StoreError> {
        let doc = self.read_document()?;
        let mut map = JobMap::new();

        for (key, value) in doc {
            let Some(category) = JobCategory::from_key(&key) else {
                warn!(category = %key, "Dropping unknown job category");
                continue;
            };
            let Value::Object(entries) = value else {
                warn!(category = %key, "Dropping non-object category entry");
                continue;
            };
            for (id, record_value) in entries {
                match JobRecord::parse(category, record_value) {
                    Ok(record) => {
                        map.entry(category).or_default().insert(id, record);
                    }
                    Err(e) => {
                        warn!(
                            job_id = %id,
                            category = %category,
                            error = %e,
                            "Dropping malformed job record"
                        );
                    }
                }
            }
        }

        Ok(map)
    }

    /// Merge `partial` into the document: every `(category, id)` present
    /// replaces the stored record in full; unrelated entries are untouched.
    /// Saving the same partial twice is a no-op the second time.
    pub fn save(&self, partial: &JobMap) -> Result<(), StoreError> {
        let mut doc = self.read_document()?;

        for (category, entries) in partial {
            let slot = doc
                .entry(category.as_str().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(stored) = slot {
                for (id, record) in entries {
                    stored.insert(id.clone(), record.to_value());
                }
            }
        }

        self.write_document(&doc)
    }

    /// Move an unreadable document aside (`jobs.json.corrupt`) and start
    /// over with an empty one, keeping the bad bytes for diagnosis.
    pub fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let quarantined = self.path.with_extension("json.corrupt");
        std::fs::rename(&self.path, &quarantined)?;
        self.write_document(&Map::new())?;
        Ok(quarantined)
    }

    /// Delete `id` from every category it appears in, pruning categories
    /// that become empty. Absent ids are a no-op, not an error.
    pub fn remove_by_id(&self, id: &str) -> Result<(), StoreError> {
        let mut doc = self.read_document()?;

        let mut changed = false;
        for value in doc.values_mut() {
            if let Value::Object(entries) = value {
                if entries.remove(id).is_some() {
                    changed = true;
                }
            }
        }
        if !changed {
            return Ok(());
        }

        doc.retain(|_, value| value.as_object().map(|m| !m.is_empty()).unwrap_or(true));
        self.write_document(&doc)
    }
}

// ── Shared handle ─────────────────────────────────────────────

/// Single-writer handle to the store. Every call locks for the whole
/// read-modify-write, so two interleaved saves can never each read stale
/// state and drop the other's update.
#[derive(Clone)]
pub struct SharedJobStore {
    inner: Arc<tokio::sync::Mutex<JobStore>>,
}

impl SharedJobStore {
    pub fn new(store: JobStore) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(store)),
        }
    }

    pub async fn ensure_exists(&self) -> Result<(), StoreError> {
        self.inner.lock().await.ensure_exists()
    }

    pub async fn load(&self) -> Result<JobMap, StoreError> {
        self.inner.lock().await.load()
    }

    pub async fn save(&self, partial: &JobMap) -> Result<(), StoreError> {
        self.inner.lock().await.save(partial)
    }

    pub async fn remove_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.inner.lock().await.remove_by_id(id)
    }

    pub async fn quarantine(&self) -> Result<PathBuf, StoreError> {
        self.inner.lock().await.quarantine()
    }
}
