//! Per-job polling, expiry, and grace timers.
//!
//! The scheduler owns an explicit job table mapping job id to its live
//! timer handles and lifecycle state. All cancellation goes through the
//! table: removing a job takes its entry out, purges the persisted record,
//! and aborts every associated timer, so a late callback can never act on
//! (or resurrect) a removed job.
//!
//! Within one job, effects are strictly ordered — fetch, compare, sink
//! update, persist — and the next tick is only armed after the previous
//! tick's body finished, so ticks for the same job never overlap. Jobs
//! interleave freely with each other; the store serializes writers itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use statuswatch_core::config::TrackerConfig;
use statuswatch_core::job::{
    job_map_entry, new_job_id, ChannelLabelJob, JobCategory, JobId, JobRecord, ServerStatusJob,
};
use statuswatch_sink::{LabelSink, NotificationLocation, NotificationSink, SinkError};
use statuswatch_status::StatusSource;

use crate::render;
use crate::store::{SharedJobStore, StoreError};

// ── Job table ─────────────────────────────────────────────────

/// Lifecycle state of a tracked job. `Removed` is represented by absence
/// from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    Expiring,
    GracePeriod,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Active => "active",
            JobState::Expiring => "expiring",
            JobState::GracePeriod => "grace-period",
        };
        f.write_str(s)
    }
}

struct JobEntry {
    category: JobCategory,
    state: JobState,
    /// Absolute expiry deadline (status-message jobs only); the persisted
    /// `remainingLifetimeMs` is recomputed from this on every save.
    expires_at: Option<Instant>,
    poll: Option<AbortHandle>,
    expiry: Option<AbortHandle>,
    grace: Option<AbortHandle>,
}

impl JobEntry {
    fn abort_all(&self) {
        for handle in [&self.poll, &self.expiry, &self.grace].into_iter().flatten() {
            handle.abort();
        }
    }

    fn remaining_lifetime_ms(&self) -> u64 {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()).as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A row of the job table, for introspection.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: JobId,
    pub category: JobCategory,
    pub state: JobState,
}

// ── Scheduler ─────────────────────────────────────────────────

struct Inner {
    store: SharedJobStore,
    status: Arc<dyn StatusSource>,
    notifications: Arc<dyn NotificationSink>,
    labels: Arc<dyn LabelSink>,
    timing: TrackerConfig,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
    /// Consecutive failed store writes, reset on the first success.
    /// Exposed on /health so a persistently unwritable store surfaces.
    store_write_failures: AtomicU64,
}

/// Owns all live timers. Cheap to clone; clones share the job table.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(
        store: SharedJobStore,
        status: Arc<dyn StatusSource>,
        notifications: Arc<dyn NotificationSink>,
        labels: Arc<dyn LabelSink>,
        timing: TrackerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                status,
                notifications,
                labels,
                timing,
                jobs: Mutex::new(HashMap::new()),
                store_write_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Persist a brand-new status-message job, then start its timers.
    /// Persisting first means a crash in between leaves a record that
    /// recovery will resume, never an untracked live message.
    pub async fn track_server_status(&self, job: ServerStatusJob) -> Result<JobId, StoreError> {
        let id = new_job_id();
        self.inner
            .store
            .save(&job_map_entry(id.clone(), JobRecord::ServerStatus(job.clone())))
            .await?;
        self.admit_server_status(id.clone(), job);
        Ok(id)
    }

    /// Persist a brand-new channel-label job, then start its poll timer.
    pub async fn track_channel_label(&self, job: ChannelLabelJob) -> Result<JobId, StoreError> {
        let id = new_job_id();
        self.inner
            .store
            .save(&job_map_entry(id.clone(), JobRecord::ChannelLabel(job.clone())))
            .await?;
        self.admit_channel_label(id.clone(), job);
        Ok(id)
    }

    /// Start timers for an already-persisted status-message job. The expiry
    /// countdown runs from the record's `remaining_lifetime_ms`, so a
    /// recovered job picks up where the last persisted snapshot left off.
    pub fn admit_server_status(&self, id: JobId, job: ServerStatusJob) {
        let remaining = Duration::from_millis(job.remaining_lifetime_ms);
        let poll = tokio::spawn(Inner::server_status_poll_loop(
            self.inner.clone(),
            id.clone(),
            job.clone(),
        ))
        .abort_handle();
        let expiry = tokio::spawn(Inner::expiry_sequence(
            self.inner.clone(),
            id.clone(),
            job,
            remaining,
        ))
        .abort_handle();

        let entry = JobEntry {
            category: JobCategory::ServerStatus,
            state: JobState::Active,
            expires_at: Some(Instant::now() + remaining),
            poll: Some(poll),
            expiry: Some(expiry),
            grace: None,
        };
        self.insert_entry(id, entry);
    }

    /// Start the poll timer for an already-persisted channel-label job.
    pub fn admit_channel_label(&self, id: JobId, job: ChannelLabelJob) {
        let poll = tokio::spawn(Inner::channel_label_poll_loop(
            self.inner.clone(),
            id.clone(),
            job,
        ))
        .abort_handle();

        let entry = JobEntry {
            category: JobCategory::ChannelLabel,
            state: JobState::Active,
            expires_at: None,
            poll: Some(poll),
            expiry: None,
            grace: None,
        };
        self.insert_entry(id, entry);
    }

    fn insert_entry(&self, id: JobId, entry: JobEntry) {
        info!(job_id = %id, category = %entry.category, "Job admitted");
        let previous = self.inner.jobs.lock().unwrap().insert(id.clone(), entry);
        if let Some(previous) = previous {
            // Re-admission under the same id: the old timers must die so the
            // job never has two live timer sets.
            warn!(job_id = %id, "Replacing live timers for re-admitted job");
            previous.abort_all();
        }
    }

    /// Cancel all timers for a job and purge its persisted record.
    /// Unknown ids are a no-op.
    pub async fn remove_job(&self, id: &str) {
        self.inner.remove_job(id).await;
    }

    /// Delete a message after a delay. Cosmetic (used for the tracking
    /// announcement); not tied to a job id, so a failure is only logged.
    pub fn schedule_message_deletion(&self, channel_id: String, message_id: String) {
        let inner = self.inner.clone();
        let delay = inner.timing.grace();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let location = NotificationLocation::new(channel_id, message_id);
            match inner.notifications.delete(&location).await {
                Ok(()) | Err(SinkError::NotFound) => {}
                Err(e) => warn!(error = %e, "Failed to delete announcement message"),
            }
        });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.jobs.lock().unwrap().contains_key(id)
    }

    pub fn job_count(&self) -> usize {
        self.inner.jobs.lock().unwrap().len()
    }

    pub fn jobs_snapshot(&self) -> Vec<JobSummary> {
        let jobs = self.inner.jobs.lock().unwrap();
        let mut summaries: Vec<JobSummary> = jobs
            .iter()
            .map(|(id, entry)| JobSummary {
                id: id.clone(),
                category: entry.category,
                state: entry.state,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Consecutive store-write failures (0 when healthy).
    pub fn store_write_failures(&self) -> u64 {
        self.inner.store_write_failures.load(Ordering::Relaxed)
    }

    /// Abort every live timer without touching persisted state. Used on
    /// shutdown so jobs resume from the registry on the next start.
    pub fn abort_all(&self) {
        let mut jobs = self.inner.jobs.lock().unwrap();
        for (_, entry) in jobs.drain() {
            entry.abort_all();
        }
    }
}

// ── Timer bodies ──────────────────────────────────────────────

impl Inner {
    fn is_live(&self, id: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(id)
    }

    async fn remove_job(&self, id: &str) {
        let entry = self.jobs.lock().unwrap().remove(id);
        let Some(entry) = entry else {
            return;
        };
        info!(job_id = %id, category = %entry.category, "Removing job");
        if let Err(e) = self.store.remove_by_id(id).await {
            error!(job_id = %id, error = %e, "Failed to purge job record");
        }
        // Last, because one of these handles may be the calling task: once
        // aborted it only survives until its next await point.
        entry.abort_all();
    }

    /// Seed change detection from what the sink currently shows, so a poll
    /// cycle after recovery doesn't rewrite identical text.
    async fn seed_notification_text(
        &self,
        id: &str,
        location: &NotificationLocation,
    ) -> Result<Option<String>, ()> {
        match self.notifications.current_text(location).await {
            Ok(text) => Ok(Some(text)),
            Err(SinkError::NotFound) => {
                self.remove_job(id).await;
                Err(())
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Could not read current message text");
                Ok(None)
            }
        }
    }

    async fn server_status_poll_loop(inner: Arc<Inner>, id: JobId, job: ServerStatusJob) {
        let location = NotificationLocation::new(&job.channel_id, &job.message_id);
        let Ok(mut last_applied) = inner.seed_notification_text(&id, &location).await else {
            return;
        };

        let mut ticker = tokio::time::interval(inner.timing.notification_poll());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The zeroth tick completes immediately; the first poll runs a full
        // period after admission.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !inner.is_live(&id) {
                return;
            }

            match inner.status.fetch(&job.target_address).await {
                Ok(snapshot) => {
                    let text = render::server_status_text(&job.target_address, &snapshot);
                    if last_applied.as_deref() == Some(text.as_str()) {
                        debug!(job_id = %id, "Status message already up to date");
                        continue;
                    }
                    match inner.notifications.update(&location, &text).await {
                        Ok(()) => {
                            info!(job_id = %id, address = %job.target_address, "Status message updated");
                            last_applied = Some(text);
                            inner.persist_server_status(&id, &job).await;
                        }
                        Err(SinkError::NotFound) => {
                            inner.remove_job(&id).await;
                            return;
                        }
                        Err(e) => {
                            warn!(job_id = %id, error = %e, "Failed to edit status message");
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        job_id = %id,
                        address = %job.target_address,
                        error = %e,
                        "Status fetch failed"
                    );
                    // Inline error notice; not persisted, and the next
                    // successful render always rewrites.
                    last_applied = None;
                    match inner
                        .notifications
                        .update(&location, render::FETCH_ERROR_TEXT)
                        .await
                    {
                        Ok(()) => {}
                        Err(SinkError::NotFound) => {
                            inner.remove_job(&id).await;
                            return;
                        }
                        Err(e) => {
                            warn!(job_id = %id, error = %e, "Failed to write fetch-error notice");
                        }
                    }
                }
            }
        }
    }

    async fn channel_label_poll_loop(inner: Arc<Inner>, id: JobId, job: ChannelLabelJob) {
        let mut last_applied = match inner.labels.current_label(&job.channel_id).await {
            Ok(label) => Some(label),
            Err(SinkError::NotFound) => {
                inner.remove_job(&id).await;
                return;
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Could not read current channel label");
                None
            }
        };

        let mut ticker = tokio::time::interval(inner.timing.label_poll());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !inner.is_live(&id) {
                return;
            }

            let snapshot = match inner.status.fetch(&job.target_address).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // The channel keeps its last label until the next tick.
                    debug!(
                        job_id = %id,
                        address = %job.target_address,
                        error = %e,
                        "Status fetch failed; skipping label tick"
                    );
                    continue;
                }
            };

            let label = render::channel_label(&job.label_prefix, &snapshot);
            if last_applied.as_deref() == Some(label.as_str()) {
                debug!(job_id = %id, label = %label, "Channel label already up to date");
                continue;
            }
            match inner.labels.rename(&job.channel_id, &label).await {
                Ok(()) => {
                    info!(job_id = %id, label = %label, "Channel label updated");
                    last_applied = Some(label);
                    inner.persist_channel_label(&id, &job).await;
                }
                Err(SinkError::NotFound) => {
                    inner.remove_job(&id).await;
                    return;
                }
                Err(e) => {
                    // Includes rate limiting; the next tick retries.
                    warn!(job_id = %id, error = %e, "Failed to rename channel");
                }
            }
        }
    }

    /// Expiry countdown for a status-message job: stop polling, write the
    /// terminal text, and after the grace period delete message and record.
    async fn expiry_sequence(
        inner: Arc<Inner>,
        id: JobId,
        job: ServerStatusJob,
        remaining: Duration,
    ) {
        tokio::time::sleep(remaining).await;

        let still_live = {
            let mut jobs = inner.jobs.lock().unwrap();
            match jobs.get_mut(&id) {
                Some(entry) => {
                    if let Some(poll) = entry.poll.take() {
                        poll.abort();
                    }
                    entry.state = JobState::Expiring;
                    true
                }
                None => false,
            }
        };
        if !still_live {
            return;
        }

        info!(job_id = %id, address = %job.target_address, "Status message job expired");
        let location = NotificationLocation::new(&job.channel_id, &job.message_id);
        match inner.notifications.update(&location, render::EXPIRED_TEXT).await {
            Ok(()) => {}
            Err(SinkError::NotFound) => {
                inner.remove_job(&id).await;
                return;
            }
            Err(e) => {
                // The grace deletion still runs; the message just misses its
                // terminal text.
                warn!(job_id = %id, error = %e, "Failed to write expiry notice");
            }
        }

        let grace_inner = inner.clone();
        let grace_id = id.clone();
        let grace = tokio::spawn(async move {
            tokio::time::sleep(grace_inner.timing.grace()).await;
            if !grace_inner.is_live(&grace_id) {
                return;
            }
            let location = NotificationLocation::new(&job.channel_id, &job.message_id);
            match grace_inner.notifications.delete(&location).await {
                Ok(()) | Err(SinkError::NotFound) => {}
                Err(e) => {
                    warn!(job_id = %grace_id, error = %e, "Failed to delete expired message");
                }
            }
            grace_inner.remove_job(&grace_id).await;
        })
        .abort_handle();

        let mut jobs = inner.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(entry) => {
                entry.expiry = None;
                entry.state = JobState::GracePeriod;
                entry.grace = Some(grace);
            }
            None => {
                // Removed while the terminal text was being written.
                grace.abort();
            }
        }
    }

    /// Merge-save a status-message record with the lifetime refreshed to
    /// what is actually left on the expiry clock.
    async fn persist_server_status(&self, id: &str, job: &ServerStatusJob) {
        let remaining_ms = {
            let jobs = self.jobs.lock().unwrap();
            match jobs.get(id) {
                Some(entry) => entry.remaining_lifetime_ms(),
                // Removed mid-tick: never write the record back.
                None => return,
            }
        };
        let record = JobRecord::ServerStatus(ServerStatusJob {
            remaining_lifetime_ms: remaining_ms,
            ..job.clone()
        });
        self.persist(id, record).await;
    }

    async fn persist_channel_label(&self, id: &str, job: &ChannelLabelJob) {
        if !self.is_live(id) {
            return;
        }
        self.persist(id, JobRecord::ChannelLabel(job.clone())).await;
    }

    async fn persist(&self, id: &str, record: JobRecord) {
        let category = record.category();
        match self.store.save(&job_map_entry(id.to_string(), record)).await {
            Ok(()) => {
                self.store_write_failures.store(0, Ordering::Relaxed);
            }
            Err(e) => {
                let failures = self.store_write_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    job_id = %id,
                    category = %category,
                    consecutive_failures = failures,
                    error = %e,
                    "Failed to persist job record; will retry on the next change"
                );
            }
        }
    }
}
