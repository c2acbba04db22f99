//! Startup reconciliation: rebuild live jobs from the persisted registry.
//!
//! Every persisted job is either cleanly resumed or cleanly discarded —
//! never left half-configured. A job whose message or channel vanished
//! while the process was down is purged; a job that cannot be checked
//! because the presentation layer is unreachable is left in the registry
//! for the next startup and not admitted.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use statuswatch_core::job::{ChannelLabelJob, JobId, JobRecord, ServerStatusJob};
use statuswatch_sink::{NotificationLocation, Resolver, SinkError};

use crate::render;
use crate::scheduler::JobScheduler;
use crate::store::{SharedJobStore, StoreError};

/// Counters describing one recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub resumed_notifications: usize,
    pub resumed_labels: usize,
    pub purged: usize,
    pub skipped: usize,
}

pub struct RecoveryCoordinator {
    store: SharedJobStore,
    resolver: Arc<dyn Resolver>,
    scheduler: JobScheduler,
}

impl RecoveryCoordinator {
    pub fn new(store: SharedJobStore, resolver: Arc<dyn Resolver>, scheduler: JobScheduler) -> Self {
        Self {
            store,
            resolver,
            scheduler,
        }
    }

    /// Run the reconciliation pass. Returns an error only when the registry
    /// cannot be read or initialized at all; individual bad entries are
    /// dropped by the store's lenient load, and an unparsable document is
    /// quarantined and replaced with an empty one.
    pub async fn run(&self) -> Result<RecoveryReport, StoreError> {
        self.store.ensure_exists().await?;

        let jobs = match self.store.load().await {
            Ok(jobs) => jobs,
            Err(e @ StoreError::Io(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Job registry is unreadable; quarantining it");
                let quarantined = self.store.quarantine().await?;
                warn!(path = %quarantined.display(), "Corrupt registry moved aside");
                Default::default()
            }
        };

        let mut report = RecoveryReport::default();
        for entries in jobs.into_values() {
            for (id, record) in entries {
                match record {
                    JobRecord::ServerStatus(job) => {
                        self.recover_server_status(&mut report, id, job).await;
                    }
                    JobRecord::ChannelLabel(job) => {
                        self.recover_channel_label(&mut report, id, job).await;
                    }
                }
            }
        }

        info!(
            resumed_notifications = report.resumed_notifications,
            resumed_labels = report.resumed_labels,
            purged = report.purged,
            skipped = report.skipped,
            "Recovery complete"
        );
        Ok(report)
    }

    async fn recover_server_status(
        &self,
        report: &mut RecoveryReport,
        id: JobId,
        job: ServerStatusJob,
    ) {
        let location = NotificationLocation::new(&job.channel_id, &job.message_id);
        match self.resolver.resolve_notification(&location).await {
            Ok(true) => {
                info!(
                    job_id = %id,
                    address = %job.target_address,
                    remaining_ms = job.remaining_lifetime_ms,
                    "Resuming status message job"
                );
                self.scheduler.admit_server_status(id, job);
                report.resumed_notifications += 1;
            }
            Ok(false) => {
                self.purge(report, &id, "status message deleted while offline")
                    .await;
            }
            Err(e) => self.skip(report, &id, e),
        }
    }

    async fn recover_channel_label(
        &self,
        report: &mut RecoveryReport,
        id: JobId,
        job: ChannelLabelJob,
    ) {
        match self.resolver.resolve_label_target(&job.channel_id).await {
            Ok(true) => {
                // Cosmetic: the "now tracking" announcement may still be
                // sitting in the channel from before the restart.
                match self
                    .resolver
                    .find_recent_message(&job.channel_id, render::TRACKING_ANNOUNCEMENT)
                    .await
                {
                    Ok(Some(message_id)) => {
                        debug!(job_id = %id, message_id = %message_id, "Scheduling announcement cleanup");
                        self.scheduler
                            .schedule_message_deletion(job.channel_id.clone(), message_id);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(job_id = %id, error = %e, "Announcement lookup failed");
                    }
                }

                info!(job_id = %id, address = %job.target_address, "Resuming channel label job");
                self.scheduler.admit_channel_label(id, job);
                report.resumed_labels += 1;
            }
            Ok(false) => {
                self.purge(report, &id, "channel deleted while offline").await;
            }
            Err(e) => self.skip(report, &id, e),
        }
    }

    async fn purge(&self, report: &mut RecoveryReport, id: &str, reason: &str) {
        info!(job_id = %id, reason, "Purging stale job record");
        if let Err(e) = self.store.remove_by_id(id).await {
            error!(job_id = %id, error = %e, "Failed to purge stale job record");
        }
        report.purged += 1;
    }

    fn skip(&self, report: &mut RecoveryReport, id: &str, error: SinkError) {
        warn!(
            job_id = %id,
            error = %error,
            "Resolution failed; leaving record for the next startup"
        );
        report.skipped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use statuswatch_core::config::TrackerConfig;
    use statuswatch_core::job::job_map_entry;

    use crate::render;
    use crate::store::JobStore;
    use crate::testing::{online, MockLabelSink, MockNotificationSink, MockResolver, MockStatusSource};

    fn status_record(lifetime_ms: u64) -> JobRecord {
        JobRecord::ServerStatus(ServerStatusJob {
            target_address: "mc.example.com".to_string(),
            channel_id: "chan-1".to_string(),
            message_id: "msg-1".to_string(),
            remaining_lifetime_ms: lifetime_ms,
        })
    }

    fn label_record() -> JobRecord {
        JobRecord::ChannelLabel(ChannelLabelJob {
            target_address: "mc.example.com".to_string(),
            channel_id: "chan-2".to_string(),
            label_prefix: "online-".to_string(),
        })
    }

    struct Fixture {
        store: SharedJobStore,
        scheduler: JobScheduler,
        resolver: Arc<MockResolver>,
        status: Arc<MockStatusSource>,
        notifications: Arc<MockNotificationSink>,
        _tmp: tempfile::TempDir,
    }

    impl Fixture {
        fn coordinator(&self) -> RecoveryCoordinator {
            RecoveryCoordinator::new(
                self.store.clone(),
                self.resolver.clone(),
                self.scheduler.clone(),
            )
        }
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let store = SharedJobStore::new(JobStore::new(tmp.path()));
        let status = Arc::new(MockStatusSource::new());
        let notifications = Arc::new(MockNotificationSink::new());
        let labels = Arc::new(MockLabelSink::new());
        let scheduler = JobScheduler::new(
            store.clone(),
            status.clone(),
            notifications.clone(),
            labels,
            TrackerConfig::default(),
        );
        Fixture {
            store,
            scheduler,
            resolver: Arc::new(MockResolver::new()),
            status,
            notifications,
            _tmp: tmp,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_initializes_empty_registry() {
        let f = fixture();
        let report = f.coordinator().run().await.unwrap();
        assert_eq!(report, RecoveryReport::default());
        assert!(f.store.load().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_notification_is_purged_without_arming_timers() {
        let f = fixture();
        f.store
            .save(&job_map_entry("stale-1".to_string(), status_record(900_000)))
            .await
            .unwrap();
        f.resolver.mark_notification_missing("chan-1", "msg-1");

        let report = f.coordinator().run().await.unwrap();

        assert_eq!(report.purged, 1);
        assert_eq!(report.resumed_notifications, 0);
        assert!(f.store.load().await.unwrap().is_empty());
        assert_eq!(f.scheduler.job_count(), 0);

        // No timer was armed for the purged job.
        tokio::time::sleep(Duration::from_secs(1_000)).await;
        assert_eq!(f.notifications.update_count(), 0);
        assert_eq!(f.notifications.delete_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_label_target_is_purged() {
        let f = fixture();
        f.store
            .save(&job_map_entry("stale-2".to_string(), label_record()))
            .await
            .unwrap();
        f.resolver.mark_channel_missing("chan-2");

        let report = f.coordinator().run().await.unwrap();

        assert_eq!(report.purged, 1);
        assert!(f.store.load().await.unwrap().is_empty());
        assert_eq!(f.scheduler.job_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn valid_jobs_are_resumed() {
        let f = fixture();
        f.store
            .save(&job_map_entry("job-1".to_string(), status_record(900_000)))
            .await
            .unwrap();
        f.store
            .save(&job_map_entry("job-2".to_string(), label_record()))
            .await
            .unwrap();

        let report = f.coordinator().run().await.unwrap();

        assert_eq!(report.resumed_notifications, 1);
        assert_eq!(report.resumed_labels, 1);
        assert_eq!(report.purged, 0);
        assert_eq!(f.scheduler.job_count(), 2);
        assert!(f.scheduler.contains("job-1"));
        assert!(f.scheduler.contains("job-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_resumes_from_persisted_remaining_lifetime() {
        let f = fixture();
        f.status.push_ok(online(1));
        f.store
            .save(&job_map_entry("job-1".to_string(), status_record(120_000)))
            .await
            .unwrap();

        f.coordinator().run().await.unwrap();

        // Just before the persisted 120 s: not expired yet.
        tokio::time::sleep(Duration::from_secs(115)).await;
        assert_ne!(
            f.notifications.last_update().as_deref(),
            Some(render::EXPIRED_TEXT)
        );

        // Just after: expired — the countdown resumed, it did not restart
        // from the 15-minute default.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            f.notifications.last_update().as_deref(),
            Some(render::EXPIRED_TEXT)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_presentation_layer_skips_without_purging() {
        let f = fixture();
        f.store
            .save(&job_map_entry("job-2".to_string(), label_record()))
            .await
            .unwrap();
        f.resolver.mark_channel_unreachable("chan-2");

        let report = f.coordinator().run().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.purged, 0);
        assert_eq!(f.scheduler.job_count(), 0);
        // The record survives for the next startup.
        assert!(!f.store.load().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lingering_announcement_is_deleted_after_the_delay() {
        let f = fixture();
        f.store
            .save(&job_map_entry("job-2".to_string(), label_record()))
            .await
            .unwrap();
        f.resolver.set_announcement("chan-2", "ann-9");

        f.coordinator().run().await.unwrap();

        assert_eq!(f.notifications.delete_count(), 0);
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(f.notifications.delete_count(), 1);
        // The label job itself keeps running.
        assert!(f.scheduler.contains("job-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_registry_is_quarantined_and_reset() {
        let f = fixture();
        let path = {
            // Reach through the shared handle once to find the path.
            let tmp_path = f._tmp.path().join("jobs.json");
            std::fs::write(&tmp_path, "[not, an, object]").unwrap();
            tmp_path
        };

        let report = f.coordinator().run().await.unwrap();

        assert_eq!(report, RecoveryReport::default());
        // The bad document was moved aside and an empty registry written.
        assert!(path.with_extension("json.corrupt").exists());
        assert!(f.store.load().await.unwrap().is_empty());
    }
}
