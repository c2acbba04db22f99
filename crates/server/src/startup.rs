//! Server startup: shared state initialization, job recovery, HTTP surface.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use statuswatch_core::Config;
use statuswatch_sink::{DiscordClient, LabelSink, NotificationSink, Resolver};
use statuswatch_status::{McStatusClient, StatusSource};
use statuswatch_tracker::{JobScheduler, JobStore, RecoveryCoordinator, SharedJobStore};

use crate::api;
use crate::state::AppState;

/// Build shared state, reconcile persisted jobs, and serve the API until
/// the process is stopped.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    config.log_summary();

    let store = SharedJobStore::new(JobStore::new(&config.storage.data_dir));
    let status: Arc<dyn StatusSource> =
        Arc::new(McStatusClient::from_config(&config.status_api));
    let discord = Arc::new(DiscordClient::from_config(&config.discord)?);

    let notifications: Arc<dyn NotificationSink> = discord.clone();
    let labels: Arc<dyn LabelSink> = discord.clone();
    let resolver: Arc<dyn Resolver> = discord.clone();

    let scheduler = JobScheduler::new(
        store.clone(),
        status.clone(),
        notifications,
        labels,
        config.tracker.clone(),
    );

    // Reconcile the registry before the API can add new jobs: every
    // persisted job is resumed or purged, never left half-configured.
    let recovery = RecoveryCoordinator::new(store.clone(), resolver, scheduler.clone());
    let report = recovery.run().await?;
    info!(
        resumed = report.resumed_notifications + report.resumed_labels,
        purged = report.purged,
        skipped = report.skipped,
        "Job recovery finished"
    );

    let scheduler_for_shutdown = scheduler.clone();
    let state = Arc::new(AppState {
        store,
        scheduler,
        status,
        discord,
        config: config.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/status/{address}", get(api::one_shot_status))
        .route("/jobs", get(api::list_jobs))
        .route("/jobs/server-status", post(api::create_server_status_job))
        .route("/jobs/channel-label", post(api::create_channel_label_job))
        .route("/jobs/{id}", delete(api::delete_job))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            // Timers die here, records stay: the next start recovers them.
            info!("Shutdown signal received; stopping job timers");
            scheduler_for_shutdown.abort_all();
        })
        .await?;

    Ok(())
}
