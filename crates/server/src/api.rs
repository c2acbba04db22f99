//! HTTP API: health, one-shot status queries, and job management.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use statuswatch_core::job::{ChannelLabelJob, JobRecord, ServerStatusJob};
use statuswatch_sink::{LabelSink, SinkError};
use statuswatch_status::StatusSource;
use statuswatch_tracker::render;

use crate::state::AppState;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn sink_error(e: SinkError) -> ApiError {
    match e {
        SinkError::NotFound => error_response(StatusCode::NOT_FOUND, "channel not found"),
        SinkError::RateLimited { retry_after_secs } => error_response(
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate limited; retry after {retry_after_secs}s"),
        ),
        other => error_response(StatusCode::BAD_GATEWAY, other.to_string()),
    }
}

// ── Health ────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub jobs: usize,
    /// Consecutive failed registry writes; non-zero marks the process
    /// degraded so an operator notices a wedged data dir.
    pub store_write_failures: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let failures = state.scheduler.store_write_failures();
    Json(HealthResponse {
        status: if failures == 0 { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.scheduler.job_count(),
        store_write_failures: failures,
    })
}

// ── One-shot status ───────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub address: String,
    pub online: bool,
    pub player_count: u32,
    pub text: String,
    pub motd: String,
}

pub async fn one_shot_status(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let snapshot = state.status.fetch(&address).await.map_err(|e| {
        error_response(
            StatusCode::BAD_GATEWAY,
            format!("Konnte den Serverstatus nicht abrufen. ({e})"),
        )
    })?;

    Ok(Json(StatusResponse {
        text: render::server_status_text(&address, &snapshot),
        motd: render::motd_text(&snapshot),
        address,
        online: snapshot.online,
        player_count: snapshot.player_count,
    }))
}

// ── Job listing ───────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub category: String,
    /// Live scheduler state, or `persisted-only` for records that were not
    /// admitted (e.g. skipped during recovery).
    pub state: String,
    pub target_address: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_lifetime_ms: Option<u64>,
}

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let persisted = state.store.load().await.map_err(internal)?;
    let live: HashMap<String, String> = state
        .scheduler
        .jobs_snapshot()
        .into_iter()
        .map(|summary| (summary.id, summary.state.to_string()))
        .collect();

    let mut views = Vec::new();
    for (category, entries) in persisted {
        for (id, record) in entries {
            let state_label = live
                .get(&id)
                .cloned()
                .unwrap_or_else(|| "persisted-only".to_string());
            let view = match record {
                JobRecord::ServerStatus(job) => JobView {
                    id,
                    category: category.to_string(),
                    state: state_label,
                    target_address: job.target_address,
                    channel_id: job.channel_id,
                    message_id: Some(job.message_id),
                    label_prefix: None,
                    remaining_lifetime_ms: Some(job.remaining_lifetime_ms),
                },
                JobRecord::ChannelLabel(job) => JobView {
                    id,
                    category: category.to_string(),
                    state: state_label,
                    target_address: job.target_address,
                    channel_id: job.channel_id,
                    message_id: None,
                    label_prefix: Some(job.label_prefix),
                    remaining_lifetime_ms: None,
                },
            };
            views.push(view);
        }
    }
    Ok(Json(views))
}

// ── Job creation ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerStatusRequest {
    pub server_address: String,
    pub channel_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedJobResponse {
    pub id: String,
    pub applied: String,
}

pub async fn create_server_status_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateServerStatusRequest>,
) -> Result<(StatusCode, Json<CreatedJobResponse>), ApiError> {
    if req.server_address.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "serverAddress must not be empty",
        ));
    }

    let snapshot = state.status.fetch(&req.server_address).await.map_err(|e| {
        error_response(
            StatusCode::BAD_GATEWAY,
            format!("Konnte den Serverstatus nicht abrufen. ({e})"),
        )
    })?;

    let text = render::server_status_text(&req.server_address, &snapshot);
    let message_id = state
        .discord
        .post_message(&req.channel_id, &text)
        .await
        .map_err(sink_error)?;

    let job = ServerStatusJob {
        target_address: req.server_address,
        channel_id: req.channel_id,
        message_id,
        remaining_lifetime_ms: state.config.tracker.notification_lifetime_ms,
    };
    let id = state
        .scheduler
        .track_server_status(job)
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedJobResponse { id, applied: text }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelLabelRequest {
    pub server_address: String,
    pub channel_id: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "online-".to_string()
}

pub async fn create_channel_label_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateChannelLabelRequest>,
) -> Result<(StatusCode, Json<CreatedJobResponse>), ApiError> {
    if req.server_address.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "serverAddress must not be empty",
        ));
    }

    let snapshot = state.status.fetch(&req.server_address).await.map_err(|e| {
        error_response(
            StatusCode::BAD_GATEWAY,
            format!("Konnte die Spieleranzahl nicht abrufen. ({e})"),
        )
    })?;

    let label = render::channel_label(&req.prefix, &snapshot);
    state
        .discord
        .rename(&req.channel_id, &label)
        .await
        .map_err(sink_error)?;

    // Announce the rename, then clean the announcement up after a minute.
    match state
        .discord
        .post_message(&req.channel_id, render::TRACKING_ANNOUNCEMENT)
        .await
    {
        Ok(message_id) => {
            state
                .scheduler
                .schedule_message_deletion(req.channel_id.clone(), message_id);
        }
        Err(e) => {
            tracing::warn!(channel_id = %req.channel_id, error = %e, "Failed to post tracking announcement");
        }
    }

    let job = ChannelLabelJob {
        target_address: req.server_address,
        channel_id: req.channel_id,
        label_prefix: req.prefix,
    };
    let id = state
        .scheduler
        .track_channel_label(job)
        .await
        .map_err(internal)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedJobResponse { id, applied: label }),
    ))
}

// ── Job deletion ──────────────────────────────────────────────

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.scheduler.contains(&id) {
        state.scheduler.remove_job(&id).await;
        return Ok(StatusCode::NO_CONTENT);
    }

    // A record can exist without live timers (skipped during recovery).
    let persisted = state
        .store
        .load()
        .await
        .map_err(internal)?
        .values()
        .any(|entries| entries.contains_key(&id));
    if persisted {
        state.store.remove_by_id(&id).await.map_err(internal)?;
        return Ok(StatusCode::NO_CONTENT);
    }

    Err(error_response(StatusCode::NOT_FOUND, "unknown job id"))
}
