use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::{
    Json,
    extract::{Path as UrlPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{
    error::ApiError,
    models::{
        BatchAccepted, BatchDownloadRequest, DownloadAccepted, DownloadRequest, FileEntry,
        HealthResponse, InfoRequest, InfoResponse, MediaInfoResponse, PlaylistAccepted,
        PlaylistDownloadRequest, PlaylistInfoResponse, RetryAccepted, SuccessResponse,
    },
    state::AppState,
    utils,
    validation::{validate_options, validate_url, validate_urls},
};
use crate::jobs::{self, JobError, JobRequest};
use crate::ledger::HistoryQuery;

const SUPPORTED_SITES_LIMIT: usize = 100;

/// Content-Type check, size-limited body read and JSON decode.
async fn read_json<T: DeserializeOwned>(
    state: &AppState,
    headers: &HeaderMap,
    body: axum::body::Body,
) -> Result<T, ApiError> {
    utils::require_json(headers)?;
    let limit = state.config.server.api.max_payload_bytes.as_usize();
    let data = utils::read_body(body, limit).await?;
    utils::parse_json(&data)
}

/// Create a single job (POST /api/download)
pub async fn start_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: DownloadRequest = read_json(&state, &headers, body).await?;
    validate_url(&request.url)?;
    validate_options(&request.options)?;

    let download_id = state
        .runner
        .submit(JobRequest::new(request.url.trim(), request.options))?;

    Ok((StatusCode::ACCEPTED, Json(DownloadAccepted { download_id })))
}

/// Create one job per URL (POST /api/batch-download)
pub async fn batch_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: BatchDownloadRequest = read_json(&state, &headers, body).await?;
    validate_urls(&request.urls)?;
    validate_options(&request.options)?;

    let download_ids = state.runner.submit_batch(&request.urls, &request.options)?;
    let response = BatchAccepted {
        count: download_ids.len(),
        download_ids,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Expand a playlist into jobs (POST /api/playlist-download)
pub async fn playlist_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: PlaylistDownloadRequest = read_json(&state, &headers, body).await?;
    validate_url(&request.url)?;
    validate_options(&request.options)?;

    let submission = state
        .runner
        .submit_playlist(
            request.url.trim(),
            &request.options,
            request.selected_indices.as_deref(),
        )
        .await?;
    let response = PlaylistAccepted {
        count: submission.download_ids.len(),
        download_ids: submission.download_ids,
        playlist_title: submission.playlist_title,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Metadata for a URL without fetching it (POST /api/info)
///
/// Playlists are answered with a flat entry listing; single items with
/// formats and subtitle tracks.
pub async fn media_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<Json<InfoResponse>, ApiError> {
    let request: InfoRequest = read_json(&state, &headers, body).await?;
    validate_url(&request.url)?;
    let url = request.url.trim();

    let engine = state.engine();
    let upstream = |e: crate::engine::EngineError| ApiError::Upstream(e.to_string());

    if let Some(playlist) = engine.playlist(url).await.map_err(upstream)? {
        let limit = state.config.server.api.max_playlist_entries;
        return Ok(Json(InfoResponse::Playlist(PlaylistInfoResponse::new(
            playlist, limit,
        ))));
    }

    let info = engine.probe(url, None).await.map_err(upstream)?;
    Ok(Json(InfoResponse::Media(Box::new(MediaInfoResponse::from(
        info,
    )))))
}

/// Point-in-time progress (GET /api/progress/{id})
pub async fn get_progress(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.registry.snapshot(&id)?;
    Ok(Json(snapshot))
}

/// Server-sent progress events (GET /api/progress/stream/{id})
///
/// Emits a snapshot every `downloads.stream_interval_ms` and closes after
/// the job reaches a terminal status.
pub async fn progress_stream(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!(job_id = %id, "Progress subscription opened");
    let updates = jobs::subscribe(state.registry.clone(), id, state.config.stream_interval());
    Sse::new(updates.map(|update| Event::default().json_data(update)))
        .keep_alive(KeepAlive::default())
}

/// Restart an errored job under the same id (POST /api/retry/{id})
pub async fn retry_download(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let retry_count = state.runner.retry(&id)?;
    let response = RetryAccepted {
        download_id: id,
        retry_count,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /api/history?limit&offset&search
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state.history.list(&query)?;
    Ok(Json(records))
}

/// DELETE /api/history/{id}
pub async fn delete_history(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let existed = state.history.delete(&id)?;
    debug!(id = %id, existed, "History entry deleted");
    Ok(Json(SuccessResponse::ok()))
}

/// DELETE /api/history/clear
pub async fn clear_history(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let removed = state.history.clear()?;
    Ok(Json(SuccessResponse {
        success: true,
        removed: Some(removed),
    }))
}

/// Start a fresh job from a history entry (POST /api/history/redownload/{id})
pub async fn redownload(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let download_id = state.runner.redownload(&id).map_err(|e| match e {
        JobError::NotFound(_) => ApiError::NotFound("History item not found".to_string()),
        other => other.into(),
    })?;
    info!(history_id = %id, job_id = %download_id, "Redownload accepted");

    Ok((StatusCode::ACCEPTED, Json(DownloadAccepted { download_id })))
}

/// Files in the download directory, newest modified first (GET /api/downloads)
pub async fn list_downloads(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let files = scan_download_dir(&state.config.downloads.dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to list downloads: {e}")))?;
    Ok(Json(files))
}

async fn scan_download_dir(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        let created = metadata.created().unwrap_or(modified);
        files.push(FileEntry {
            filename: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            created: utils::to_utc(created),
            modified: utils::to_utc(modified),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(files)
}

/// Remove one file from the download directory (DELETE /api/delete/{filename})
pub async fn delete_download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = download_path(&state.config.downloads.dir, &filename)
        .ok_or_else(|| ApiError::InvalidPayload("Invalid filename".to_string()))?;

    let missing = || ApiError::NotFound("File not found".to_string());
    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Err(missing()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(ApiError::Internal(format!("Failed to read {filename}: {e}"))),
    }
    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to delete {filename}: {e}")))?;

    info!(filename = %filename, "Download deleted");
    Ok(Json(SuccessResponse::ok()))
}

/// Only bare file names resolve; anything with a directory part is refused.
fn download_path(dir: &Path, filename: &str) -> Option<PathBuf> {
    let name = Path::new(filename);
    name.file_name()
        .is_some_and(|base| base == name.as_os_str())
        .then(|| dir.join(name))
}

/// Extractor names known to the engine, at most 100 (GET /api/supported-sites)
pub async fn supported_sites(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let mut sites = state
        .engine()
        .extractors()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    sites.sort();
    sites.dedup();
    sites.truncate(SUPPORTED_SITES_LIMIT);
    Ok(Json(sites))
}

/// Health check endpoint (GET /health)
///
/// Reports component status, tracked/active job counts and job counters.
/// Returns 503 if the history store cannot be read.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let history_status = match state.history.stats() {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };
    components.insert("history".to_string(), history_status.to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let (status_code, overall_status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        active_jobs: state.registry.active_count(),
        tracked_jobs: state.registry.len(),
        metrics: state.metrics.snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

/// Fallback for unknown routes
pub async fn not_found() -> Result<(), ApiError> {
    Err(ApiError::NotFound("route not found".to_string()))
}
