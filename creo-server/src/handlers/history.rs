//! Download history: files on disk and the in-memory recent-downloads log.

use axum::{extract::State, Json};
use creo_core::materialize::safe_file_name;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::downloads::{DownloadEntry, DownloadKind};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::{self, format_timestamp};

/// GET /api/download-history
pub async fn download_history(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<DownloadEntry>>> {
    let entries = storage::list_history(&state.config.generated_dir)?;
    let history = entries
        .iter()
        .map(|e| {
            let kind = DownloadKind::of_filename(&e.filename);
            DownloadEntry::generated(kind, &e.filename, e.timestamp())
        })
        .collect();
    Ok(Json(history))
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackDownload {
    #[serde(default)]
    pub filename: Option<String>,
}

/// POST /api/download-history
pub async fn track_download(
    State(state): State<AppState>,
    Json(request): Json<TrackDownload>,
) -> AppResult<Json<Value>> {
    let filename = request
        .filename
        .map(|f| safe_file_name(&f))
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing filename"))?;

    let path = state.config.generated_dir.join(&filename);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(AppError::not_found("File does not exist")),
    };

    let timestamp = metadata.modified().map(format_timestamp).unwrap_or_default();
    let added = state.downloads.record_unique(DownloadEntry::generated(
        DownloadKind::of_filename(&filename),
        &filename,
        timestamp,
    ));
    tracing::debug!(file = %filename, added, "tracked download");
    Ok(Json(json!({ "success": true })))
}

/// GET /api/recent-downloads
pub async fn recent_downloads(State(state): State<AppState>) -> Json<Vec<DownloadEntry>> {
    Json(state.downloads.snapshot())
}
