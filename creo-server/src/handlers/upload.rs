//! Spreadsheet uploads from the front end.

use axum::{
    extract::{Multipart, State},
    Json,
};
use creo_core::Record;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::ingest::read_trainees;
use crate::state::AppState;

use super::upload_bytes;

#[derive(Debug, Default, Deserialize)]
pub struct StagedRows {
    #[serde(default)]
    pub rows: Vec<Value>,
}

/// POST /upload/excel: stage parsed rows as JSON, replacing earlier ones.
pub async fn upload_excel(
    State(state): State<AppState>,
    Json(request): Json<StagedRows>,
) -> AppResult<Json<Value>> {
    let path = state.config.staged_rows_path();
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let body = serde_json::to_vec_pretty(&request.rows)
        .map_err(|e| AppError::internal("Failed to stage rows", e))?;
    tokio::fs::write(&path, body).await?;

    tracing::info!(rows = request.rows.len(), path = %path.display(), "staged uploaded rows");
    Ok(Json(json!({
        "message": "Excel data uploaded successfully",
        "rowCount": request.rows.len(),
    })))
}

#[derive(Debug, serde::Serialize)]
pub struct Trainees {
    pub students: Vec<Record>,
}

/// POST /upload/trainee
pub async fn upload_trainee(mut multipart: Multipart) -> AppResult<Json<Trainees>> {
    let bytes = upload_bytes(&mut multipart)
        .await?
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;

    let students = tokio::task::spawn_blocking(move || read_trainees(&bytes))
        .await?
        .map_err(|e| AppError::bad_request(e.to_string()))?;
    tracing::info!(students = students.len(), "read trainee upload");
    Ok(Json(Trainees { students }))
}
