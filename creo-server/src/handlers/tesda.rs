//! TESDA report generation.

use std::io::Write;

use axum::{
    extract::{Multipart, State},
    response::Response,
    Json,
};
use creo_core::materialize::tesda;
use creo_core::ooxml::{Workbook, XLSX_MIME};
use creo_core::Record;
use serde::Deserialize;

use crate::downloads::{DownloadEntry, DownloadKind};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage;

use super::certificates::GeneratedFiles;
use super::{attachment, local_now, upload_bytes};

#[derive(Debug, Default, Deserialize)]
pub struct TesdaRequest {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<Record>>,
}

async fn generate(state: &AppState, request: TesdaRequest) -> AppResult<String> {
    let (template, records) = match (request.template, request.data) {
        (Some(template), Some(records)) if !template.trim().is_empty() && !records.is_empty() => {
            (template, records)
        }
        _ => return Err(AppError::bad_request("Missing template or data")),
    };
    let template = storage::template_path(&state.config.template_dir, &template)?;
    let out_dir = state.config.generated_dir.clone();
    let cloner = state.cloner.clone();

    let filename = tokio::task::spawn_blocking(move || {
        tesda::materialize(&template, &records, &out_dir, cloner.as_ref(), local_now())
    })
    .await??;
    Ok(filename)
}

/// POST /generate/tesda
pub async fn generate_tesda(
    State(state): State<AppState>,
    Json(request): Json<TesdaRequest>,
) -> AppResult<Json<GeneratedFiles>> {
    let filename = generate(&state, request).await?;
    Ok(Json(GeneratedFiles {
        files: vec![filename],
    }))
}

/// POST /api/generate-tesda
pub async fn api_generate_tesda(
    State(state): State<AppState>,
    Json(request): Json<TesdaRequest>,
) -> AppResult<Json<GeneratedFiles>> {
    let filename = generate(&state, request).await?;
    let path = state.config.generated_dir.join(&filename);
    if let Ok(metadata) = tokio::fs::metadata(&path).await {
        let timestamp = metadata
            .modified()
            .map(storage::format_timestamp)
            .unwrap_or_default();
        state.downloads.record(DownloadEntry::generated(
            DownloadKind::Tesda,
            &filename,
            timestamp,
        ));
    }
    Ok(Json(GeneratedFiles {
        files: vec![filename],
    }))
}

/// GET /api/tesda
pub async fn list_tesda(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let entries = storage::list_workbooks(&state.config.generated_dir)?;
    Ok(Json(entries.into_iter().map(|e| e.filename).collect()))
}

/// `tesda_record_20240501-143009.xlsx`
pub fn record_filename(now: chrono::NaiveDateTime) -> String {
    format!("tesda_record_{}.xlsx", now.format("%Y%m%d-%H%M%S"))
}

/// POST /api/generate: re-save an uploaded workbook into the generated
/// directory and send it back.
pub async fn resave_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let bytes = upload_bytes(&mut multipart)
        .await?
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    let out_dir = state.config.generated_dir.clone();
    let filename = record_filename(local_now());

    let saved = {
        let filename = filename.clone();
        tokio::task::spawn_blocking(move || -> AppResult<Vec<u8>> {
            let mut upload = tempfile::Builder::new()
                .prefix("upload_")
                .suffix(".xlsx")
                .tempfile()?;
            upload.write_all(&bytes)?;
            upload.flush()?;

            let mut wb = Workbook::open(upload.path())?;
            let out = wb.to_bytes()?;
            std::fs::write(out_dir.join(&filename), &out)?;
            Ok(out)
        })
        .await??
    };

    let timestamp = local_now().format("%Y-%m-%d %H:%M:%S").to_string();
    state
        .downloads
        .record(DownloadEntry::generated(DownloadKind::Tesda, &filename, timestamp));
    tracing::info!(file = %filename, "re-saved uploaded workbook");
    Ok(attachment(&filename, XLSX_MIME, saved))
}
