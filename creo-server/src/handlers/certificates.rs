//! Certificate generation and listing.

use axum::{extract::State, Json};
use creo_core::materialize::certificate;
use creo_core::Record;
use serde::Serialize;

use crate::downloads::{DownloadEntry, DownloadKind};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage;

use super::local_now;

const TEMPLATE_FIELD: &str = "templatePath";
const FILENAME_FIELD: &str = "filename";

#[derive(Debug, Serialize)]
pub struct GeneratedFiles {
    pub files: Vec<String>,
}

/// Fill the certificate deck named by `templatePath` with the request body.
async fn generate(state: &AppState, body: Record) -> AppResult<String> {
    let requested = body.text(TEMPLATE_FIELD);
    if requested.trim().is_empty() {
        return Err(AppError::bad_request("templatePath is required"));
    }
    let template = storage::template_path(&state.config.template_dir, &requested)?;
    let out_dir = state.config.generated_dir.clone();

    let filename = tokio::task::spawn_blocking(move || {
        let custom = body.text(FILENAME_FIELD);
        let custom = Some(custom.as_str()).filter(|c| !c.trim().is_empty());
        certificate::materialize(&template, &body, custom, &out_dir)
    })
    .await??;
    Ok(filename)
}

/// POST /generate/certificates
pub async fn generate_certificates(
    State(state): State<AppState>,
    Json(body): Json<Record>,
) -> AppResult<Json<GeneratedFiles>> {
    let filename = generate(&state, body).await?;
    Ok(Json(GeneratedFiles {
        files: vec![filename],
    }))
}

/// POST /api/generate-certificates
pub async fn api_generate_certificates(
    State(state): State<AppState>,
    Json(body): Json<Record>,
) -> AppResult<Json<GeneratedFiles>> {
    let filename = generate(&state, body).await?;
    let timestamp = local_now().format("%Y-%m-%d %H:%M:%S").to_string();
    state.downloads.record(DownloadEntry::generated(
        DownloadKind::Certificate,
        &filename,
        timestamp,
    ));
    Ok(Json(GeneratedFiles {
        files: vec![filename],
    }))
}

/// GET /api/certificates
pub async fn list_certificates(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let entries = storage::list_certificates(&state.config.generated_dir)?;
    Ok(Json(entries.into_iter().map(|e| e.filename).collect()))
}
