//! Stored grade files: listing, editing and deletion.

use axum::{
    extract::{Path, State},
    Json,
};
use creo_core::store::{FileDetails, FileUpdate};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::state::AppState;
use crate::storage::remove_stored_file;

/// GET /api/generated-files
pub async fn list_files(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let files = state.store.list_files().await?;
    Ok(Json(json!({ "files": files })))
}

/// GET /api/generated-files/:id
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<FileDetails>> {
    Ok(Json(state.store.get_file(id).await?))
}

/// PUT /api/generated-files/:id
pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<FileUpdate>,
) -> AppResult<Json<Value>> {
    tracing::info!(file_id = id, students = update.students.len(), "updating file");
    let outcome = state.store.update_file(id, update).await?;
    Ok(Json(json!({
        "message": "File updated successfully",
        "updated_students": outcome.updated_students,
        "file_metadata_updated": outcome.file_metadata_updated,
    })))
}

async fn remove_physical(path: Option<&str>) -> bool {
    match path {
        Some(path) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
            remove_stored_file(path).await;
            true
        }
        _ => false,
    }
}

/// DELETE /api/generated-files/:id
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let outcome = state.store.hard_delete(id).await?;
    let physical_file_deleted = remove_physical(outcome.file_path.as_deref()).await;
    tracing::info!(file_id = id, students = outcome.deleted_students, "hard deleted file");
    Ok(Json(json!({
        "message": "File and all associated data deleted successfully",
        "details": {
            "deleted_students": outcome.deleted_students,
            "deleted_files": outcome.deleted_files,
            "physical_file_deleted": physical_file_deleted,
        }
    })))
}

/// DELETE /api/generated-files/:id/soft-delete
pub async fn soft_delete_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    state.store.soft_delete(id).await?;
    tracing::info!(file_id = id, "soft deleted file");
    Ok(Json(json!({ "message": "File marked as deleted successfully" })))
}

/// DELETE /api/generated-files/cleanup-deleted
pub async fn cleanup_deleted(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let outcome = state.store.cleanup_deleted().await?;
    if outcome.files_processed == 0 {
        return Ok(Json(json!({ "message": "No deleted files to cleanup" })));
    }

    let mut physical_files_deleted = 0;
    for path in &outcome.file_paths {
        if remove_physical(Some(path.as_str())).await {
            physical_files_deleted += 1;
        }
    }
    Ok(Json(json!({
        "message": "Cleanup completed successfully",
        "details": {
            "files_processed": outcome.files_processed,
            "students_deleted": outcome.students_deleted,
            "files_deleted": outcome.files_deleted,
            "physical_files_deleted": physical_files_deleted,
        }
    })))
}
