//! Grade workbook generation and regeneration from stored rows.

use std::path::PathBuf;

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use creo_core::materialize::grades::{self, GradeHeader};
use creo_core::ooxml::{Workbook, XLSX_MIME};
use creo_core::store::{
    parse_immersion_date, FileDetails, NewGeneratedFile, NewStudentRow, OperationKind,
    GRADES_FILE_TYPE,
};
use creo_core::Record;
use serde::Deserialize;
use serde_json::json;

use crate::downloads::{DownloadEntry, DownloadKind};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::{attachment, local_now};

#[derive(Debug, Default, Deserialize)]
pub struct GradesRequest {
    #[serde(default)]
    pub students: Vec<Record>,
}

fn grades_template(state: &AppState) -> AppResult<PathBuf> {
    let path = state.config.template_dir.join(&state.config.grades_template);
    if !path.is_file() {
        return Err(AppError::internal("Template file not found", path.display()));
    }
    Ok(path)
}

struct Generated {
    filename: String,
    bytes: Vec<u8>,
}

/// POST /api/generate/excel
///
/// The workbook is returned even when it cannot be recorded.
pub async fn generate_excel(
    State(state): State<AppState>,
    Json(request): Json<GradesRequest>,
) -> AppResult<Response> {
    let students = request.students;
    if students.is_empty() {
        return Err(AppError::bad_request("No student data received"));
    }
    let template = grades_template(&state)?;
    let header = GradeHeader::from_first_record(&students);

    let generated = {
        let header = header.clone();
        let students = students.clone();
        tokio::task::spawn_blocking(move || -> AppResult<Generated> {
            let scratch = tempfile::tempdir()?;
            let path = grades::materialize(
                &template,
                &header,
                &students,
                scratch.path(),
                local_now(),
            )?;
            let bytes = std::fs::read(&path)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(Generated { filename, bytes })
        })
        .await??
    };

    let file = NewGeneratedFile {
        filename: generated.filename.clone(),
        original_filename: Some(generated.filename.clone()),
        file_type: GRADES_FILE_TYPE.to_string(),
        batch: header.batch.clone(),
        school: header.school.clone(),
        date_of_immersion: parse_immersion_date(&header.date_of_immersion),
        total_students: i32::try_from(students.len()).unwrap_or(i32::MAX),
        file_path: None,
        file_size: i64::try_from(generated.bytes.len()).ok(),
    };
    let rows = students
        .iter()
        .map(|record| NewStudentRow::from_record(record, &file))
        .collect();

    match state.store.record_generation(file, rows).await {
        Ok(file_id) => {
            let timestamp = local_now().format("%Y-%m-%d %H:%M:%S").to_string();
            state.downloads.record(
                DownloadEntry::generated(DownloadKind::Grades, &generated.filename, timestamp)
                    .with_file_id(file_id),
            );
        }
        Err(err) => {
            tracing::error!(
                file = %generated.filename,
                error = %err,
                "could not record grade workbook"
            );
        }
    }

    Ok(attachment(&generated.filename, XLSX_MIME, generated.bytes))
}

fn stored_header(details: &FileDetails) -> GradeHeader {
    GradeHeader {
        batch: details.file.batch.clone().unwrap_or_default(),
        school: details.file.school.clone().unwrap_or_default(),
        date_of_immersion: details
            .file
            .date_of_immersion
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
    }
}

/// GET /api/generated-files/:id/download
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let details = state.store.get_file(id).await?;
    let template = grades_template(&state)?;
    let header = stored_header(&details);
    // Details list students by name; the workbook keeps the order they were
    // first generated in.
    let mut students: Vec<_> = details.students.iter().collect();
    students.sort_by_key(|s| s.id);
    let records: Vec<Record> = students.into_iter().map(|s| s.to_record()).collect();

    let bytes = tokio::task::spawn_blocking(move || -> AppResult<Vec<u8>> {
        let mut wb = Workbook::open(&template)?;
        grades::fill_grade_workbook(&mut wb, &header, &records)?;
        Ok(wb.to_bytes()?)
    })
    .await??;

    state
        .store
        .log_operation(id, OperationKind::Download, json!({}))
        .await?;
    tracing::info!(file_id = id, file = %details.file.filename, "regenerated grade workbook");
    Ok(attachment(&details.file.filename, XLSX_MIME, bytes))
}
