//! Route handlers, one module per area of the API.

pub mod certificates;
pub mod files;
pub mod grades;
pub mod health;
pub mod history;
pub mod tesda;
pub mod upload;

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;

use crate::error::{AppError, AppResult};

/// Name of the multipart field carrying an uploaded workbook.
pub const UPLOAD_FIELD: &str = "file";

/// A downloadable document response.
pub fn attachment(filename: &str, mime: &'static str, bytes: Vec<u8>) -> Response {
    let safe: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{safe}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Bytes of the `file` field, if the form has one.
pub async fn upload_bytes(multipart: &mut Multipart) -> AppResult<Option<Bytes>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid upload: {e}")))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(format!("Invalid upload: {e}")))?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

pub(crate) fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}
