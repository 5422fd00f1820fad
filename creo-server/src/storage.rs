//! Template lookup and listing of generated files on disk.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use creo_core::materialize::safe_file_name;

use crate::error::{AppError, AppResult};

/// Certificate preview shipped with the generated files; never listed.
pub const EXAMPLE_CERTIFICATE: &str = "example.pptx";

/// A file in the generated directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedEntry {
    pub filename: String,
    pub modified: SystemTime,
}

impl GeneratedEntry {
    pub fn timestamp(&self) -> String {
        format_timestamp(self.modified)
    }
}

/// `2024-05-01 14:30:09` in local time.
pub fn format_timestamp(at: SystemTime) -> String {
    DateTime::<Local>::from(at)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Path of a client-named template inside `dir`, which must exist.
pub fn template_path(dir: &Path, requested: &str) -> AppResult<PathBuf> {
    let name = safe_file_name(requested);
    if name.is_empty() {
        return Err(AppError::bad_request("Template name is required"));
    }
    let path = dir.join(&name);
    if !path.is_file() {
        return Err(AppError::not_found(format!("Template not found: {name}")));
    }
    Ok(path)
}

/// Files in `dir` whose name ends with `extension`, newest first.
///
/// A missing directory lists as empty.
pub fn list_generated(dir: &Path, extension: &str) -> AppResult<Vec<GeneratedEntry>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let extension = extension.to_ascii_lowercase();
    let mut entries = Vec::new();
    for item in read_dir {
        let item = item?;
        let metadata = item.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let filename = item.file_name().to_string_lossy().into_owned();
        if !filename.to_ascii_lowercase().ends_with(&extension) {
            continue;
        }
        entries.push(GeneratedEntry {
            filename,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    entries.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(entries)
}

/// Generated certificates, without the example deck.
pub fn list_certificates(dir: &Path) -> AppResult<Vec<GeneratedEntry>> {
    let mut entries = list_generated(dir, ".pptx")?;
    entries.retain(|e| e.filename != EXAMPLE_CERTIFICATE);
    Ok(entries)
}

/// Generated workbooks.
pub fn list_workbooks(dir: &Path) -> AppResult<Vec<GeneratedEntry>> {
    list_generated(dir, ".xlsx")
}

/// Certificates and TESDA workbooks, newest first, for the download history.
pub fn list_history(dir: &Path) -> AppResult<Vec<GeneratedEntry>> {
    let mut entries = list_generated(dir, ".pptx")?;
    entries.extend(
        list_generated(dir, ".xlsx")?
            .into_iter()
            .filter(|e| e.filename.to_ascii_lowercase().contains("tesda")),
    );
    entries.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(entries)
}

/// Remove a stored workbook, tolerating one that is already gone.
pub async fn remove_stored_file(path: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(path, "removed stored file"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path, error = %err, "could not remove stored file"),
    }
}
