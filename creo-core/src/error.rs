//! Error types for the document engine.

use thiserror::Error;

/// Errors raised while opening, mutating or saving template documents.
///
/// Placeholder resolution and numeric coercion never produce one of these;
/// they degrade to empty or original values instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Package error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error in '{part}': {message}")]
    Xml { part: String, message: String },

    #[error("Part '{0}' not found in package")]
    MissingPart(String),

    #[error("Part '{part}' is malformed: {reason}")]
    MalformedPart { part: String, reason: String },

    #[error("Worksheet '{0}' not found")]
    SheetNotFound(String),

    #[error("Invalid cell reference '{0}'")]
    InvalidCellRef(String),

    #[error("Sheet clone failed: {0}")]
    Clone(String),

    #[error("Template has no worksheets")]
    EmptyWorkbook,

    #[error("No records supplied")]
    NoRecords,
}

impl EngineError {
    pub(crate) fn xml(part: impl Into<String>, err: impl std::fmt::Display) -> Self {
        EngineError::Xml {
            part: part.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(part: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::MalformedPart {
            part: part.into(),
            reason: reason.into(),
        }
    }

    /// True for failures caused by the caller's input rather than the engine.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::SheetNotFound(_)
                | EngineError::InvalidCellRef(_)
                | EngineError::EmptyWorkbook
                | EngineError::NoRecords
                | EngineError::Zip(_)
                | EngineError::MissingPart(_)
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
