//! The three generation modes.

pub mod certificate;
pub mod grades;
pub mod tesda;

pub use grades::{GradeCounts, GradeHeader};

/// Final path component of a client-supplied name, trimmed.
///
/// `.` and `..` reduce to the empty string, so the result never leaves the
/// directory it is joined onto.
pub fn safe_file_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match last {
        "." | ".." => String::new(),
        other => other.to_string(),
    }
}
