//! Worksheet title sanitizing and de-duplication.

use std::collections::HashSet;

/// Hard limit imposed by spreadsheet applications.
pub const MAX_SHEET_TITLE_LEN: usize = 31;

const FORBIDDEN_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Title used when a candidate is blank.
const BLANK_TITLE: &str = "Row";

/// Make a candidate usable as a worksheet title.
///
/// Trims, substitutes `Row` for blanks, replaces `[ ] : * ? / \` with `-`
/// and truncates to [`MAX_SHEET_TITLE_LEN`] characters.
pub fn sanitize_sheet_title(candidate: &str) -> String {
    let trimmed = candidate.trim();
    let base = if trimmed.is_empty() {
        BLANK_TITLE
    } else {
        trimmed
    };

    let title: String = base
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '-' } else { c })
        .take(MAX_SHEET_TITLE_LEN)
        .collect();

    if title.is_empty() {
        BLANK_TITLE.to_string()
    } else {
        title
    }
}

/// Titles already used in one output workbook.
///
/// Spreadsheet applications compare sheet names case-insensitively, so the
/// registry does too.
#[derive(Debug, Default)]
pub struct SheetTitleRegistry {
    used: HashSet<String>,
}

impl SheetTitleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, title: &str) -> bool {
        self.used.contains(&title.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Sanitize `candidate`, make it unique and record it.
    ///
    /// Collisions get ` (2)`, ` (3)`, ... with the base shortened so the
    /// result never exceeds [`MAX_SHEET_TITLE_LEN`] characters.
    pub fn register(&mut self, candidate: &str) -> String {
        let base = sanitize_sheet_title(candidate);
        let mut title = base.clone();
        let mut n = 2u32;

        while self.contains(&title) {
            let suffix = format!(" ({n})");
            let room = MAX_SHEET_TITLE_LEN.saturating_sub(suffix.chars().count());
            let stem: String = base.chars().take(room).collect();
            title = format!("{stem}{suffix}");
            n += 1;
        }

        self.used.insert(title.to_lowercase());
        title
    }
}
