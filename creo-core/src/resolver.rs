//! Placeholder resolution.
//!
//! Replaces `{KEY}` and `{{KEY}}` markers in a text fragment with values from
//! a [`Record`]. A [`MappingTable`] can redirect a key to another column, and
//! a contextual entry picks the column based on the schooling level mentioned
//! in the fragment itself:
//!
//! ```text
//! "YEAR LAST ATTENDED (ELEMENTARY): {YLA}"
//!        │                  │
//!        │                  └── context = ELEMENTARY
//!        └───────────────────── trigger phrase present
//!
//! mapping["YLA"] = { ELEMENTARY: "elem_col", DEFAULT: "def_col" }
//! → record["elem_col"]
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// `{{KEY}}` is tried before `{KEY}` so double-braced markers are consumed whole.
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}|\{([^{}]+)\}").unwrap());

/// Phrase that enables schooling-context detection for a fragment.
const CONTEXT_TRIGGER: &str = "YEAR LAST ATTENDED";

/// Context tag used when no specific context applies.
pub const DEFAULT_CONTEXT: &str = "DEFAULT";

/// Schooling level a "year last attended" field refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchoolingContext {
    Elementary,
    Secondary,
    Tertiary,
}

impl SchoolingContext {
    /// Key used for this context inside a contextual mapping entry.
    pub fn tag(self) -> &'static str {
        match self {
            SchoolingContext::Elementary => "ELEMENTARY",
            SchoolingContext::Secondary => "SECONDARY",
            SchoolingContext::Tertiary => "TERTIARY",
        }
    }
}

/// Evaluated top to bottom; first match wins.
const CONTEXT_RULES: &[(&str, SchoolingContext)] = &[
    ("ELEMENTARY", SchoolingContext::Elementary),
    ("SECONDARY", SchoolingContext::Secondary),
    ("TERTIARY", SchoolingContext::Tertiary),
];

/// Detect the schooling context of a whole fragment.
pub fn detect_context(text: &str) -> Option<SchoolingContext> {
    let upper = text.to_uppercase();
    if !upper.contains(CONTEXT_TRIGGER) {
        return None;
    }
    CONTEXT_RULES
        .iter()
        .find(|(word, _)| upper.contains(word))
        .map(|(_, ctx)| *ctx)
}

/// Where a placeholder key takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingEntry {
    /// A plain column name.
    Field(String),
    /// Column per context tag, with an optional `DEFAULT` entry.
    Contextual(BTreeMap<String, String>),
}

/// Placeholder key → data source column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingTable(BTreeMap<String, MappingEntry>);

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_field(&mut self, key: impl Into<String>, column: impl Into<String>) {
        self.0.insert(key.into(), MappingEntry::Field(column.into()));
    }

    pub fn insert_contextual<I, K, V>(&mut self, key: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.0.insert(key.into(), MappingEntry::Contextual(columns));
    }

    pub fn get(&self, key: &str) -> Option<&MappingEntry> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column a key reads from. Unmapped keys are their own column.
    pub fn column_for<'a>(&'a self, key: &'a str, context: Option<SchoolingContext>) -> &'a str {
        match self.0.get(key) {
            None => key,
            Some(MappingEntry::Field(column)) => column,
            Some(MappingEntry::Contextual(by_context)) => context
                .and_then(|ctx| by_context.get(ctx.tag()))
                .filter(|column| !column.is_empty())
                .or_else(|| by_context.get(DEFAULT_CONTEXT))
                .filter(|column| !column.is_empty())
                .map(String::as_str)
                .unwrap_or(key),
        }
    }
}

/// True when a fragment may hold a marker and is worth resolving.
pub fn has_marker(text: &str) -> bool {
    text.contains('{') && text.contains('}')
}

/// Substitute every marker in `text`.
///
/// Never fails: unknown keys read the column of the same name, missing
/// columns render as the empty string. Substituted values are not rescanned.
pub fn resolve(text: &str, mapping: &MappingTable, record: &Record) -> String {
    if !has_marker(text) {
        return text.to_string();
    }

    let context = detect_context(text);
    MARKER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let key = match (caps.get(1), caps.get(2)) {
                (Some(double), _) => double.as_str().trim(),
                (None, Some(single)) => single.as_str(),
                (None, None) => return String::new(),
            };
            record.text(mapping.column_for(key, context))
        })
        .into_owned()
}
