//! Recent-downloads log shared by every request.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Path under which generated files are served.
pub const GENERATED_URL_PREFIX: &str = "/static/generated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    Certificate,
    Tesda,
    Grades,
}

impl DownloadKind {
    /// Kind of a generated file, judged by its extension.
    pub fn of_filename(filename: &str) -> Self {
        if filename.to_ascii_lowercase().ends_with(".pptx") {
            DownloadKind::Certificate
        } else {
            DownloadKind::Tesda
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadEntry {
    #[serde(rename = "type")]
    pub kind: DownloadKind,
    pub filename: String,
    pub timestamp: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
}

impl DownloadEntry {
    /// Entry for a file in the generated directory.
    pub fn generated(kind: DownloadKind, filename: &str, timestamp: String) -> Self {
        Self {
            kind,
            filename: filename.to_string(),
            timestamp,
            url: format!("{GENERATED_URL_PREFIX}/{filename}"),
            file_id: None,
        }
    }

    pub fn with_file_id(mut self, id: i64) -> Self {
        self.file_id = Some(id);
        self
    }
}

/// Newest-first log holding at most `capacity` entries.
#[derive(Debug)]
pub struct DownloadLog {
    capacity: usize,
    entries: Mutex<VecDeque<DownloadEntry>>,
}

impl DownloadLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<DownloadEntry>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, entry: DownloadEntry) {
        let mut entries = self.lock();
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    /// Record unless an entry with the same filename exists. Returns whether
    /// it was added.
    pub fn record_unique(&self, entry: DownloadEntry) -> bool {
        let mut entries = self.lock();
        if entries.iter().any(|e| e.filename == entry.filename) {
            return false;
        }
        entries.push_front(entry);
        entries.truncate(self.capacity);
        true
    }

    pub fn snapshot(&self) -> Vec<DownloadEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DownloadEntry {
        DownloadEntry::generated(DownloadKind::of_filename(name), name, "now".into())
    }

    #[test]
    fn newest_first_and_bounded() {
        let log = DownloadLog::new(2);
        log.record(entry("a.pptx"));
        log.record(entry("b.xlsx"));
        log.record(entry("c.xlsx"));

        let names: Vec<_> = log.snapshot().into_iter().map(|e| e.filename).collect();
        assert_eq!(names, ["c.xlsx", "b.xlsx"]);
    }

    #[test]
    fn unique_records_skip_duplicates() {
        let log = DownloadLog::new(10);
        assert!(log.record_unique(entry("a.pptx")));
        assert!(!log.record_unique(entry("a.pptx")));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn entries_serialize_with_type_and_url() {
        let value = serde_json::to_value(entry("Ana_Certificate.pptx").with_file_id(3)).unwrap();
        assert_eq!(value["type"], "certificate");
        assert_eq!(value["url"], "/static/generated/Ana_Certificate.pptx");
        assert_eq!(value["file_id"], 3);

        let value = serde_json::to_value(entry("TESDA.xlsx")).unwrap();
        assert_eq!(value["type"], "tesda");
        assert!(value.get("file_id").is_none());
    }
}
