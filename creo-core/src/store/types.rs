//! Stored grade files, their students and the operations log.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::coerce::to_number;
use crate::record::{FieldValue, Record};

use super::StoreError;

/// Score columns of a student row, in sheet order.
pub const SCORE_FIELDS: [&str; 23] = [
    "over_all", "WI", "CO", "5S", "BO", "CBO", "SDG", "OHSA", "WE", "UJC", "ISO", "PO", "HR",
    "DS", "WI2", "ELEX", "CM", "SPC", "PROD", "PerDev", "Supp", "AppDev", "Tech",
];

/// `file_type` of grade workbooks.
pub const GRADES_FILE_TYPE: &str = "grades";

/// Parse a `YYYY-MM-DD` immersion date. Anything else is `None`.
pub fn parse_immersion_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Active,
    Deleted,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Deleted => "deleted",
        }
    }
}

impl TryFrom<String> for FileStatus {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(FileStatus::Active),
            "deleted" => Ok(FileStatus::Deleted),
            other => Err(StoreError::Serialization(format!("unknown file status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Download,
    HardDelete,
    SoftDelete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Download => "download",
            OperationKind::HardDelete => "hard_delete",
            OperationKind::SoftDelete => "soft_delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a stored grade workbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct GeneratedFile {
    pub id: i64,
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_type: String,
    pub batch: Option<String>,
    pub school: Option<String>,
    pub date_of_immersion: Option<NaiveDate>,
    pub total_students: i32,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    #[cfg_attr(feature = "postgres", sqlx(try_from = "String"))]
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A listed file with its student aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedFileSummary {
    #[serde(flatten)]
    pub file: GeneratedFile,
    pub student_count: i64,
    /// Mean `over_all` of the file's students, when any has one.
    pub average_performance: Option<f64>,
}

/// Identity columns and scores shared by inserts and updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudentFields {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub strand: String,
    pub department: String,
    /// One entry per [`SCORE_FIELDS`] name.
    #[serde(flatten)]
    pub scores: BTreeMap<String, Option<f64>>,
}

impl StudentFields {
    /// Columns of a student record. Scores go through numeric coercion;
    /// values that are still not numbers are stored as `NULL`.
    pub fn from_record(record: &Record) -> Self {
        let scores = SCORE_FIELDS
            .iter()
            .map(|field| {
                let value = to_number(record.get(field));
                let score = value.as_f64();
                if score.is_none() && !value.is_empty() {
                    tracing::warn!(field, value = %value, "non-numeric score stored as NULL");
                }
                (field.to_string(), score)
            })
            .collect();

        Self {
            last_name: record.text("last_name"),
            first_name: record.text("first_name"),
            middle_name: record.text("middle_name"),
            strand: record.text("strand"),
            department: record.text("department"),
            scores,
        }
    }

    pub fn score(&self, field: &str) -> Option<f64> {
        self.scores.get(field).copied().flatten()
    }
}

/// Student row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRow {
    pub id: i64,
    pub file_id: i64,
    #[serde(flatten)]
    pub fields: StudentFields,
    pub school: String,
    pub batch: String,
    pub date_of_immersion: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentRow {
    /// The row as a grade-sheet record.
    pub fn to_record(&self) -> Record {
        let f = &self.fields;
        let mut record = Record::new()
            .with("last_name", f.last_name.as_str())
            .with("first_name", f.first_name.as_str())
            .with("middle_name", f.middle_name.as_str())
            .with("strand", f.strand.as_str())
            .with("department", f.department.as_str())
            .with("school", self.school.as_str())
            .with("batch", self.batch.as_str());
        if let Some(date) = self.date_of_immersion {
            record.insert("date_of_immersion", date.to_string());
        }
        for field in SCORE_FIELDS {
            record.insert(field, FieldValue::from(f.score(field)));
        }
        record
    }
}

/// A grade workbook about to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGeneratedFile {
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_type: String,
    pub batch: String,
    pub school: String,
    pub date_of_immersion: Option<NaiveDate>,
    pub total_students: i32,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
}

/// A student row about to be inserted with its file.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStudentRow {
    pub fields: StudentFields,
    pub school: String,
    pub batch: String,
    pub date_of_immersion: Option<NaiveDate>,
}

impl NewStudentRow {
    /// School, batch and date come from the file, not the record.
    pub fn from_record(record: &Record, file: &NewGeneratedFile) -> Self {
        Self {
            fields: StudentFields::from_record(record),
            school: file.school.clone(),
            batch: file.batch.clone(),
            date_of_immersion: file.date_of_immersion,
        }
    }
}

/// A file with its students, ordered by last then first name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDetails {
    pub file: GeneratedFile,
    pub students: Vec<StudentRow>,
}

/// Body of an edit: optional header fields and the students to rewrite.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileUpdate {
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default)]
    pub school: Option<String>,
    #[serde(default)]
    pub date_of_immersion: Option<String>,
    #[serde(default)]
    pub students: Vec<Record>,
}

/// Header changes of a [`FileUpdate`]; blank values leave a column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataChange {
    pub batch: Option<String>,
    pub school: Option<String>,
    /// `Some(None)` clears the date (an unparseable date was sent).
    pub date_of_immersion: Option<Option<NaiveDate>>,
}

impl MetadataChange {
    pub fn is_empty(&self) -> bool {
        self.batch.is_none() && self.school.is_none() && self.date_of_immersion.is_none()
    }
}

/// One student of a [`FileUpdate`] addressed by row id.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentUpdate {
    pub id: i64,
    pub fields: StudentFields,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn student_id(record: &Record) -> Option<i64> {
    match record.get("id")? {
        FieldValue::Integer(id) if *id > 0 => Some(*id),
        FieldValue::Text(s) => s.trim().parse().ok().filter(|id| *id > 0),
        _ => None,
    }
}

impl FileUpdate {
    pub fn metadata(&self) -> MetadataChange {
        MetadataChange {
            batch: non_blank(&self.batch),
            school: non_blank(&self.school),
            date_of_immersion: non_blank(&self.date_of_immersion)
                .map(|raw| parse_immersion_date(&raw)),
        }
    }

    /// Students carrying a row id. Students without one are logged and
    /// skipped.
    pub fn student_updates(&self) -> Vec<StudentUpdate> {
        self.students
            .iter()
            .filter_map(|record| match student_id(record) {
                Some(id) => Some(StudentUpdate {
                    id,
                    fields: StudentFields::from_record(record),
                }),
                None => {
                    tracing::warn!(
                        first_name = %record.text("first_name"),
                        last_name = %record.text("last_name"),
                        "student without id in update request"
                    );
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub updated_students: usize,
    pub file_metadata_updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HardDeleteOutcome {
    pub deleted_students: u64,
    pub deleted_files: u64,
    /// Stored path of the workbook, for the caller to remove.
    #[serde(skip)]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
    pub files_processed: usize,
    pub students_deleted: u64,
    pub files_deleted: u64,
    #[serde(skip)]
    pub file_paths: Vec<String>,
}

/// An entry of the operations log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationLogEntry {
    pub file_id: i64,
    pub operation_type: OperationKind,
    pub operation_details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn student_fields_coerce_scores() {
        let record: Record = serde_json::from_value(json!({
            "last_name": "Cruz",
            "first_name": "Ana",
            "department": "IT",
            "over_all": "95",
            "5S": 88.5,
            "WI": "n/a",
            "CO": ""
        }))
        .unwrap();
        let fields = StudentFields::from_record(&record);
        assert_eq!(fields.last_name, "Cruz");
        assert_eq!(fields.middle_name, "");
        assert_eq!(fields.score("over_all"), Some(95.0));
        assert_eq!(fields.score("5S"), Some(88.5));
        assert_eq!(fields.score("WI"), None);
        assert_eq!(fields.score("CO"), None);
        assert_eq!(fields.scores.len(), SCORE_FIELDS.len());
    }

    #[test]
    fn student_row_round_trips_into_a_record() {
        let mut fields = StudentFields::from_record(&Record::new().with("department", "PROD"));
        fields.scores.insert("PROD".into(), Some(77.0));
        let row = StudentRow {
            id: 1,
            file_id: 2,
            fields,
            school: "Rizal High".into(),
            batch: "Batch 7".into(),
            date_of_immersion: NaiveDate::from_ymd_opt(2024, 5, 1),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let record = row.to_record();
        assert_eq!(record.text("department"), "PROD");
        assert_eq!(record.text("date_of_immersion"), "2024-05-01");
        assert_eq!(record.get("PROD"), Some(&FieldValue::Float(77.0)));
        assert_eq!(record.get("Tech"), Some(&FieldValue::Empty));
    }

    #[test]
    fn update_body_splits_metadata_and_students() {
        let update: FileUpdate = serde_json::from_value(json!({
            "batch": "Batch 8",
            "school": "",
            "date_of_immersion": "05/01/2024",
            "students": [
                {"id": 4, "last_name": "Cruz", "over_all": "90"},
                {"id": "5", "last_name": "Lim"},
                {"last_name": "No Id"}
            ]
        }))
        .unwrap();

        let meta = update.metadata();
        assert_eq!(meta.batch.as_deref(), Some("Batch 8"));
        assert_eq!(meta.school, None);
        assert_eq!(meta.date_of_immersion, Some(None));

        let students = update.student_updates();
        assert_eq!(students.iter().map(|s| s.id).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(students[0].fields.score("over_all"), Some(90.0));
    }

    #[test]
    fn dates_parse_strictly() {
        assert_eq!(
            parse_immersion_date("2024-05-01"),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(parse_immersion_date("May 1"), None);
    }

    #[test]
    fn summaries_serialize_flat() {
        let now = Utc::now();
        let summary = GeneratedFileSummary {
            file: GeneratedFile {
                id: 1,
                filename: "a.xlsx".into(),
                original_filename: Some("a.xlsx".into()),
                file_type: GRADES_FILE_TYPE.into(),
                batch: None,
                school: None,
                date_of_immersion: None,
                total_students: 2,
                file_path: None,
                file_size: Some(10),
                status: FileStatus::Active,
                created_at: now,
                updated_at: now,
            },
            student_count: 2,
            average_performance: Some(91.5),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["filename"], "a.xlsx");
        assert_eq!(value["status"], "active");
        assert_eq!(value["student_count"], 2);
        assert_eq!(value["average_performance"], 91.5);
    }
}
