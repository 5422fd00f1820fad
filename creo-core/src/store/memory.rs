use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::{
    CleanupOutcome, FileDetails, FileStatus, FileUpdate, GeneratedFile, GeneratedFileSummary,
    GenerationStore, HardDeleteOutcome, NewGeneratedFile, NewStudentRow, OperationKind,
    OperationLogEntry, StoreError, StoreResult, StudentRow, UpdateOutcome,
};

#[derive(Debug, Default)]
struct Tables {
    last_file_id: i64,
    last_student_id: i64,
    files: BTreeMap<i64, GeneratedFile>,
    students: BTreeMap<i64, StudentRow>,
    operations: Vec<OperationLogEntry>,
}

impl Tables {
    fn log(&mut self, file_id: i64, kind: OperationKind, details: serde_json::Value) {
        self.operations.push(OperationLogEntry {
            file_id,
            operation_type: kind,
            operation_details: details,
            created_at: Utc::now(),
        });
    }

    fn active_file(&self, id: i64) -> StoreResult<&GeneratedFile> {
        self.files
            .get(&id)
            .filter(|f| f.status == FileStatus::Active)
            .ok_or(StoreError::NotFound(id))
    }

    /// Drop the students of `file_id`; returns how many went.
    fn remove_students(&mut self, file_id: i64) -> u64 {
        let before = self.students.len();
        self.students.retain(|_, s| s.file_id != file_id);
        (before - self.students.len()) as u64
    }
}

/// In-memory [`GenerationStore`] for tests and database-less deployments.
///
/// Each operation runs under one write lock, so it is applied whole or not
/// at all.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the operations log, oldest first.
    pub fn operations(&self) -> StoreResult<Vec<OperationLogEntry>> {
        let tables = self.read()?;
        Ok(tables.operations.clone())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn record_generation(
        &self,
        file: NewGeneratedFile,
        students: Vec<NewStudentRow>,
    ) -> StoreResult<i64> {
        let mut tables = self.write()?;
        let now = Utc::now();

        tables.last_file_id += 1;
        let file_id = tables.last_file_id;
        tables.files.insert(
            file_id,
            GeneratedFile {
                id: file_id,
                filename: file.filename,
                original_filename: file.original_filename,
                file_type: file.file_type,
                batch: Some(file.batch),
                school: Some(file.school),
                date_of_immersion: file.date_of_immersion,
                total_students: file.total_students,
                file_path: file.file_path,
                file_size: file.file_size,
                status: FileStatus::Active,
                created_at: now,
                updated_at: now,
            },
        );

        let count = students.len();
        for student in students {
            tables.last_student_id += 1;
            let id = tables.last_student_id;
            tables.students.insert(
                id,
                StudentRow {
                    id,
                    file_id,
                    fields: student.fields,
                    school: student.school,
                    batch: student.batch,
                    date_of_immersion: student.date_of_immersion,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        tables.log(file_id, OperationKind::Create, json!({ "students_count": count }));
        Ok(file_id)
    }

    async fn list_files(&self) -> StoreResult<Vec<GeneratedFileSummary>> {
        let tables = self.read()?;
        let mut summaries: Vec<GeneratedFileSummary> = tables
            .files
            .values()
            .filter(|f| f.status == FileStatus::Active)
            .map(|file| {
                let students: Vec<&StudentRow> = tables
                    .students
                    .values()
                    .filter(|s| s.file_id == file.id)
                    .collect();
                let scores: Vec<f64> = students
                    .iter()
                    .filter_map(|s| s.fields.score("over_all"))
                    .collect();
                let average_performance = (!scores.is_empty())
                    .then(|| scores.iter().sum::<f64>() / scores.len() as f64);
                GeneratedFileSummary {
                    file: file.clone(),
                    student_count: students.len() as i64,
                    average_performance,
                }
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.file
                .created_at
                .cmp(&a.file.created_at)
                .then(b.file.id.cmp(&a.file.id))
        });
        Ok(summaries)
    }

    async fn get_file(&self, id: i64) -> StoreResult<FileDetails> {
        let tables = self.read()?;
        let file = tables.active_file(id)?.clone();
        let mut students: Vec<StudentRow> = tables
            .students
            .values()
            .filter(|s| s.file_id == id)
            .cloned()
            .collect();
        students.sort_by(|a, b| {
            (&a.fields.last_name, &a.fields.first_name)
                .cmp(&(&b.fields.last_name, &b.fields.first_name))
        });
        Ok(FileDetails { file, students })
    }

    async fn update_file(&self, id: i64, update: FileUpdate) -> StoreResult<UpdateOutcome> {
        let mut tables = self.write()?;
        tables.active_file(id)?;
        let now = Utc::now();

        let meta = update.metadata();
        let file_metadata_updated = !meta.is_empty();
        if let Some(file) = tables.files.get_mut(&id) {
            if let Some(batch) = meta.batch {
                file.batch = Some(batch);
            }
            if let Some(school) = meta.school {
                file.school = Some(school);
            }
            if let Some(date) = meta.date_of_immersion {
                file.date_of_immersion = date;
            }
            if file_metadata_updated {
                file.updated_at = now;
            }
        }

        let mut updated_students = 0;
        for student in update.student_updates() {
            match tables.students.get_mut(&student.id) {
                Some(row) if row.file_id == id => {
                    row.fields = student.fields;
                    row.updated_at = now;
                    updated_students += 1;
                }
                _ => tracing::warn!(student_id = student.id, file_id = id, "no such student in file"),
            }
        }

        tables.log(
            id,
            OperationKind::Update,
            json!({
                "updated_students": update.students.len(),
                "file_metadata_updated": file_metadata_updated,
            }),
        );
        Ok(UpdateOutcome {
            updated_students,
            file_metadata_updated,
        })
    }

    async fn hard_delete(&self, id: i64) -> StoreResult<HardDeleteOutcome> {
        let mut tables = self.write()?;
        let (filename, file_path) = match tables.files.get(&id) {
            Some(file) => (file.filename.clone(), file.file_path.clone()),
            None => return Err(StoreError::NotFound(id)),
        };

        tables.log(
            id,
            OperationKind::HardDelete,
            json!({ "filename": filename, "file_path": file_path }),
        );
        let deleted_students = tables.remove_students(id);
        tables.files.remove(&id);
        Ok(HardDeleteOutcome {
            deleted_students,
            deleted_files: 1,
            file_path,
        })
    }

    async fn soft_delete(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.write()?;
        let file = tables.files.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        file.status = FileStatus::Deleted;
        file.updated_at = Utc::now();
        tables.log(id, OperationKind::SoftDelete, json!({}));
        Ok(())
    }

    async fn cleanup_deleted(&self) -> StoreResult<CleanupOutcome> {
        let mut tables = self.write()?;
        let deleted: Vec<(i64, Option<String>)> = tables
            .files
            .values()
            .filter(|f| f.status == FileStatus::Deleted)
            .map(|f| (f.id, f.file_path.clone()))
            .collect();

        let mut outcome = CleanupOutcome {
            files_processed: deleted.len(),
            ..Default::default()
        };
        for (id, path) in deleted {
            outcome.students_deleted += tables.remove_students(id);
            if tables.files.remove(&id).is_some() {
                outcome.files_deleted += 1;
            }
            outcome.file_paths.extend(path);
        }
        Ok(outcome)
    }

    async fn log_operation(
        &self,
        file_id: i64,
        kind: OperationKind,
        details: serde_json::Value,
    ) -> StoreResult<()> {
        self.write()?.log(file_id, kind, details);
        Ok(())
    }
}
