//! Postgres implementation of [`GenerationStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Row};

use super::{
    CleanupOutcome, FileDetails, FileUpdate, GeneratedFile, GeneratedFileSummary,
    GenerationStore, HardDeleteOutcome, NewGeneratedFile, NewStudentRow, OperationKind,
    StoreError, StoreResult, StudentFields, StudentRow, UpdateOutcome, SCORE_FIELDS,
};

const SCHEMA: &str = include_str!("../../migrations/0001_generated_files.sql");

/// Rows per multi-row insert; keeps binds under the protocol limit.
const INSERT_CHUNK: usize = 1000;

fn score_columns() -> String {
    SCORE_FIELDS
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'r> FromRow<'r, PgRow> for StudentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let mut scores = BTreeMap::new();
        for field in SCORE_FIELDS {
            scores.insert(field.to_string(), row.try_get::<Option<f64>, _>(field)?);
        }
        Ok(StudentRow {
            id: row.try_get("id")?,
            file_id: row.try_get("file_id")?,
            fields: StudentFields {
                last_name: row.try_get("last_name")?,
                first_name: row.try_get("first_name")?,
                middle_name: row.try_get("middle_name")?,
                strand: row.try_get("strand")?,
                department: row.try_get("department")?,
                scores,
            },
            school: row.try_get("school")?,
            batch: row.try_get("batch")?,
            date_of_immersion: row.try_get("date_of_immersion")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    file: GeneratedFile,
    student_count: i64,
    average_performance: Option<f64>,
}

async fn insert_log(
    conn: &mut PgConnection,
    file_id: i64,
    kind: OperationKind,
    details: serde_json::Value,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO file_operations_log (file_id, operation_type, operation_details) \
         VALUES ($1, $2, $3)",
    )
    .bind(file_id)
    .bind(kind.as_str())
    .bind(details)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_students(
    conn: &mut PgConnection,
    file_id: i64,
    students: &[NewStudentRow],
) -> StoreResult<()> {
    for chunk in students.chunks(INSERT_CHUNK) {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO generated_file_students (file_id, last_name, first_name, middle_name, \
             strand, department, school, batch, date_of_immersion, {}) ",
            score_columns()
        ));
        qb.push_values(chunk, |mut b, s| {
            b.push_bind(file_id)
                .push_bind(s.fields.last_name.clone())
                .push_bind(s.fields.first_name.clone())
                .push_bind(s.fields.middle_name.clone())
                .push_bind(s.fields.strand.clone())
                .push_bind(s.fields.department.clone())
                .push_bind(s.school.clone())
                .push_bind(s.batch.clone())
                .push_bind(s.date_of_immersion);
            for field in SCORE_FIELDS {
                b.push_bind(s.fields.score(field));
            }
        });
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

fn student_update_sql() -> String {
    let mut sets = vec![
        "last_name = $1".to_string(),
        "first_name = $2".to_string(),
        "middle_name = $3".to_string(),
        "strand = $4".to_string(),
        "department = $5".to_string(),
    ];
    for (i, field) in SCORE_FIELDS.iter().enumerate() {
        sets.push(format!("\"{field}\" = ${}", i + 6));
    }
    let id_param = SCORE_FIELDS.len() + 6;
    format!(
        "UPDATE generated_file_students SET {}, updated_at = NOW() \
         WHERE id = ${id_param} AND file_id = ${}",
        sets.join(", "),
        id_param + 1
    )
}

/// [`GenerationStore`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgGenerationStore {
    pool: PgPool,
}

impl PgGenerationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl GenerationStore for PgGenerationStore {
    async fn record_generation(
        &self,
        file: NewGeneratedFile,
        students: Vec<NewStudentRow>,
    ) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;

        let file_id: i64 = sqlx::query_scalar(
            "INSERT INTO generated_files (filename, original_filename, file_type, batch, school, \
             date_of_immersion, total_students, file_path, file_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(&file.filename)
        .bind(&file.original_filename)
        .bind(&file.file_type)
        .bind(&file.batch)
        .bind(&file.school)
        .bind(file.date_of_immersion)
        .bind(file.total_students)
        .bind(&file.file_path)
        .bind(file.file_size)
        .fetch_one(&mut *tx)
        .await?;

        insert_students(&mut tx, file_id, &students).await?;
        insert_log(
            &mut tx,
            file_id,
            OperationKind::Create,
            json!({ "students_count": students.len() }),
        )
        .await?;

        tx.commit().await?;
        tracing::debug!(file_id, students = students.len(), "recorded generated file");
        Ok(file_id)
    }

    async fn list_files(&self) -> StoreResult<Vec<GeneratedFileSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT f.*,
                   COUNT(s.id) AS student_count,
                   AVG(s.over_all) AS average_performance
            FROM generated_files f
            LEFT JOIN generated_file_students s ON s.file_id = f.id
            WHERE f.status = 'active'
            GROUP BY f.id
            ORDER BY f.created_at DESC, f.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| GeneratedFileSummary {
                file: r.file,
                student_count: r.student_count,
                average_performance: r.average_performance,
            })
            .collect())
    }

    async fn get_file(&self, id: i64) -> StoreResult<FileDetails> {
        let file = sqlx::query_as::<_, GeneratedFile>(
            "SELECT * FROM generated_files WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        let students = sqlx::query_as::<_, StudentRow>(
            "SELECT * FROM generated_file_students WHERE file_id = $1 \
             ORDER BY last_name, first_name, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(FileDetails { file, students })
    }

    async fn update_file(&self, id: i64, update: FileUpdate) -> StoreResult<UpdateOutcome> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM generated_files WHERE id = $1 AND status = 'active' FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(id));
        }

        let meta = update.metadata();
        let file_metadata_updated = !meta.is_empty();
        if file_metadata_updated {
            sqlx::query(
                "UPDATE generated_files SET \
                 batch = COALESCE($2, batch), \
                 school = COALESCE($3, school), \
                 date_of_immersion = CASE WHEN $4 THEN $5 ELSE date_of_immersion END, \
                 updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(id)
            .bind(&meta.batch)
            .bind(&meta.school)
            .bind(meta.date_of_immersion.is_some())
            .bind(meta.date_of_immersion.flatten())
            .execute(&mut *tx)
            .await?;
        }

        let sql = student_update_sql();
        let mut updated_students = 0;
        for student in update.student_updates() {
            let f = &student.fields;
            let mut query = sqlx::query(&sql)
                .bind(&f.last_name)
                .bind(&f.first_name)
                .bind(&f.middle_name)
                .bind(&f.strand)
                .bind(&f.department);
            for field in SCORE_FIELDS {
                query = query.bind(f.score(field));
            }
            let result = query.bind(student.id).bind(id).execute(&mut *tx).await?;
            if result.rows_affected() > 0 {
                updated_students += 1;
            } else {
                tracing::warn!(student_id = student.id, file_id = id, "no such student in file");
            }
        }

        insert_log(
            &mut tx,
            id,
            OperationKind::Update,
            json!({
                "updated_students": update.students.len(),
                "file_metadata_updated": file_metadata_updated,
            }),
        )
        .await?;
        tx.commit().await?;

        Ok(UpdateOutcome {
            updated_students,
            file_metadata_updated,
        })
    }

    async fn hard_delete(&self, id: i64) -> StoreResult<HardDeleteOutcome> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT filename, file_path FROM generated_files WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (filename, file_path) = row.ok_or(StoreError::NotFound(id))?;

        insert_log(
            &mut tx,
            id,
            OperationKind::HardDelete,
            json!({ "filename": filename, "file_path": file_path }),
        )
        .await?;

        let deleted_students = sqlx::query("DELETE FROM generated_file_students WHERE file_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let deleted_files = sqlx::query("DELETE FROM generated_files WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted_files == 0 {
            return Err(StoreError::NotFound(id));
        }

        tx.commit().await?;
        Ok(HardDeleteOutcome {
            deleted_students,
            deleted_files,
            file_path,
        })
    }

    async fn soft_delete(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE generated_files SET status = 'deleted', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        insert_log(&mut tx, id, OperationKind::SoftDelete, json!({})).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cleanup_deleted(&self) -> StoreResult<CleanupOutcome> {
        let mut tx = self.pool.begin().await?;
        let deleted: Vec<(i64, Option<String>)> = sqlx::query_as(
            "SELECT id, file_path FROM generated_files WHERE status = 'deleted' FOR UPDATE",
        )
        .fetch_all(&mut *tx)
        .await?;
        if deleted.is_empty() {
            return Ok(CleanupOutcome::default());
        }

        let ids: Vec<i64> = deleted.iter().map(|(id, _)| *id).collect();
        let students_deleted =
            sqlx::query("DELETE FROM generated_file_students WHERE file_id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        let files_deleted = sqlx::query("DELETE FROM generated_files WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        Ok(CleanupOutcome {
            files_processed: deleted.len(),
            students_deleted,
            files_deleted,
            file_paths: deleted.into_iter().filter_map(|(_, path)| path).collect(),
        })
    }

    async fn log_operation(
        &self,
        file_id: i64,
        kind: OperationKind,
        details: serde_json::Value,
    ) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_log(&mut conn, file_id, kind, details).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::store::GRADES_FILE_TYPE;

    async fn store() -> PgGenerationStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgGenerationStore::connect(&url, 2).await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    fn new_file() -> NewGeneratedFile {
        NewGeneratedFile {
            filename: "Immersion_Grades_Test.xlsx".into(),
            original_filename: Some("Immersion_Grades_Test.xlsx".into()),
            file_type: GRADES_FILE_TYPE.into(),
            batch: "Batch 7".into(),
            school: "Rizal High".into(),
            date_of_immersion: chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
            total_students: 2,
            file_path: None,
            file_size: Some(2048),
        }
    }

    #[test]
    fn update_sql_binds_every_column() {
        let sql = student_update_sql();
        assert!(sql.contains("\"5S\" = $9"));
        assert!(sql.ends_with("WHERE id = $29 AND file_id = $30"));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn round_trip_through_postgres() {
        let store = store().await;
        let file = new_file();
        let rows = vec![
            NewStudentRow::from_record(
                &Record::new()
                    .with("last_name", "Santos")
                    .with("over_all", "80")
                    .with("5S", "7"),
                &file,
            ),
            NewStudentRow::from_record(
                &Record::new().with("last_name", "Cruz").with("over_all", 90i64),
                &file,
            ),
        ];
        let id = store.record_generation(file, rows).await.unwrap();

        let details = store.get_file(id).await.unwrap();
        assert_eq!(details.students.len(), 2);
        assert_eq!(details.students[0].fields.last_name, "Cruz");
        assert_eq!(details.students[1].fields.score("5S"), Some(7.0));

        let listed = store.list_files().await.unwrap();
        let summary = listed.iter().find(|s| s.file.id == id).unwrap();
        assert_eq!(summary.student_count, 2);
        assert_eq!(summary.average_performance, Some(85.0));

        store.soft_delete(id).await.unwrap();
        assert!(matches!(store.get_file(id).await, Err(StoreError::NotFound(_))));
        let outcome = store.hard_delete(id).await.unwrap();
        assert_eq!(outcome.deleted_students, 2);
    }
}
