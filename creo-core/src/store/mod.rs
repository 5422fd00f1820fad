//! Persistence of generated grade workbooks.
//!
//! Handlers talk to a [`GenerationStore`]; [`MemoryStore`] backs tests and
//! deployments without a database, `PgGenerationStore` (feature `postgres`)
//! backs production.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgGenerationStore;
pub use types::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("generated file {0} not found")]
    NotFound(i64),

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store lock poisoned: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage of grade files, their students and the operations log.
///
/// Every method is atomic: a failure leaves the store as it was.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// Insert the file, its students and a `create` log entry. Returns the
    /// new file id.
    async fn record_generation(
        &self,
        file: NewGeneratedFile,
        students: Vec<NewStudentRow>,
    ) -> StoreResult<i64>;

    /// Active files, newest first.
    async fn list_files(&self) -> StoreResult<Vec<GeneratedFileSummary>>;

    /// An active file and its students.
    async fn get_file(&self, id: i64) -> StoreResult<FileDetails>;

    /// Apply an edit to an active file and log it.
    ///
    /// Students whose id does not belong to the file are skipped.
    async fn update_file(&self, id: i64, update: FileUpdate) -> StoreResult<UpdateOutcome>;

    /// Remove a file (active or not) and its students for good.
    async fn hard_delete(&self, id: i64) -> StoreResult<HardDeleteOutcome>;

    /// Mark a file deleted, keeping its rows.
    async fn soft_delete(&self, id: i64) -> StoreResult<()>;

    /// Remove every soft-deleted file and its students for good.
    async fn cleanup_deleted(&self) -> StoreResult<CleanupOutcome>;

    async fn log_operation(
        &self,
        file_id: i64,
        kind: OperationKind,
        details: serde_json::Value,
    ) -> StoreResult<()>;
}
