//! creo-server: HTTP service in front of the Creo document engine.
//!
//! Serves certificate, TESDA report and grade sheet generation, keeps a log
//! of recent downloads and exposes the stored grade files for editing.

pub mod config;
pub mod downloads;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod router;
pub mod state;
pub mod storage;

pub use config::ServerConfig;
pub use router::build_router;
pub use state::AppState;
