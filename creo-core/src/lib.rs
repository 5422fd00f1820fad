//! Template filling engine.
//!
//! Three generation modes share one document model:
//! - certificates: `{{key}}` runs in a slide deck filled from one record
//! - TESDA reports: one worksheet per record, cloned from a template sheet
//! - grade sheets: students routed by department into fixed-layout sheets
//!
//! The engine is synchronous and owns each document exclusively while it
//! fills it. Persistence of grade files goes through [`store::GenerationStore`].

pub mod coerce;
pub mod department;
pub mod error;
pub mod materialize;
pub mod ooxml;
pub mod record;
pub mod resolver;
pub mod sheet_clone;
pub mod store;
pub mod title;

pub use department::Department;
pub use error::{EngineError, Result};
pub use record::{FieldValue, Record};
pub use resolver::{resolve, MappingEntry, MappingTable};
pub use sheet_clone::{CloneWithFallback, ManualCopy, NativeCopy, SheetCloner};
