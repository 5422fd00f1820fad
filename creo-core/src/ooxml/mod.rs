//! Minimal Office Open XML document model.
//!
//! Enough of SpreadsheetML and PresentationML to open a template, change
//! cell values or text runs, add and remove worksheets, and save. Parts the
//! engine does not understand are carried through byte for byte.

pub mod cell_ref;
pub mod package;
pub mod presentation;
pub mod workbook;
pub mod worksheet;

pub use cell_ref::{column_letters, column_number, CellRef};
pub use package::{Package, Relationship, Relationships};
pub use presentation::SlideDeck;
pub use workbook::{Sheet, Workbook};
pub use worksheet::{Cell, CellValue, Worksheet};

/// MIME type of `.xlsx` downloads.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
/// MIME type of `.pptx` downloads.
pub const PPTX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
