//! Worksheet cloning strategies.
//!
//! [`NativeCopy`] duplicates the worksheet part itself, so column widths,
//! styles, merges and page setup survive. It only knows how to carry
//! printer settings and external hyperlinks along; a sheet with drawings,
//! tables or comments is refused. [`ManualCopy`] always works but keeps only
//! values and merged ranges. [`CloneWithFallback`] tries one, then the other.

use thiserror::Error;

use crate::error::EngineError;
use crate::ooxml::package::{content_type, rel_type, relative_target, resolve_target};
use crate::ooxml::{Relationship, Relationships, Workbook, Worksheet};

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("relationship type '{0}' cannot be duplicated")]
    UnsupportedRelationship(String),

    #[error("source sheet #{0} does not exist")]
    MissingSource(usize),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<CloneError> for EngineError {
    fn from(err: CloneError) -> Self {
        match err {
            CloneError::Engine(inner) => inner,
            other => EngineError::Clone(other.to_string()),
        }
    }
}

/// Copies worksheet `source` of a workbook into a new sheet titled `title`.
pub trait SheetCloner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the index of the new sheet.
    fn clone_sheet(&self, wb: &mut Workbook, source: usize, title: &str) -> Result<usize, CloneError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCopy;

impl SheetCloner for NativeCopy {
    fn name(&self) -> &'static str {
        "native"
    }

    fn clone_sheet(&self, wb: &mut Workbook, source: usize, title: &str) -> Result<usize, CloneError> {
        let sheet = wb.sheet(source).ok_or(CloneError::MissingSource(source))?;
        let source_part = sheet.part().to_string();
        let mut worksheet = sheet.worksheet.clone();
        worksheet.set_tab_selected(false);

        let source_rels = wb.package().relationships(&source_part)?;
        // Everything that can fail happens before the workbook is touched.
        let mut carried = Vec::with_capacity(source_rels.len());
        for rel in source_rels.iter() {
            let supported = rel_type::is(&rel.kind, rel_type::PRINTER_SETTINGS)
                || (rel_type::is(&rel.kind, rel_type::HYPERLINK) && rel.is_external());
            if !supported {
                return Err(CloneError::UnsupportedRelationship(rel.kind.clone()));
            }
            if rel.is_external() {
                carried.push((rel, None));
                continue;
            }
            let source_target = resolve_target(&source_part, &rel.target);
            let data = wb
                .package()
                .part(&source_target)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| EngineError::MissingPart(source_target.clone()))?;
            carried.push((rel, Some((source_target, data))));
        }

        let idx = wb.add_worksheet(title, worksheet, None)?;
        if carried.is_empty() {
            return Ok(idx);
        }
        let new_part = wb.sheets()[idx].part().to_string();

        // Targets are rewritten relative to the new part.
        let mut rels = Relationships::default();
        for (rel, part) in carried {
            let Some((source_target, data)) = part else {
                rels.push(rel.clone());
                continue;
            };
            let (stem, ext) = source_target
                .rsplit_once('.')
                .map(|(stem, ext)| (stem.trim_end_matches(|c: char| c.is_ascii_digit()), ext))
                .unwrap_or((source_target.as_str(), "bin"));
            let copy = wb.next_part_name(stem, &format!(".{ext}"));
            if !wb.content_types().has_default(ext) {
                wb.content_types_mut()
                    .add_override(&copy, content_type::PRINTER_SETTINGS);
            }
            wb.package_mut().set_part(copy.clone(), data);
            rels.push(Relationship {
                id: rel.id.clone(),
                kind: rel.kind.clone(),
                target: relative_target(&new_part, &copy),
                target_mode: None,
            });
        }

        wb.package_mut().set_relationships(&new_part, &rels);
        Ok(idx)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ManualCopy;

impl SheetCloner for ManualCopy {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn clone_sheet(&self, wb: &mut Workbook, source: usize, title: &str) -> Result<usize, CloneError> {
        let template = wb
            .worksheet(source)
            .ok_or(CloneError::MissingSource(source))?;

        let mut copy = Worksheet::blank(&template.merged_ranges());
        for (at, cell) in template.cells() {
            if !cell.value.is_empty() {
                copy.set_value(at, cell.value.clone());
            }
        }
        Ok(wb.add_worksheet(title, copy, None)?)
    }
}

/// Try `primary`; on failure log it and use `fallback`.
#[derive(Debug, Clone, Copy)]
pub struct CloneWithFallback<P = NativeCopy, F = ManualCopy> {
    pub primary: P,
    pub fallback: F,
}

impl Default for CloneWithFallback {
    fn default() -> Self {
        Self {
            primary: NativeCopy,
            fallback: ManualCopy,
        }
    }
}

impl<P: SheetCloner, F: SheetCloner> SheetCloner for CloneWithFallback<P, F> {
    fn name(&self) -> &'static str {
        "with-fallback"
    }

    fn clone_sheet(&self, wb: &mut Workbook, source: usize, title: &str) -> Result<usize, CloneError> {
        match self.primary.clone_sheet(wb, source, title) {
            Ok(idx) => Ok(idx),
            Err(err) => {
                tracing::warn!(
                    strategy = self.primary.name(),
                    fallback = self.fallback.name(),
                    title,
                    error = %err,
                    "sheet clone failed, falling back"
                );
                self.fallback.clone_sheet(wb, source, title)
            }
        }
    }
}
