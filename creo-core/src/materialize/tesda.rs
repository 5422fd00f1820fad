//! TESDA reports: one worksheet per record, cloned from the template sheet.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::error::{EngineError, Result};
use crate::ooxml::Workbook;
use crate::record::Record;
use crate::resolver::{has_marker, resolve, MappingTable};
use crate::sheet_clone::SheetCloner;
use crate::title::SheetTitleRegistry;

/// Record field that names each worksheet.
pub const TITLE_FIELD: &str = "Name";

/// `TESDA_2024-05-01_14-30.xlsx`
pub fn tesda_filename(now: NaiveDateTime) -> String {
    format!("TESDA_{}.xlsx", now.format("%Y-%m-%d_%H-%M"))
}

/// Fill `wb` in place: one sheet per record, template sheet removed.
///
/// The template sheet is the workbook's active sheet. Returns the titles of
/// the generated sheets in record order.
pub fn fill_workbook(
    wb: &mut Workbook,
    records: &[Record],
    cloner: &dyn SheetCloner,
) -> Result<Vec<String>> {
    if records.is_empty() {
        return Err(EngineError::NoRecords);
    }

    let template = wb.active_index();
    let mapping = MappingTable::new();
    let mut registry = SheetTitleRegistry::new();
    // Titles of sheets kept from the template other than the one removed.
    for (idx, name) in wb.sheet_names().into_iter().enumerate() {
        if idx != template {
            registry.register(name);
        }
    }

    let mut titles = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let candidate = match record.get(TITLE_FIELD) {
            Some(value) => value.to_string(),
            None => format!("Sheet{}", i + 1),
        };
        let title = registry.register(&candidate);

        let idx = cloner.clone_sheet(wb, template, &title)?;
        let sheet = wb
            .worksheet_mut(idx)
            .ok_or_else(|| EngineError::SheetNotFound(title.clone()))?;
        for text in sheet.text_cells_mut() {
            if has_marker(text) {
                *text = resolve(text, &mapping, record);
            }
        }
        titles.push(title);
    }

    wb.remove_sheet(template)?;
    let first_generated = wb.sheet_count() - titles.len();
    wb.set_active(first_generated);
    Ok(titles)
}

/// Open `template`, fill it and save it under [`tesda_filename`] in `out_dir`.
pub fn materialize(
    template: &Path,
    records: &[Record],
    out_dir: &Path,
    cloner: &dyn SheetCloner,
    now: NaiveDateTime,
) -> Result<String> {
    let mut wb = Workbook::open(template)?;
    let titles = fill_workbook(&mut wb, records, cloner)?;

    let filename = tesda_filename(now);
    wb.save(&out_dir.join(&filename))?;
    tracing::info!(
        template = %template.display(),
        file = %filename,
        sheets = titles.len(),
        "generated TESDA workbook"
    );
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::workbook::fixtures::{sheet_xml, workbook_bytes};
    use crate::ooxml::CellValue;
    use crate::sheet_clone::{CloneWithFallback, ManualCopy};
    use chrono::NaiveDate;

    fn template_bytes() -> Vec<u8> {
        workbook_bytes(
            &[(
                "Template",
                sheet_xml(
                    &[
                        ("A1", "TESDA RECORD"),
                        ("B2", "Name: {Name}"),
                        ("B3", "Course: {Course} / {Missing}"),
                    ],
                    "",
                ),
                None,
            )],
            0,
        )
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(14, 30, 9)
            .unwrap()
    }

    #[test]
    fn one_sheet_per_record_and_template_removed() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("tesda.xlsx");
        std::fs::write(&template, template_bytes()).unwrap();

        let records = vec![
            Record::new().with("Name", "A").with("Course", "Welding"),
            Record::new().with("Name", "B"),
        ];
        let cloner: CloneWithFallback = CloneWithFallback::default();
        let filename = materialize(&template, &records, dir.path(), &cloner, now()).unwrap();
        assert_eq!(filename, "TESDA_2024-05-01_14-30.xlsx");

        let wb = Workbook::open(&dir.path().join(&filename)).unwrap();
        assert_eq!(wb.sheet_names(), vec!["A", "B"]);
        let a = wb.worksheet(0).unwrap();
        assert_eq!(a.value_a1("A1"), &CellValue::Text("TESDA RECORD".into()));
        assert_eq!(a.value_a1("B2"), &CellValue::Text("Name: A".into()));
        assert_eq!(a.value_a1("B3"), &CellValue::Text("Course: Welding / ".into()));
        let b = wb.worksheet(1).unwrap();
        assert_eq!(b.value_a1("B3"), &CellValue::Text("Course:  / ".into()));
    }

    #[test]
    fn duplicate_and_missing_names_get_unique_titles() {
        let mut wb = Workbook::from_bytes(&template_bytes()).unwrap();
        let records = vec![
            Record::new().with("Name", "Juan"),
            Record::new().with("Name", "Juan"),
            Record::new(),
            Record::new().with("Name", "A/B:C"),
            Record::new().with("Name", "  "),
        ];
        let titles = fill_workbook(&mut wb, &records, &ManualCopy).unwrap();
        assert_eq!(titles, vec!["Juan", "Juan (2)", "Sheet3", "A-B-C", "Row"]);
        assert_eq!(wb.sheet_names(), titles);
    }

    #[test]
    fn empty_record_list_is_rejected() {
        let mut wb = Workbook::from_bytes(&template_bytes()).unwrap();
        assert!(matches!(
            fill_workbook(&mut wb, &[], &ManualCopy),
            Err(EngineError::NoRecords)
        ));
    }

    #[test]
    fn other_template_sheets_are_kept_and_not_reused() {
        let bytes = workbook_bytes(
            &[
                ("Notes", sheet_xml(&[("A1", "keep")], ""), None),
                ("Template", sheet_xml(&[("A1", "{Name}")], ""), None),
            ],
            1,
        );
        let mut wb = Workbook::from_bytes(&bytes).unwrap();
        let records = vec![Record::new().with("Name", "notes")];
        let titles = fill_workbook(&mut wb, &records, &ManualCopy).unwrap();
        assert_eq!(titles, vec!["notes (2)"]);
        assert_eq!(wb.sheet_names(), vec!["Notes", "notes (2)"]);
        assert_eq!(wb.active_index(), 1);
    }
}
