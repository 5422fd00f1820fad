//! Immersion grade sheets: a fixed-layout workbook with one worksheet per
//! department and one row per student.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::coerce::to_number;
use crate::department::Department;
use crate::error::{EngineError, Result};
use crate::ooxml::{CellValue, Workbook, Worksheet};
use crate::record::Record;

/// First data row on every department sheet.
pub const FIRST_DATA_ROW: u32 = 10;

/// Header cells, written on every worksheet.
pub const BATCH_SCHOOL_CELL: &str = "H8";
pub const IMMERSION_DATE_CELL: &str = "H9";

/// `(column, field)` pairs written verbatim.
const IDENTITY_COLUMNS: &[(&str, &str)] = &[
    ("B", "last_name"),
    ("C", "first_name"),
    ("D", "middle_name"),
    ("E", "strand"),
    ("F", "department"),
];

/// Scores every department sheet carries.
const COMMON_SCORES: &[(&str, &str)] = &[
    ("G", "over_all"),
    ("H", "WI"),
    ("I", "CO"),
    ("J", "5S"),
    ("K", "BO"),
    ("L", "CBO"),
    ("M", "SDG"),
    ("N", "OHSA"),
    ("O", "WE"),
    ("P", "UJC"),
    ("Q", "ISO"),
    ("R", "PO"),
    ("S", "HR"),
    ("AC", "DS"),
];

const PRODUCTION_SCORES: &[(&str, &str)] = &[
    ("V", "WI2"),
    ("W", "ELEX"),
    ("X", "CM"),
    ("Y", "SPC"),
    ("AB", "PROD"),
];

const SUPPORT_SCORES: &[(&str, &str)] = &[("U", "PerDev"), ("Z", "Supp")];

const TECHNICAL_SCORES: &[(&str, &str)] = &[("T", "AppDev"), ("AA", "Tech")];

fn department_scores(dept: Department) -> &'static [(&'static str, &'static str)] {
    match dept {
        Department::Production => PRODUCTION_SCORES,
        Department::Support => SUPPORT_SCORES,
        Department::Technical => TECHNICAL_SCORES,
    }
}

/// Batch, school and immersion date printed above the grade table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeHeader {
    pub batch: String,
    pub school: String,
    pub date_of_immersion: String,
}

impl GradeHeader {
    /// Header fields as carried by a student record.
    pub fn from_record(record: &Record) -> Self {
        Self {
            batch: record.text("batch"),
            school: record.text("school"),
            date_of_immersion: record.text("date_of_immersion"),
        }
    }

    /// Header of the first record, or an empty header.
    pub fn from_first_record(records: &[Record]) -> Self {
        records.first().map(Self::from_record).unwrap_or_default()
    }

    fn write(&self, sheet: &mut Worksheet) -> Result<()> {
        sheet.set(BATCH_SCHOOL_CELL, format!("{} - {}", self.batch, self.school))?;
        sheet.set(
            IMMERSION_DATE_CELL,
            format!("Date of Immersion: {}", self.date_of_immersion),
        )
    }
}

/// `Immersion_Grades_Batch_7_20240501_143009.xlsx`
pub fn grades_filename(batch: &str, now: NaiveDateTime) -> String {
    // The batch is free text; it must stay a single path component.
    let batch: String = batch
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();
    let batch = if batch.is_empty() { "Batch".to_string() } else { batch };
    format!(
        "Immersion_Grades_{batch}_{}.xlsx",
        now.format("%Y%m%d_%H%M%S")
    )
}

/// Rows written per department.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeCounts {
    pub production: u32,
    pub support: u32,
    pub technical: u32,
}

impl GradeCounts {
    fn slot(&mut self, dept: Department) -> &mut u32 {
        match dept {
            Department::Production => &mut self.production,
            Department::Support => &mut self.support,
            Department::Technical => &mut self.technical,
        }
    }

    pub fn get(&self, dept: Department) -> u32 {
        match dept {
            Department::Production => self.production,
            Department::Support => self.support,
            Department::Technical => self.technical,
        }
    }

    pub fn total(&self) -> u32 {
        self.production + self.support + self.technical
    }
}

fn write_row(sheet: &mut Worksheet, row: u32, dept: Department, record: &Record) -> Result<()> {
    for (col, field) in IDENTITY_COLUMNS {
        let value = record
            .get(field)
            .map(CellValue::from_field)
            .unwrap_or_default();
        sheet.set(&format!("{col}{row}"), value)?;
    }
    for (col, field) in COMMON_SCORES.iter().chain(department_scores(dept)) {
        let value = CellValue::from_field(&to_number(record.get(field)));
        sheet.set(&format!("{col}{row}"), value)?;
    }
    Ok(())
}

/// Fill the grade template in place.
///
/// Fails with [`EngineError::SheetNotFound`] before writing anything when a
/// department sheet is missing.
pub fn fill_grade_workbook(
    wb: &mut Workbook,
    header: &GradeHeader,
    records: &[Record],
) -> Result<GradeCounts> {
    for dept in Department::ALL {
        if wb.sheet_index(dept.sheet_name()).is_none() {
            return Err(EngineError::SheetNotFound(dept.sheet_name().to_string()));
        }
    }

    for idx in 0..wb.sheet_count() {
        if let Some(sheet) = wb.worksheet_mut(idx) {
            header.write(sheet)?;
        }
    }

    let mut counts = GradeCounts::default();
    for record in records {
        let dept = Department::classify(&record.text("department"));
        let slot = counts.slot(dept);
        let row = FIRST_DATA_ROW + *slot;
        write_row(wb.worksheet_by_name_mut(dept.sheet_name())?, row, dept, record)?;
        *slot += 1;
    }
    Ok(counts)
}

/// Open `template`, fill it and save it under [`grades_filename`] in
/// `out_dir`. Returns the saved path.
pub fn materialize(
    template: &Path,
    header: &GradeHeader,
    records: &[Record],
    out_dir: &Path,
    now: NaiveDateTime,
) -> Result<PathBuf> {
    let mut wb = Workbook::open(template)?;
    let counts = fill_grade_workbook(&mut wb, header, records)?;

    let path = out_dir.join(grades_filename(&header.batch, now));
    wb.save(&path)?;
    tracing::info!(
        file = %path.display(),
        production = counts.production,
        support = counts.support,
        technical = counts.technical,
        "generated grade workbook"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::workbook::fixtures::{sheet_xml, workbook_bytes};
    use crate::record::FieldValue;
    use chrono::NaiveDate;

    fn template_bytes() -> Vec<u8> {
        let sheet = || sheet_xml(&[("B9", "LAST NAME"), ("H8", "batch"), ("H9", "date")], "");
        workbook_bytes(
            &[
                ("PRODUCTION", sheet(), None),
                ("SUPPORT", sheet(), None),
                ("TECHNICAL", sheet(), None),
                ("SUMMARY", sheet_xml(&[], ""), None),
            ],
            0,
        )
    }

    fn student(last: &str, dept: &str) -> Record {
        Record::new()
            .with("last_name", last)
            .with("first_name", "Ana")
            .with("department", dept)
            .with("batch", "Batch 7")
            .with("school", "Rizal High")
            .with("date_of_immersion", "2024-05-01")
            .with("over_all", "95")
            .with("5S", 88.5)
            .with("AppDev", "90")
            .with("Supp", "n/a")
            .with("PROD", 77i64)
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(14, 30, 9)
            .unwrap()
    }

    #[test]
    fn routes_students_to_department_sheets_in_order() {
        let mut wb = Workbook::from_bytes(&template_bytes()).unwrap();
        let records = vec![
            student("Cruz", "IT"),
            student("Reyes", "PROD"),
            student("Santos", "Marketing"),
            student("Lim", " technical "),
        ];
        let header = GradeHeader::from_first_record(&records);
        let counts = fill_grade_workbook(&mut wb, &header, &records).unwrap();
        assert_eq!(
            counts,
            GradeCounts {
                production: 1,
                support: 1,
                technical: 2
            }
        );

        let tech = wb.worksheet(2).unwrap();
        assert_eq!(tech.value_a1("B10"), &CellValue::Text("Cruz".into()));
        assert_eq!(tech.value_a1("B11"), &CellValue::Text("Lim".into()));
        assert_eq!(tech.value_a1("T10"), &CellValue::Number(90.0));
        assert_eq!(tech.value_a1("G10"), &CellValue::Number(95.0));
        assert_eq!(tech.value_a1("J10"), &CellValue::Number(88.5));
        // Production-only columns stay untouched on other sheets.
        assert_eq!(tech.value_a1("AB10"), &CellValue::Empty);

        let prod = wb.worksheet(0).unwrap();
        assert_eq!(prod.value_a1("B10"), &CellValue::Text("Reyes".into()));
        assert_eq!(prod.value_a1("AB10"), &CellValue::Number(77.0));
        assert_eq!(prod.value_a1("B11"), &CellValue::Empty);

        let support = wb.worksheet(1).unwrap();
        assert_eq!(support.value_a1("B10"), &CellValue::Text("Santos".into()));
        assert_eq!(support.value_a1("F10"), &CellValue::Text("Marketing".into()));
        // Unparseable scores are written as given.
        assert_eq!(support.value_a1("Z10"), &CellValue::Text("n/a".into()));
    }

    #[test]
    fn header_is_written_on_every_sheet() {
        let mut wb = Workbook::from_bytes(&template_bytes()).unwrap();
        let records = vec![student("Cruz", "IT")];
        fill_grade_workbook(&mut wb, &GradeHeader::from_first_record(&records), &records).unwrap();
        for idx in 0..wb.sheet_count() {
            let sheet = wb.worksheet(idx).unwrap();
            assert_eq!(
                sheet.value_a1("H8"),
                &CellValue::Text("Batch 7 - Rizal High".into())
            );
            assert_eq!(
                sheet.value_a1("H9"),
                &CellValue::Text("Date of Immersion: 2024-05-01".into())
            );
        }
    }

    #[test]
    fn existing_styles_are_kept() {
        let mut wb = Workbook::from_bytes(&template_bytes()).unwrap();
        let records = vec![student("Cruz", "PRODUCTION")];
        fill_grade_workbook(&mut wb, &GradeHeader::default(), &records).unwrap();
        let h8 = wb
            .worksheet(0)
            .unwrap()
            .cell(crate::ooxml::CellRef::new(8, 8))
            .unwrap();
        assert_eq!(h8.style.as_deref(), Some("1"));
        assert_eq!(h8.value, CellValue::Text(" - ".into()));
    }

    #[test]
    fn missing_department_sheet_is_an_input_error() {
        let bytes = workbook_bytes(&[("PRODUCTION", sheet_xml(&[], ""), None)], 0);
        let mut wb = Workbook::from_bytes(&bytes).unwrap();
        let err = fill_grade_workbook(&mut wb, &GradeHeader::default(), &[]).unwrap_err();
        assert!(matches!(&err, EngineError::SheetNotFound(name) if name == "SUPPORT"));
        assert!(err.is_input_error());
    }

    #[test]
    fn filename_uses_batch_or_placeholder() {
        assert_eq!(
            grades_filename("Batch 7", now()),
            "Immersion_Grades_Batch_7_20240501_143009.xlsx"
        );
        assert_eq!(
            grades_filename("  ", now()),
            "Immersion_Grades_Batch_20240501_143009.xlsx"
        );
    }

    #[test]
    fn filename_batch_stays_one_path_component() {
        let name = grades_filename("2024/25 B\\7: AM", now());
        assert_eq!(name, "Immersion_Grades_2024_25_B_7__AM_20240501_143009.xlsx");
        assert_eq!(std::path::Path::new(&name).components().count(), 1);
    }

    #[test]
    fn materialize_saves_into_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("Grades.xlsx");
        std::fs::write(&template, template_bytes()).unwrap();
        let out = tempfile::tempdir().unwrap();

        let records = vec![student("Cruz", "IT").with("middle_name", FieldValue::Empty)];
        let header = GradeHeader::from_first_record(&records);
        let path = materialize(&template, &header, &records, out.path(), now()).unwrap();
        assert_eq!(path.parent(), Some(out.path()));

        let saved = Workbook::open(&path).unwrap();
        assert_eq!(
            saved.worksheet(2).unwrap().value_a1("B10"),
            &CellValue::Text("Cruz".into())
        );
    }
}
