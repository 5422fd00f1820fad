//! Reading uploaded trainee workbooks.
//!
//! The first worksheet holds a header row followed by one trainee per row.
//! Columns are matched by header text, case-insensitively.

use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use chrono::{Days, NaiveDate};
use creo_core::{FieldValue, Record};
use thiserror::Error;

/// Header text and the record field it fills.
pub const TRAINEE_COLUMNS: [(&str, &str); 9] = [
    ("FIRST NAME", "first_name"),
    ("MIDDLE NAME", "middle_name"),
    ("LAST NAME", "last_name"),
    ("STRAND", "strand"),
    ("DEPARTMENT", "department"),
    ("SCHOOL", "school"),
    ("BATCH", "batch"),
    ("DATE OF IMMERSION", "date_of_immersion"),
    ("STATUS", "status"),
];

const DATE_FIELD: &str = "date_of_immersion";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("cannot read workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("workbook has no worksheets")]
    NoWorksheet,
}

/// Trainee records of an uploaded `.xlsx`, in sheet order.
pub fn read_trainees(bytes: &[u8]) -> Result<Vec<Record>, IngestError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(IngestError::NoWorksheet)??;
    Ok(trainees_from_range(&range))
}

/// Trainee records of a sheet whose first row is the header.
pub fn trainees_from_range(range: &Range<Data>) -> Vec<Record> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Vec::new();
    };

    let positions: Vec<(Option<usize>, &str)> = TRAINEE_COLUMNS
        .iter()
        .map(|(title, field)| {
            let pos = header
                .iter()
                .position(|cell| cell.to_string().trim().eq_ignore_ascii_case(title));
            (pos, *field)
        })
        .collect();

    rows.filter(|row| row.iter().any(|cell| !is_blank(cell)))
        .map(|row| {
            let mut record = Record::new();
            for (pos, field) in &positions {
                let cell = pos.and_then(|i| row.get(i)).unwrap_or(&Data::Empty);
                let value = if *field == DATE_FIELD {
                    date_value(cell)
                } else {
                    field_value(cell)
                };
                record.insert(*field, value);
            }
            record
        })
        .collect()
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn field_value(cell: &Data) -> FieldValue {
    match cell {
        Data::Empty | Data::Error(_) => FieldValue::Text(String::new()),
        Data::String(s) => FieldValue::Text(s.trim().to_string()),
        Data::Int(i) => FieldValue::Integer(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => FieldValue::Integer(*f as i64),
        Data::Float(f) => FieldValue::Float(*f),
        Data::Bool(b) => FieldValue::Bool(*b),
        Data::DateTime(dt) => serial_date(dt.as_f64())
            .map(|d| FieldValue::Text(d.to_string()))
            .unwrap_or_else(|| FieldValue::Float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => FieldValue::Text(s.clone()),
    }
}

/// Dates come back as `YYYY-MM-DD` whatever the cell type.
fn date_value(cell: &Data) -> FieldValue {
    let date = match cell {
        Data::DateTime(dt) => serial_date(dt.as_f64()),
        Data::Float(f) => serial_date(*f),
        Data::Int(i) => serial_date(*i as f64),
        Data::DateTimeIso(s) => s.get(..10).and_then(|d| d.parse().ok()),
        _ => None,
    };
    match date {
        Some(date) => FieldValue::Text(date.to_string()),
        None => field_value(cell),
    }
}

/// Day of an Excel serial date (1900 system).
fn serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(serial.floor() as u64))
}
