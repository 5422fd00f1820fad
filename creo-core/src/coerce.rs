//! Numeric coercion for score columns.

use crate::record::FieldValue;

/// Coerce a field into a number where possible.
///
/// - absent, empty or whitespace-only input gives [`FieldValue::Empty`]
/// - numeric input with no fractional part gives [`FieldValue::Integer`]
/// - other finite numeric input gives [`FieldValue::Float`]
/// - anything else (including `inf`/`NaN` text) comes back unchanged
///
/// Total: no input makes this fail.
pub fn to_number(value: Option<&FieldValue>) -> FieldValue {
    let Some(value) = value else {
        return FieldValue::Empty;
    };

    match value {
        FieldValue::Empty => FieldValue::Empty,
        FieldValue::Bool(b) => FieldValue::Integer(i64::from(*b)),
        FieldValue::Integer(i) => FieldValue::Integer(*i),
        FieldValue::Float(f) => from_float(*f).unwrap_or_else(|| value.clone()),
        FieldValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return FieldValue::Empty;
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(from_float)
                .unwrap_or_else(|| value.clone())
        }
        FieldValue::Other(_) => value.clone(),
    }
}

/// Coerce a raw string, e.g. a spreadsheet cell or form field.
pub fn text_to_number(text: &str) -> FieldValue {
    to_number(Some(&FieldValue::Text(text.to_string())))
}

fn from_float(f: f64) -> Option<FieldValue> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(FieldValue::Integer(f as i64))
    } else {
        Some(FieldValue::Float(f))
    }
}
