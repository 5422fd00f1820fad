//! A1-style cell references.

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Largest column a worksheet may address (`XFD`).
pub const MAX_COL: u32 = 16_384;
/// Largest row a worksheet may address.
pub const MAX_ROW: u32 = 1_048_576;

/// 1-based row/column position of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse `AC10` or `$AC$10`.
    pub fn parse(a1: &str) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidCellRef(a1.to_string());
        let cleaned: String = a1.trim().chars().filter(|c| *c != '$').collect();

        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (letters, digits) = cleaned.split_at(split);

        let col = column_number(letters).ok_or_else(invalid)?;
        let row: u32 = digits.parse().map_err(|_| invalid())?;
        if row == 0 || row > MAX_ROW {
            return Err(invalid());
        }
        Ok(Self { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

impl FromStr for CellRef {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::parse(s)
    }
}

/// `A` → 1, `Z` → 26, `AA` → 27. Case-insensitive.
pub fn column_number(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    (col <= MAX_COL).then_some(col)
}

/// 1 → `A`, 27 → `AA`.
pub fn column_letters(mut col: u32) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_references() {
        assert_eq!(CellRef::parse("A1").unwrap(), CellRef::new(1, 1));
        assert_eq!(CellRef::parse("AC10").unwrap(), CellRef::new(10, 29));
        assert_eq!(CellRef::parse("$H$8").unwrap(), CellRef::new(8, 8));
        assert_eq!("xfd1048576".parse::<CellRef>().unwrap(), CellRef::new(MAX_ROW, MAX_COL));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "A", "10", "A0", "1A", "A-1", "XFE1", "ABCD1"] {
            assert!(CellRef::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn column_letters_round_trip() {
        for (n, letters) in [(1, "A"), (26, "Z"), (27, "AA"), (28, "AB"), (52, "AZ"), (703, "AAA")] {
            assert_eq!(column_letters(n), letters);
            assert_eq!(column_number(letters), Some(n));
        }
        assert_eq!(CellRef::new(9, 29).to_string(), "AC9");
    }
}
