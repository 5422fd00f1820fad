//! Worksheet cell model.
//!
//! Only `<sheetData>` is modelled. Everything before it (sheet views, column
//! widths, formats) and after it (merges, page setup, hyperlinks) is kept as
//! raw XML and written back untouched, which is what preserves template
//! formatting across a fill.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use regex::Regex;

use super::cell_ref::CellRef;
use super::package::escape_attr;
use crate::error::{EngineError, Result};
use crate::record::FieldValue;

static SHEET_DATA_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<((?:[A-Za-z_][\w.-]*:)?)sheetData\b[^>]*?(/?)>").unwrap());

static MERGE_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:[A-Za-z_][\w.-]*:)?mergeCell\b[^>]*?\bref\s*=\s*"([^"]+)""#).unwrap()
});

static TAB_SELECTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+tabSelected\s*=\s*"[^"]*""#).unwrap());

static SHEET_VIEW_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<((?:[A-Za-z_][\w.-]*:)?sheetView)\b").unwrap());

static EMPTY_VALUE: CellValue = CellValue::Empty;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Value held by one cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
    Formula {
        formula: String,
        /// Attributes of `<f>` (shared/array formula bookkeeping).
        attrs: Vec<(String, String)>,
        cached: Option<String>,
        cached_type: Option<String>,
    },
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Cell value for a record field: numbers stay numeric, the rest is text.
    pub fn from_field(value: &FieldValue) -> Self {
        match value {
            FieldValue::Empty => CellValue::Empty,
            FieldValue::Bool(b) => CellValue::Bool(*b),
            FieldValue::Integer(i) => CellValue::Number(*i as f64),
            FieldValue::Float(f) => CellValue::Number(*f),
            FieldValue::Text(s) if s.is_empty() => CellValue::Empty,
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub value: CellValue,
    /// Index into the workbook's cell formats (`s` attribute).
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    /// Row attributes other than `r` and `spans` (height, style, hidden...).
    attrs: Vec<(String, String)>,
    cells: BTreeMap<u32, Cell>,
}

/// One worksheet part.
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    head: String,
    /// Namespace prefix used by the part, e.g. `x:` (usually empty).
    prefix: String,
    rows: BTreeMap<u32, Row>,
    tail: String,
}

impl Worksheet {
    /// Parse a worksheet part. `shared_strings` resolves `t="s"` cells.
    pub fn parse(part: &str, xml: &str, shared_strings: &[String]) -> Result<Self> {
        let open = SHEET_DATA_OPEN_RE
            .captures(xml)
            .ok_or_else(|| EngineError::malformed(part, "no <sheetData> element"))?;
        let whole = open.get(0).map(|m| m.range()).unwrap_or_default();
        let prefix = open.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
        let self_closing = open.get(2).is_some_and(|m| !m.as_str().is_empty());

        let head = xml[..whole.start].to_string();
        let (body, tail) = if self_closing {
            ("", xml[whole.end..].to_string())
        } else {
            let close = format!("</{prefix}sheetData>");
            let rest = &xml[whole.end..];
            let end = rest
                .find(&close)
                .ok_or_else(|| EngineError::malformed(part, "unterminated <sheetData>"))?;
            (&rest[..end], rest[end + close.len()..].to_string())
        };

        let rows = parse_sheet_data(part, body, shared_strings)?;
        Ok(Self {
            head,
            prefix,
            rows,
            tail,
        })
    }

    /// An empty sheet carrying the given merged ranges.
    pub fn blank(merged: &[String]) -> Self {
        let head = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{MAIN_NS}" xmlns:r="{REL_NS}">"#
        );
        let mut tail = String::new();
        if !merged.is_empty() {
            tail.push_str(&format!(r#"<mergeCells count="{}">"#, merged.len()));
            for range in merged {
                tail.push_str(&format!(r#"<mergeCell ref="{}"/>"#, escape_attr(range)));
            }
            tail.push_str("</mergeCells>");
        }
        tail.push_str("</worksheet>");
        Self {
            head,
            prefix: String::new(),
            rows: BTreeMap::new(),
            tail,
        }
    }

    pub fn merged_ranges(&self) -> Vec<String> {
        MERGE_CELL_RE
            .captures_iter(&self.tail)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Mark or unmark the sheet as a selected tab.
    pub fn set_tab_selected(&mut self, selected: bool) {
        let cleared = TAB_SELECTED_RE.replace_all(&self.head, "").into_owned();
        self.head = if selected {
            SHEET_VIEW_OPEN_RE
                .replace(&cleared, r#"<$1 tabSelected="1""#)
                .into_owned()
        } else {
            cleared
        };
    }

    pub fn is_tab_selected(&self) -> bool {
        TAB_SELECTED_RE
            .find_iter(&self.head)
            .any(|m| m.as_str().contains("\"1\"") || m.as_str().contains("\"true\""))
    }

    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.rows.get(&at.row).and_then(|r| r.cells.get(&at.col))
    }

    pub fn value(&self, at: CellRef) -> &CellValue {
        self.cell(at).map(|c| &c.value).unwrap_or(&EMPTY_VALUE)
    }

    /// Value at an A1 reference; invalid references read as empty.
    pub fn value_a1(&self, a1: &str) -> &CellValue {
        match CellRef::parse(a1) {
            Ok(at) => self.value(at),
            Err(_) => &EMPTY_VALUE,
        }
    }

    /// Write a value, keeping the cell's existing style.
    pub fn set_value(&mut self, at: CellRef, value: impl Into<CellValue>) {
        let row = self.rows.entry(at.row).or_default();
        row.cells.entry(at.col).or_default().value = value.into();
    }

    pub fn set(&mut self, a1: &str, value: impl Into<CellValue>) -> Result<()> {
        let at = CellRef::parse(a1)?;
        self.set_value(at, value);
        Ok(())
    }

    /// Every populated cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.rows.iter().flat_map(|(&row, r)| {
            r.cells
                .iter()
                .map(move |(&col, cell)| (CellRef::new(row, col), cell))
        })
    }

    /// Mutable access to every text cell.
    pub fn text_cells_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.rows
            .values_mut()
            .flat_map(|r| r.cells.values_mut())
            .filter_map(|cell| match &mut cell.value {
                CellValue::Text(s) => Some(s),
                _ => None,
            })
    }

    pub fn to_xml(&self) -> String {
        let p = &self.prefix;
        let mut out = String::with_capacity(self.head.len() + self.tail.len() + self.rows.len() * 128);
        out.push_str(&self.head);
        out.push_str(&format!("<{p}sheetData>"));
        for (&r, row) in &self.rows {
            out.push_str(&format!(r#"<{p}row r="{r}""#));
            push_attrs(&mut out, &row.attrs);
            if row.cells.is_empty() {
                out.push_str("/>");
                continue;
            }
            out.push('>');
            for (&c, cell) in &row.cells {
                write_cell(&mut out, p, CellRef::new(r, c), cell);
            }
            out.push_str(&format!("</{p}row>"));
        }
        out.push_str(&format!("</{p}sheetData>"));
        out.push_str(&self.tail);
        out
    }
}

/// `xl/sharedStrings.xml` → plain strings. Phonetic runs are skipped.
pub fn parse_shared_strings(part: &str, xml: &str) -> Result<Vec<String>> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event().map_err(|e| EngineError::xml(part, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_t = false,
                _ => {}
            },
            Event::Text(t) if in_t => {
                let text = t.unescape().map_err(|e| EngineError::xml(part, e))?;
                if let Some(s) = current.as_mut() {
                    s.push_str(&text);
                }
            }
            Event::CData(t) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

/// Which child of `<c>` text is being collected for.
#[derive(Clone, Copy, PartialEq)]
enum Slot {
    None,
    Value,
    Formula,
    InlineText,
}

struct PendingCell {
    at: CellRef,
    kind: Option<String>,
    style: Option<String>,
    v: Option<String>,
    formula: Option<(String, Vec<(String, String)>)>,
    inline: Option<String>,
}

fn parse_sheet_data(part: &str, body: &str, shared: &[String]) -> Result<BTreeMap<u32, Row>> {
    let mut reader = XmlReader::from_str(body);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut rows: BTreeMap<u32, Row> = BTreeMap::new();
    let mut row_no = 0u32;
    let mut last_col = 0u32;
    let mut cell: Option<PendingCell> = None;
    let mut slot = Slot::None;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event().map_err(|e| EngineError::xml(part, e))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_no = open_row(part, &e, row_no, &mut rows)?;
                    last_col = 0;
                }
                b"c" => {
                    let pending = open_cell(part, &e, row_no, last_col)?;
                    last_col = pending.at.col;
                    cell = Some(pending);
                }
                b"v" => slot = Slot::Value,
                b"f" => {
                    if let Some(c) = cell.as_mut() {
                        c.formula = Some((String::new(), attrs_of(part, &e, &[])?));
                    }
                    slot = Slot::Formula;
                }
                b"is" => {
                    if let Some(c) = cell.as_mut() {
                        c.inline = Some(String::new());
                    }
                }
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => slot = Slot::InlineText,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_no = open_row(part, &e, row_no, &mut rows)?;
                    last_col = 0;
                }
                b"c" => {
                    let pending = open_cell(part, &e, row_no, last_col)?;
                    last_col = pending.at.col;
                    finish_cell(pending, shared, &mut rows);
                }
                b"f" => {
                    if let Some(c) = cell.as_mut() {
                        c.formula = Some((String::new(), attrs_of(part, &e, &[])?));
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some(pending) = cell.take() {
                        finish_cell(pending, shared, &mut rows);
                    }
                    slot = Slot::None;
                }
                b"v" | b"f" | b"t" => slot = Slot::None,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Text(t) => {
                if slot != Slot::None {
                    let text = t.unescape().map_err(|e| EngineError::xml(part, e))?;
                    collect_text(&mut cell, slot, &text);
                }
            }
            Event::CData(t) => {
                if slot != Slot::None {
                    collect_text(&mut cell, slot, &String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

fn open_row(
    part: &str,
    e: &BytesStart<'_>,
    previous: u32,
    rows: &mut BTreeMap<u32, Row>,
) -> Result<u32> {
    let mut r = None;
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| EngineError::xml(part, err))?;
        if attr.key.as_ref() == b"r" {
            let raw = attr.unescape_value().map_err(|err| EngineError::xml(part, err))?;
            r = raw.trim().parse::<u32>().ok();
        }
    }
    let row_no = r.unwrap_or(previous + 1);
    let attrs = attrs_of(part, e, &[b"r", b"spans"])?;
    rows.entry(row_no).or_default().attrs = attrs;
    Ok(row_no)
}

fn open_cell(part: &str, e: &BytesStart<'_>, row_no: u32, last_col: u32) -> Result<PendingCell> {
    let mut pending = PendingCell {
        at: CellRef::new(row_no.max(1), last_col + 1),
        kind: None,
        style: None,
        v: None,
        formula: None,
        inline: None,
    };
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| EngineError::xml(part, err))?;
        let value = attr
            .unescape_value()
            .map_err(|err| EngineError::xml(part, err))?
            .into_owned();
        match attr.key.as_ref() {
            b"r" => {
                if let Ok(at) = CellRef::parse(&value) {
                    pending.at = at;
                }
            }
            b"t" => pending.kind = Some(value),
            b"s" => pending.style = Some(value),
            _ => {}
        }
    }
    Ok(pending)
}

fn collect_text(cell: &mut Option<PendingCell>, slot: Slot, text: &str) {
    let Some(c) = cell.as_mut() else {
        return;
    };
    match slot {
        Slot::Value => c.v.get_or_insert_with(String::new).push_str(text),
        Slot::Formula => {
            if let Some((formula, _)) = c.formula.as_mut() {
                formula.push_str(text);
            }
        }
        Slot::InlineText => c.inline.get_or_insert_with(String::new).push_str(text),
        Slot::None => {}
    }
}

fn finish_cell(pending: PendingCell, shared: &[String], rows: &mut BTreeMap<u32, Row>) {
    let PendingCell {
        at,
        kind,
        style,
        v,
        formula,
        inline,
    } = pending;

    let value = match (formula, kind.as_deref()) {
        (Some((formula, attrs)), _) => CellValue::Formula {
            formula,
            attrs,
            cached: v,
            cached_type: kind.clone(),
        },
        (None, Some("s")) => v
            .and_then(|idx| idx.trim().parse::<usize>().ok())
            .and_then(|idx| shared.get(idx).cloned())
            .map(CellValue::Text)
            .unwrap_or_default(),
        (None, Some("inlineStr")) => inline.map(CellValue::Text).unwrap_or_default(),
        (None, Some("str")) => CellValue::Text(v.unwrap_or_default()),
        (None, Some("b")) => CellValue::Bool(v.is_some_and(|b| matches!(b.trim(), "1" | "true"))),
        (None, Some("e")) => CellValue::Error(v.unwrap_or_default()),
        (None, _) => match v {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(raw),
            },
            None => CellValue::Empty,
        },
    };

    rows.entry(at.row)
        .or_default()
        .cells
        .insert(at.col, Cell { value, style });
}

fn attrs_of(part: &str, e: &BytesStart<'_>, skip: &[&[u8]]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| EngineError::xml(part, err))?;
        if skip.contains(&attr.key.as_ref()) {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| EngineError::xml(part, err))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn push_attrs(out: &mut String, attrs: &[(String, String)]) {
    for (k, v) in attrs {
        out.push_str(&format!(r#" {k}="{}""#, escape_attr(v)));
    }
}

fn write_cell(out: &mut String, p: &str, at: CellRef, cell: &Cell) {
    out.push_str(&format!(r#"<{p}c r="{at}""#));
    if let Some(style) = &cell.style {
        out.push_str(&format!(r#" s="{}""#, escape_attr(style)));
    }
    match &cell.value {
        CellValue::Empty => out.push_str("/>"),
        CellValue::Number(n) => out.push_str(&format!("><{p}v>{n}</{p}v></{p}c>")),
        CellValue::Text(s) if s.is_empty() => out.push_str("/>"),
        CellValue::Text(s) => out.push_str(&format!(
            r#" t="inlineStr"><{p}is><{p}t xml:space="preserve">{}</{p}t></{p}is></{p}c>"#,
            escape_text(s)
        )),
        CellValue::Bool(b) => out.push_str(&format!(
            r#" t="b"><{p}v>{}</{p}v></{p}c>"#,
            u8::from(*b)
        )),
        CellValue::Error(e) => out.push_str(&format!(
            r#" t="e"><{p}v>{}</{p}v></{p}c>"#,
            escape_text(e)
        )),
        CellValue::Formula {
            formula,
            attrs,
            cached,
            cached_type,
        } => {
            if let Some(t) = cached_type {
                out.push_str(&format!(r#" t="{}""#, escape_attr(t)));
            }
            out.push_str(&format!("><{p}f"));
            push_attrs(out, attrs);
            if formula.is_empty() {
                out.push_str("/>");
            } else {
                out.push_str(&format!(">{}</{p}f>", escape_text(formula)));
            }
            if let Some(v) = cached {
                out.push_str(&format!("<{p}v>{}</{p}v>", escape_text(v)));
            }
            out.push_str(&format!("</{p}c>"));
        }
    }
}

/// Escape for element content, dropping characters XML 1.0 cannot carry.
fn escape_text(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .filter(|&c| !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews><cols><col min="1" max="1" width="30"/></cols><sheetData><row r="1" spans="1:3" ht="20" customHeight="1"><c r="A1" s="4" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>Hi {Name}</t></is></c><c r="C1"><v>42</v></c></row><row r="3"><c r="A3" t="b"><v>1</v></c><c r="B3"><f>SUM(C1:C2)</f><v>42</v></c><c r="C3" s="2"/></row></sheetData><mergeCells count="1"><mergeCell ref="A5:C5"/></mergeCells></worksheet>"#;

    fn shared() -> Vec<String> {
        vec!["Name: {Name} & co".to_string()]
    }

    #[test]
    fn parses_cell_kinds() {
        let ws = Worksheet::parse("sheet1.xml", SHEET, &shared()).unwrap();
        assert_eq!(ws.value_a1("A1"), &CellValue::Text("Name: {Name} & co".into()));
        assert_eq!(ws.cell(CellRef::new(1, 1)).unwrap().style.as_deref(), Some("4"));
        assert_eq!(ws.value_a1("B1"), &CellValue::Text("Hi {Name}".into()));
        assert_eq!(ws.value_a1("C1"), &CellValue::Number(42.0));
        assert_eq!(ws.value_a1("A3"), &CellValue::Bool(true));
        assert!(matches!(ws.value_a1("B3"), CellValue::Formula { formula, .. } if formula == "SUM(C1:C2)"));
        assert_eq!(ws.value_a1("C3"), &CellValue::Empty);
        assert_eq!(ws.merged_ranges(), vec!["A5:C5".to_string()]);
        assert!(ws.is_tab_selected());
    }

    #[test]
    fn writes_back_and_keeps_surroundings() {
        let mut ws = Worksheet::parse("sheet1.xml", SHEET, &shared()).unwrap();
        ws.set("C3", "x < y").unwrap();
        ws.set("D10", 5.5).unwrap();
        let xml = ws.to_xml();

        assert!(xml.contains(r#"<col min="1" max="1" width="30"/>"#));
        assert!(xml.contains(r#"<mergeCell ref="A5:C5"/>"#));
        assert!(xml.contains(r#"<row r="1" ht="20" customHeight="1">"#));
        assert!(xml.contains("x &lt; y"));

        let reparsed = Worksheet::parse("sheet1.xml", &xml, &[]).unwrap();
        assert_eq!(reparsed.value_a1("A1"), &CellValue::Text("Name: {Name} & co".into()));
        assert_eq!(reparsed.value_a1("C3"), &CellValue::Text("x < y".into()));
        assert_eq!(reparsed.cell(CellRef::new(3, 3)).unwrap().style.as_deref(), Some("2"));
        assert_eq!(reparsed.value_a1("D10"), &CellValue::Number(5.5));
        assert!(matches!(reparsed.value_a1("B3"), CellValue::Formula { cached: Some(v), .. } if v == "42"));
    }

    #[test]
    fn handles_self_closing_sheet_data_and_prefixes() {
        let xml = r#"<x:worksheet xmlns:x="urn:main"><x:sheetData/></x:worksheet>"#;
        let mut ws = Worksheet::parse("s.xml", xml, &[]).unwrap();
        ws.set("A1", "v").unwrap();
        let out = ws.to_xml();
        assert!(out.contains("<x:sheetData><x:row r=\"1\"><x:c r=\"A1\" t=\"inlineStr\">"));
        assert!(out.ends_with("</x:sheetData></x:worksheet>"));
    }

    #[test]
    fn positions_cells_without_references() {
        let xml = r#"<worksheet><sheetData><row><c><v>1</v></c><c><v>2</v></c></row><row><c t="inlineStr"><is><t>z</t></is></c></row></sheetData></worksheet>"#;
        let ws = Worksheet::parse("s.xml", xml, &[]).unwrap();
        assert_eq!(ws.value_a1("A1"), &CellValue::Number(1.0));
        assert_eq!(ws.value_a1("B1"), &CellValue::Number(2.0));
        assert_eq!(ws.value_a1("A2"), &CellValue::Text("z".into()));
    }

    #[test]
    fn tab_selection_toggles() {
        let mut ws = Worksheet::parse("sheet1.xml", SHEET, &shared()).unwrap();
        ws.set_tab_selected(false);
        assert!(!ws.is_tab_selected());
        ws.set_tab_selected(true);
        assert!(ws.to_xml().contains(r#"<sheetView tabSelected="1" workbookViewId="0"/>"#));
    }

    #[test]
    fn shared_strings_skip_phonetic_runs() {
        let xml = r#"<sst><si><t>plain</t></si><si><r><t>rich </t></r><r><t>text</t></r><rPh><t>ignored</t></rPh></si><si/></sst>"#;
        let strings = parse_shared_strings("sst.xml", xml).unwrap();
        assert_eq!(strings, vec!["plain", "rich text", ""]);
    }

    #[test]
    fn blank_sheet_carries_merges() {
        let ws = Worksheet::blank(&["A1:B2".to_string(), "C1:D1".to_string()]);
        let reparsed = Worksheet::parse("s.xml", &ws.to_xml(), &[]).unwrap();
        assert_eq!(reparsed.merged_ranges(), vec!["A1:B2", "C1:D1"]);
        assert_eq!(reparsed.cells().count(), 0);
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(escape_text("a\u{1}b\tc"), "ab\tc");
    }
}
