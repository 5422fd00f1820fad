//! Spreadsheet workbook on top of [`Package`].
//!
//! All worksheets are parsed when the workbook is opened. Saving regenerates
//! `<sheets>` in `workbook.xml`, remaps sheet-local defined names, drops the
//! calculation chain and asks the consumer to recalculate on load.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};

use super::package::{
    content_type, rel_type, relative_target, resolve_target, ContentTypes, Package,
    Relationships,
};
use super::worksheet::{parse_shared_strings, Worksheet};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    sheet_id: u32,
    rel_id: String,
    part: String,
    /// `state` attribute (`hidden`, `veryHidden`).
    state: Option<String>,
    /// Position in the template's `<sheets>`; `None` for sheets added since.
    original_index: Option<usize>,
    pub worksheet: Worksheet,
}

impl Sheet {
    pub fn part(&self) -> &str {
        &self.part
    }
}

#[derive(Debug, Clone)]
pub struct Workbook {
    package: Package,
    workbook_part: String,
    rels: Relationships,
    sheets: Vec<Sheet>,
    active: usize,
    /// Qualified name used for the relationship id on `<sheet>`, e.g. `r:id`.
    rel_attr: String,
    /// Written back to the package on save.
    content_types: ContentTypes,
    /// Next free number per `(prefix, suffix)` part-name pattern.
    part_counters: HashMap<(String, String), u32>,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_package(Package::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    pub fn from_package(package: Package) -> Result<Self> {
        let workbook_part = package.main_document_part()?;
        let rels = package.relationships(&workbook_part)?;
        let content_types = package.content_types()?;

        let shared_strings = match rels
            .iter()
            .find(|r| rel_type::is(&r.kind, rel_type::SHARED_STRINGS))
        {
            Some(rel) => {
                let part = resolve_target(&workbook_part, &rel.target);
                match package.part_str(&part) {
                    Ok(xml) => parse_shared_strings(&part, xml)?,
                    Err(EngineError::MissingPart(_)) => Vec::new(),
                    Err(e) => return Err(e),
                }
            }
            None => Vec::new(),
        };

        let listing = read_workbook_xml(&workbook_part, package.part_str(&workbook_part)?)?;
        let mut sheets = Vec::with_capacity(listing.sheets.len());
        for (idx, entry) in listing.sheets.into_iter().enumerate() {
            let rel = rels.get(&entry.rel_id).ok_or_else(|| {
                EngineError::malformed(
                    &workbook_part,
                    format!("sheet '{}' has no relationship {}", entry.name, entry.rel_id),
                )
            })?;
            let part = resolve_target(&workbook_part, &rel.target);
            let worksheet = Worksheet::parse(&part, package.part_str(&part)?, &shared_strings)?;
            sheets.push(Sheet {
                name: entry.name,
                sheet_id: entry.sheet_id,
                rel_id: entry.rel_id,
                part,
                state: entry.state,
                original_index: Some(idx),
                worksheet,
            });
        }

        if sheets.is_empty() {
            return Err(EngineError::EmptyWorkbook);
        }
        let active = listing.active.min(sheets.len() - 1);

        tracing::debug!(
            part = %workbook_part,
            sheets = sheets.len(),
            active,
            "opened workbook"
        );

        Ok(Self {
            package,
            workbook_part,
            rels,
            sheets,
            active,
            rel_attr: listing.rel_attr,
            content_types,
            part_counters: HashMap::new(),
        })
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn content_types_mut(&mut self) -> &mut ContentTypes {
        &mut self.content_types
    }

    /// Reserve a fresh `{prefix}{n}{suffix}` part name. Numbering continues
    /// past the highest one in the package and never hands out a name twice.
    pub fn next_part_name(&mut self, prefix: &str, suffix: &str) -> String {
        let package = &self.package;
        let next = self
            .part_counters
            .entry((prefix.to_string(), suffix.to_string()))
            .or_insert_with(|| package.highest_part_number(prefix, suffix) + 1);
        loop {
            let name = format!("{prefix}{next}{suffix}");
            *next += 1;
            if !package.has_part(&name) {
                return name;
            }
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn set_active(&mut self, idx: usize) {
        if idx < self.sheets.len() {
            self.active = idx;
        }
    }

    pub fn sheet(&self, idx: usize) -> Option<&Sheet> {
        self.sheets.get(idx)
    }

    pub fn worksheet(&self, idx: usize) -> Option<&Worksheet> {
        self.sheets.get(idx).map(|s| &s.worksheet)
    }

    pub fn worksheet_mut(&mut self, idx: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(idx).map(|s| &mut s.worksheet)
    }

    pub fn worksheet_by_name_mut(&mut self, name: &str) -> Result<&mut Worksheet> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .map(|s| &mut s.worksheet)
            .ok_or_else(|| EngineError::SheetNotFound(name.to_string()))
    }

    /// Append a worksheet as a new part. `rels` become the part's own
    /// relationships, with targets relative to the new part.
    ///
    /// Titles are not checked for uniqueness here.
    pub fn add_worksheet(
        &mut self,
        title: &str,
        worksheet: Worksheet,
        rels: Option<Relationships>,
    ) -> Result<usize> {
        let dir = match self.workbook_part.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/worksheets/sheet"),
            None => "worksheets/sheet".to_string(),
        };
        let part = self.next_part_name(&dir, ".xml");

        let target = relative_target(&self.workbook_part, &part);
        let rel_id = self.rels.add(rel_type::WORKSHEET_FULL, &target);
        let sheet_id = self.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;

        self.content_types
            .add_override(&part, content_type::WORKSHEET);

        // Reserve the name so the next call picks another.
        self.package.set_part(part.clone(), Vec::new());
        if let Some(rels) = rels {
            self.package.set_relationships(&part, &rels);
        }

        self.sheets.push(Sheet {
            name: title.to_string(),
            sheet_id,
            rel_id,
            part,
            state: None,
            original_index: None,
            worksheet,
        });
        Ok(self.sheets.len() - 1)
    }

    /// Remove a sheet with its part, relationships and content type.
    pub fn remove_sheet(&mut self, idx: usize) -> Result<Sheet> {
        if idx >= self.sheets.len() {
            return Err(EngineError::SheetNotFound(format!("#{idx}")));
        }
        let sheet = self.sheets.remove(idx);

        self.rels.remove(&sheet.rel_id);
        self.package.remove_part(&sheet.part);
        self.package
            .set_relationships(&sheet.part, &Relationships::default());
        self.content_types.remove_override(&sheet.part);

        if self.active > idx || self.active >= self.sheets.len() {
            self.active = self.active.saturating_sub(1);
        }
        Ok(sheet)
    }

    fn drop_calc_chain(&mut self) -> Result<()> {
        let removed = self.rels.remove_kind(rel_type::CALC_CHAIN);
        if removed.is_empty() {
            return Ok(());
        }
        for rel in removed {
            let part = resolve_target(&self.workbook_part, &rel.target);
            self.package.remove_part(&part);
            self.content_types.remove_override(&part);
        }
        Ok(())
    }

    /// Serialize the whole package. Fails on a workbook without sheets.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        if self.sheets.is_empty() {
            return Err(EngineError::EmptyWorkbook);
        }
        self.drop_calc_chain()?;

        for (idx, sheet) in self.sheets.iter_mut().enumerate() {
            sheet.worksheet.set_tab_selected(idx == self.active);
            self.package
                .set_part(sheet.part.clone(), sheet.worksheet.to_xml().into_bytes());
        }

        let xml = self.rewrite_workbook_xml()?;
        self.package.set_part(self.workbook_part.clone(), xml.into_bytes());
        self.package
            .set_relationships(&self.workbook_part, &self.rels);
        self.package.set_content_types(&self.content_types);

        self.package.to_bytes()
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        tracing::debug!(path = %path.display(), sheets = self.sheets.len(), "saved workbook");
        Ok(())
    }

    fn rewrite_workbook_xml(&self) -> Result<String> {
        let part = self.workbook_part.as_str();
        let source = self.package.part_str(part)?;
        let xml_err = |e: &dyn std::fmt::Display| EngineError::xml(part, e);

        let mut reader = XmlReader::from_str(source);
        reader.config_mut().trim_text(false);
        let mut writer = XmlWriter::new(Vec::new());

        let mut skip_depth = 0usize;
        loop {
            let event = reader.read_event().map_err(|e| xml_err(&e))?;
            if skip_depth > 0 {
                match event {
                    Event::Start(_) => skip_depth += 1,
                    Event::End(_) => skip_depth -= 1,
                    Event::Eof => break,
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(e) if e.local_name().as_ref() == b"sheets" => {
                    self.write_sheets(&mut writer, &e)?;
                    skip_depth = 1;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheets" => {
                    self.write_sheets(&mut writer, &e)?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"workbookView" => {
                    let view = self.workbook_view(&e)?;
                    writer
                        .write_event(Event::Empty(view))
                        .map_err(|e| xml_err(&e))?;
                    skip_depth = 1;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"workbookView" => {
                    let view = self.workbook_view(&e)?;
                    writer
                        .write_event(Event::Empty(view))
                        .map_err(|e| xml_err(&e))?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"definedName" => {
                    match self.remap_defined_name(&e)? {
                        Some(name) => writer
                            .write_event(Event::Start(name))
                            .map_err(|e| xml_err(&e))?,
                        None => skip_depth = 1,
                    }
                }
                Event::Empty(e) if e.local_name().as_ref() == b"definedName" => {
                    if let Some(name) = self.remap_defined_name(&e)? {
                        writer
                            .write_event(Event::Empty(name))
                            .map_err(|e| xml_err(&e))?;
                    }
                }
                Event::Empty(e) if e.local_name().as_ref() == b"calcPr" => {
                    let calc = with_attr(&e, "fullCalcOnLoad", Some("1"))?;
                    writer
                        .write_event(Event::Empty(calc))
                        .map_err(|e| xml_err(&e))?;
                }
                Event::Start(e) if e.local_name().as_ref() == b"calcPr" => {
                    let calc = with_attr(&e, "fullCalcOnLoad", Some("1"))?;
                    writer
                        .write_event(Event::Start(calc))
                        .map_err(|e| xml_err(&e))?;
                }
                Event::Eof => break,
                other => writer.write_event(other).map_err(|e| xml_err(&e))?,
            }
        }

        String::from_utf8(writer.into_inner())
            .map_err(|e| EngineError::malformed(part, e.to_string()))
    }

    fn write_sheets(&self, writer: &mut XmlWriter<Vec<u8>>, sheets_tag: &BytesStart<'_>) -> Result<()> {
        let part = self.workbook_part.as_str();
        let tag = String::from_utf8_lossy(sheets_tag.name().as_ref()).into_owned();
        let prefix = tag.strip_suffix("sheets").unwrap_or_default();
        let sheet_tag = format!("{prefix}sheet");

        writer
            .write_event(Event::Start(sheets_tag.to_owned()))
            .map_err(|e| EngineError::xml(part, e))?;
        for sheet in &self.sheets {
            let mut el = BytesStart::new(sheet_tag.as_str());
            el.push_attribute(("name", sheet.name.as_str()));
            let id = sheet.sheet_id.to_string();
            el.push_attribute(("sheetId", id.as_str()));
            if let Some(state) = &sheet.state {
                el.push_attribute(("state", state.as_str()));
            }
            el.push_attribute((self.rel_attr.as_str(), sheet.rel_id.as_str()));
            writer
                .write_event(Event::Empty(el))
                .map_err(|e| EngineError::xml(part, e))?;
        }
        writer
            .write_event(Event::End(sheets_tag.to_end().into_owned()))
            .map_err(|e| EngineError::xml(part, e))?;
        Ok(())
    }

    fn workbook_view(&self, e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
        let active = self.active.to_string();
        let view = with_attr(e, "firstSheet", None)?;
        let view = if self.active == 0 {
            with_attr(&view, "activeTab", None)?
        } else {
            with_attr(&view, "activeTab", Some(&active))?
        };
        Ok(view)
    }

    /// Point `localSheetId` at the sheet's new position, or drop the name
    /// when its sheet is gone.
    fn remap_defined_name(&self, e: &BytesStart<'_>) -> Result<Option<BytesStart<'static>>> {
        let part = self.workbook_part.as_str();
        let mut local = None;
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|err| EngineError::xml(part, err))?;
            if attr.key.as_ref() == b"localSheetId" {
                let raw = attr
                    .unescape_value()
                    .map_err(|err| EngineError::xml(part, err))?;
                local = raw.trim().parse::<usize>().ok();
            }
        }
        let Some(original) = local else {
            return Ok(Some(e.to_owned()));
        };
        match self
            .sheets
            .iter()
            .position(|s| s.original_index == Some(original))
        {
            Some(now) => Ok(Some(with_attr(e, "localSheetId", Some(&now.to_string()))?)),
            None => Ok(None),
        }
    }
}

/// Copy of `e` with attribute `key` replaced (`Some`) or removed (`None`).
fn with_attr(e: &BytesStart<'_>, key: &str, value: Option<&str>) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| EngineError::xml("attribute", err))?;
        if attr.key.as_ref() == key.as_bytes() {
            continue;
        }
        out.push_attribute(attr);
    }
    if let Some(v) = value {
        out.push_attribute((key, v));
    }
    Ok(out.into_owned())
}

struct SheetListing {
    name: String,
    sheet_id: u32,
    rel_id: String,
    state: Option<String>,
}

struct WorkbookListing {
    sheets: Vec<SheetListing>,
    active: usize,
    rel_attr: String,
}

fn read_workbook_xml(part: &str, xml: &str) -> Result<WorkbookListing> {
    let mut reader = XmlReader::from_str(xml);
    let mut listing = WorkbookListing {
        sheets: Vec::new(),
        active: 0,
        rel_attr: "r:id".to_string(),
    };
    let mut seen_view = false;

    loop {
        match reader.read_event().map_err(|e| EngineError::xml(part, e))? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut sheet = SheetListing {
                        name: String::new(),
                        sheet_id: 0,
                        rel_id: String::new(),
                        state: None,
                    };
                    for attr in e.attributes().with_checks(false) {
                        let attr = attr.map_err(|err| EngineError::xml(part, err))?;
                        let value = attr
                            .unescape_value()
                            .map_err(|err| EngineError::xml(part, err))?
                            .into_owned();
                        match (attr.key.prefix().is_some(), attr.key.local_name().as_ref()) {
                            (false, b"name") => sheet.name = value,
                            (false, b"sheetId") => sheet.sheet_id = value.trim().parse().unwrap_or(0),
                            (false, b"state") => sheet.state = Some(value),
                            (true, b"id") => {
                                listing.rel_attr =
                                    String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                                sheet.rel_id = value;
                            }
                            _ => {}
                        }
                    }
                    listing.sheets.push(sheet);
                }
                b"workbookView" if !seen_view => {
                    seen_view = true;
                    for attr in e.attributes().with_checks(false) {
                        let attr = attr.map_err(|err| EngineError::xml(part, err))?;
                        if attr.key.as_ref() == b"activeTab" {
                            let raw = attr
                                .unescape_value()
                                .map_err(|err| EngineError::xml(part, err))?;
                            listing.active = raw.trim().parse().unwrap_or(0);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(listing)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{sheet_xml, workbook_bytes};
    use super::*;

    fn three_sheet_workbook() -> Workbook {
        let bytes = workbook_bytes(
            &[
                ("First", sheet_xml(&[("A1", "one")], ""), None),
                ("Second", sheet_xml(&[("A1", "two")], ""), None),
                ("Third", sheet_xml(&[("A1", "three")], ""), None),
            ],
            1,
        );
        Workbook::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn reads_sheets_and_active_tab() {
        let wb = three_sheet_workbook();
        assert_eq!(wb.sheet_names(), vec!["First", "Second", "Third"]);
        assert_eq!(wb.active_index(), 1);
        assert_eq!(
            wb.worksheet(2).unwrap().value_a1("A1").as_text(),
            Some("three")
        );
    }

    #[test]
    fn add_and_remove_survive_a_save() {
        let mut wb = three_sheet_workbook();
        let copy = wb.worksheet(1).unwrap().clone();
        let idx = wb.add_worksheet("Copy", copy, None).unwrap();
        assert_eq!(idx, 3);
        wb.remove_sheet(0).unwrap();
        assert_eq!(wb.active_index(), 0);

        let bytes = wb.to_bytes().unwrap();
        let reopened = Workbook::from_bytes(&bytes).unwrap();
        assert_eq!(reopened.sheet_names(), vec!["Second", "Third", "Copy"]);
        assert_eq!(
            reopened.worksheet(2).unwrap().value_a1("A1").as_text(),
            Some("two")
        );

        let pkg = reopened.package();
        assert!(!pkg.has_part("xl/worksheets/sheet1.xml"));
        assert!(pkg.has_part("xl/worksheets/sheet4.xml"));
        assert!(!pkg.has_part("xl/calcChain.xml"));
        let types = pkg.content_types().unwrap();
        assert_eq!(types.override_for("xl/worksheets/sheet1.xml"), None);
        assert!(types.override_for("xl/worksheets/sheet4.xml").is_some());
        assert_eq!(types.override_for("xl/calcChain.xml"), None);

        let workbook_xml = pkg.part_str("xl/workbook.xml").unwrap();
        assert!(workbook_xml.contains(r#"fullCalcOnLoad="1""#));
        assert!(!workbook_xml.contains("firstSheet"));
        // The print area belonged to the removed sheet.
        assert!(!workbook_xml.contains("_xlnm.Print_Area"));
    }

    #[test]
    fn defined_names_follow_their_sheet() {
        let mut wb = three_sheet_workbook();
        let copy = wb.worksheet(0).unwrap().clone();
        wb.add_worksheet("Front", copy, None).unwrap();
        wb.remove_sheet(1).unwrap();

        let bytes = wb.to_bytes().unwrap();
        let reopened = Workbook::from_bytes(&bytes).unwrap();
        let workbook_xml = reopened.package().part_str("xl/workbook.xml").unwrap();
        assert!(workbook_xml.contains(r#"localSheetId="0""#));
        // The active sheet was removed; the one after it takes over.
        assert_eq!(reopened.sheet_names(), vec!["First", "Third", "Front"]);
        assert_eq!(reopened.active_index(), 1);
    }

    #[test]
    fn only_active_sheet_is_tab_selected() {
        let mut wb = three_sheet_workbook();
        let bytes = wb.to_bytes().unwrap();
        let reopened = Workbook::from_bytes(&bytes).unwrap();
        let selected: Vec<bool> = reopened
            .sheets()
            .iter()
            .map(|s| s.worksheet.is_tab_selected())
            .collect();
        assert_eq!(selected, vec![false, true, false]);
    }

    #[test]
    fn saving_an_empty_workbook_fails() {
        let mut wb = three_sheet_workbook();
        for _ in 0..3 {
            wb.remove_sheet(0).unwrap();
        }
        assert!(matches!(wb.to_bytes(), Err(EngineError::EmptyWorkbook)));
    }

    #[test]
    fn missing_sheet_lookup_is_an_input_error() {
        let mut wb = three_sheet_workbook();
        let err = wb.worksheet_by_name_mut("PRODUCTION").unwrap_err();
        assert!(err.is_input_error());
    }
}
