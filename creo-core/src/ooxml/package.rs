//! OPC package access: zip parts, relationships and content types.
//!
//! A [`Package`] holds every part of an `.xlsx` / `.pptx` file in memory, in
//! archive order. Parts are edited as bytes and written back with a fixed
//! entry timestamp, so the same content always produces the same archive.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{EngineError, Result};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const ROOT_RELS_PART: &str = "_rels/.rels";

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Relationship type suffixes. Producers disagree on the schema prefix
/// (transitional vs. strict), so types are matched on the last segment.
pub mod rel_type {
    pub const OFFICE_DOCUMENT: &str = "/officeDocument";
    pub const WORKSHEET: &str = "/worksheet";
    pub const SHARED_STRINGS: &str = "/sharedStrings";
    pub const CALC_CHAIN: &str = "/calcChain";
    pub const PRINTER_SETTINGS: &str = "/printerSettings";
    pub const HYPERLINK: &str = "/hyperlink";
    pub const SLIDE: &str = "/slide";

    pub const WORKSHEET_FULL: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    pub const PRINTER_SETTINGS_FULL: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/printerSettings";

    pub fn is(kind: &str, suffix: &str) -> bool {
        kind.ends_with(suffix)
    }
}

pub mod content_type {
    pub const WORKSHEET: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
    pub const PRINTER_SETTINGS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.printerSettings";
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
}

/// In-memory zip package.
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: Vec<(String, Vec<u8>)>,
    /// Part name to position in `parts`.
    index: HashMap<String, usize>,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut package = Self::default();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches('/').to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            if !package.has_part(&name) {
                package.set_part(name, data);
            }
        }
        Ok(package)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let &pos = self.index.get(name)?;
        self.parts.get(pos).map(|(_, data)| data.as_slice())
    }

    /// Part decoded as UTF-8, with any byte-order mark dropped.
    pub fn part_str(&self, name: &str) -> Result<&str> {
        let bytes = self
            .part(name)
            .ok_or_else(|| EngineError::MissingPart(name.to_string()))?;
        let text = std::str::from_utf8(bytes)
            .map_err(|e| EngineError::malformed(name, e.to_string()))?;
        Ok(text.trim_start_matches('\u{feff}'))
    }

    /// Insert or replace a part. New parts are appended.
    pub fn set_part(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&pos) => self.parts[pos].1 = data,
            None => {
                self.index.insert(name.clone(), self.parts.len());
                self.parts.push((name, data));
            }
        }
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let pos = self.index.remove(name)?;
        let (_, data) = self.parts.remove(pos);
        for (n, _) in &self.parts[pos..] {
            if let Some(at) = self.index.get_mut(n) {
                *at -= 1;
            }
        }
        Some(data)
    }

    pub fn relationships(&self, source_part: &str) -> Result<Relationships> {
        let rels_part = rels_part_for(source_part);
        if !self.has_part(&rels_part) {
            return Ok(Relationships::default());
        }
        Relationships::parse(&rels_part, self.part_str(&rels_part)?)
    }

    /// Store `rels` for `source_part`, dropping the part when empty.
    pub fn set_relationships(&mut self, source_part: &str, rels: &Relationships) {
        let rels_part = rels_part_for(source_part);
        if rels.is_empty() {
            self.remove_part(&rels_part);
        } else {
            self.set_part(rels_part, rels.to_xml().into_bytes());
        }
    }

    pub fn content_types(&self) -> Result<ContentTypes> {
        ContentTypes::parse(self.part_str(CONTENT_TYPES_PART)?)
    }

    pub fn set_content_types(&mut self, types: &ContentTypes) {
        self.set_part(CONTENT_TYPES_PART, types.to_xml().into_bytes());
    }

    /// Part targeted by the package-level `officeDocument` relationship.
    pub fn main_document_part(&self) -> Result<String> {
        let rels = self.relationships("")?;
        let found = rels
            .iter()
            .find(|r| rel_type::is(&r.kind, rel_type::OFFICE_DOCUMENT) && !r.is_external())
            .map(|r| resolve_target("", &r.target))
            .ok_or_else(|| EngineError::MissingPart("officeDocument relationship".into()));
        found
    }

    /// Highest `n` among parts named `{prefix}{n}{suffix}`, 0 if none.
    pub fn highest_part_number(&self, prefix: &str, suffix: &str) -> u32 {
        self.part_names()
            .filter_map(|name| name.strip_prefix(prefix)?.strip_suffix(suffix)?.parse().ok())
            .max()
            .unwrap_or(0)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        // Content types must be the first entry for some consumers.
        let ordered = self
            .parts
            .iter()
            .filter(|(n, _)| n == CONTENT_TYPES_PART)
            .chain(self.parts.iter().filter(|(n, _)| n != CONTENT_TYPES_PART));

        for (name, data) in ordered {
            writer.start_file(name.as_str(), entry_options())?;
            writer.write_all(data)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

/// `xl/workbook.xml` → `xl/_rels/workbook.xml.rels`; `""` → `_rels/.rels`.
pub fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None if part.is_empty() => ROOT_RELS_PART.to_string(),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns it.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Target of `part` written relative to the directory of `source_part`.
pub fn relative_target(source_part: &str, part: &str) -> String {
    let base: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let target: Vec<&str> = part.split('/').collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out: Vec<&str> = vec![".."; base.len() - common];
    out.extend_from_slice(&target[common..]);
    out.join("/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub kind: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode.as_deref() == Some("External")
    }
}

/// Contents of one `.rels` part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(part: &str, xml: &str) -> Result<Self> {
        let mut reader = XmlReader::from_str(xml);
        let mut items = Vec::new();
        loop {
            match reader.read_event().map_err(|e| EngineError::xml(part, e))? {
                Event::Start(e) | Event::Empty(e)
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let mut rel = Relationship {
                        id: String::new(),
                        kind: String::new(),
                        target: String::new(),
                        target_mode: None,
                    };
                    for attr in e.attributes().with_checks(false) {
                        let attr = attr.map_err(|err| EngineError::xml(part, err))?;
                        let value = attr
                            .unescape_value()
                            .map_err(|err| EngineError::xml(part, err))?
                            .into_owned();
                        match attr.key.local_name().as_ref() {
                            b"Id" => rel.id = value,
                            b"Type" => rel.kind = value,
                            b"Target" => rel.target = value,
                            b"TargetMode" => rel.target_mode = Some(value),
                            _ => {}
                        }
                    }
                    items.push(rel);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(Self { items })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.items.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add an internal relationship under a fresh `rIdN` and return the id.
    pub fn add(&mut self, kind: &str, target: &str) -> String {
        let id = (1u32..)
            .map(|n| format!("rId{n}"))
            .find(|candidate| self.get(candidate).is_none())
            .unwrap_or_default();
        self.items.push(Relationship {
            id: id.clone(),
            kind: kind.to_string(),
            target: target.to_string(),
            target_mode: None,
        });
        id
    }

    pub fn push(&mut self, rel: Relationship) {
        self.items.push(rel);
    }

    pub fn remove(&mut self, id: &str) -> Option<Relationship> {
        let idx = self.items.iter().position(|r| r.id == id)?;
        Some(self.items.remove(idx))
    }

    /// Drop every relationship of the given type suffix.
    pub fn remove_kind(&mut self, suffix: &str) -> Vec<Relationship> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|r| rel_type::is(&r.kind, suffix));
        self.items = kept;
        removed
    }

    pub fn to_xml(&self) -> String {
        let mut out = format!(r#"{XML_DECL}<Relationships xmlns="{RELS_NS}">"#);
        for rel in &self.items {
            out.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}""#,
                escape_attr(&rel.id),
                escape_attr(&rel.kind),
                escape_attr(&rel.target)
            ));
            if let Some(mode) = &rel.target_mode {
                out.push_str(&format!(r#" TargetMode="{}""#, escape_attr(mode)));
            }
            out.push_str("/>");
        }
        out.push_str("</Relationships>");
        out
    }
}

/// `[Content_Types].xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = XmlReader::from_str(xml);
        let mut types = Self::default();
        loop {
            match reader
                .read_event()
                .map_err(|e| EngineError::xml(CONTENT_TYPES_PART, e))?
            {
                Event::Start(e) | Event::Empty(e) => {
                    let local = e.local_name();
                    let (key_attr, list) = match local.as_ref() {
                        b"Default" => (&b"Extension"[..], &mut types.defaults),
                        b"Override" => (&b"PartName"[..], &mut types.overrides),
                        _ => continue,
                    };
                    let mut key = String::new();
                    let mut value = String::new();
                    for attr in e.attributes().with_checks(false) {
                        let attr = attr.map_err(|err| EngineError::xml(CONTENT_TYPES_PART, err))?;
                        let v = attr
                            .unescape_value()
                            .map_err(|err| EngineError::xml(CONTENT_TYPES_PART, err))?
                            .into_owned();
                        if attr.key.as_ref() == key_attr {
                            key = v;
                        } else if attr.key.as_ref() == b"ContentType" {
                            value = v;
                        }
                    }
                    list.push((key, value));
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(types)
    }

    pub fn has_default(&self, extension: &str) -> bool {
        self.defaults
            .iter()
            .any(|(ext, _)| ext.eq_ignore_ascii_case(extension))
    }

    pub fn override_for(&self, part: &str) -> Option<&str> {
        let name = format!("/{part}");
        self.overrides
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(&name))
            .map(|(_, ct)| ct.as_str())
    }

    pub fn add_override(&mut self, part: &str, content_type: &str) {
        let name = format!("/{part}");
        self.overrides.retain(|(p, _)| !p.eq_ignore_ascii_case(&name));
        self.overrides.push((name, content_type.to_string()));
    }

    pub fn remove_override(&mut self, part: &str) {
        let name = format!("/{part}");
        self.overrides.retain(|(p, _)| !p.eq_ignore_ascii_case(&name));
    }

    pub fn to_xml(&self) -> String {
        let mut out = format!(r#"{XML_DECL}<Types xmlns="{CONTENT_TYPES_NS}">"#);
        for (ext, ct) in &self.defaults {
            out.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_attr(ext),
                escape_attr(ct)
            ));
        }
        for (part, ct) in &self.overrides {
            out.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_attr(part),
                escape_attr(ct)
            ));
        }
        out.push_str("</Types>");
        out
    }
}

pub(crate) fn escape_attr(value: &str) -> std::borrow::Cow<'_, str> {
    quick_xml::escape::escape(value)
}

/// Minimal package writer for building fixtures in tests.
#[cfg(test)]
pub(crate) fn zip_parts(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut pkg = Package::default();
    for (name, body) in parts {
        pkg.set_part(*name, body.as_bytes().to_vec());
    }
    pkg.to_bytes().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rels_part_names() {
        assert_eq!(rels_part_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(
            rels_part_for("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
        assert_eq!(rels_part_for(""), "_rels/.rels");
    }

    #[test]
    fn resolves_targets() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../printerSettings/p1.bin"),
            "xl/printerSettings/p1.bin"
        );
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            relative_target("xl/worksheets/sheet3.xml", "xl/printerSettings/p2.bin"),
            "../printerSettings/p2.bin"
        );
        assert_eq!(
            relative_target("xl/workbook.xml", "xl/worksheets/sheet3.xml"),
            "worksheets/sheet3.xml"
        );
    }

    #[test]
    fn relationships_add_and_serialize() {
        let xml = r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://x/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId3" Type="http://x/hyperlink" Target="https://a.b/?q=1&amp;r=2" TargetMode="External"/></Relationships>"#;
        let mut rels = Relationships::parse("test.rels", xml).unwrap();
        assert_eq!(rels.len(), 2);
        assert!(rels.get("rId3").unwrap().is_external());
        assert_eq!(rels.get("rId3").unwrap().target, "https://a.b/?q=1&r=2");

        let id = rels.add(rel_type::WORKSHEET_FULL, "worksheets/sheet2.xml");
        assert_eq!(id, "rId2");

        let reparsed = Relationships::parse("test.rels", &rels.to_xml()).unwrap();
        assert_eq!(reparsed, rels);
    }

    #[test]
    fn content_type_overrides() {
        let xml = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="a"/></Types>"#;
        let mut types = ContentTypes::parse(xml).unwrap();
        assert!(types.has_default("XML"));
        assert_eq!(types.override_for("xl/worksheets/sheet1.xml"), Some("a"));

        types.add_override("xl/worksheets/sheet2.xml", content_type::WORKSHEET);
        types.remove_override("xl/worksheets/sheet1.xml");
        let reparsed = ContentTypes::parse(&types.to_xml()).unwrap();
        assert_eq!(reparsed.override_for("xl/worksheets/sheet1.xml"), None);
        assert_eq!(
            reparsed.override_for("xl/worksheets/sheet2.xml"),
            Some(content_type::WORKSHEET)
        );
    }

    #[test]
    fn archive_output_is_deterministic() {
        let a = zip_parts(&[("[Content_Types].xml", "<Types/>"), ("a.xml", "<a/>")]);
        let b = zip_parts(&[("[Content_Types].xml", "<Types/>"), ("a.xml", "<a/>")]);
        assert_eq!(a, b);

        let pkg = Package::from_bytes(&a).unwrap();
        assert_eq!(pkg.part_str("a.xml").unwrap(), "<a/>");
        assert!(matches!(
            pkg.part_str("missing.xml"),
            Err(EngineError::MissingPart(_))
        ));
    }

    #[test]
    fn highest_part_number_ignores_other_names() {
        let mut pkg = Package::default();
        pkg.set_part("xl/worksheets/sheet1.xml", Vec::new());
        pkg.set_part("xl/worksheets/sheet12.xml", Vec::new());
        pkg.set_part("xl/worksheets/_rels/sheet40.xml.rels", Vec::new());
        pkg.set_part("xl/worksheets/sheetX.xml", Vec::new());
        assert_eq!(pkg.highest_part_number("xl/worksheets/sheet", ".xml"), 12);
        assert_eq!(pkg.highest_part_number("xl/drawings/drawing", ".xml"), 0);
    }

    #[test]
    fn removing_a_part_keeps_lookups_in_step() {
        let mut pkg = Package::default();
        for name in ["a.xml", "b.xml", "c.xml"] {
            pkg.set_part(name, name.as_bytes().to_vec());
        }
        assert_eq!(pkg.remove_part("a.xml"), Some(b"a.xml".to_vec()));
        assert_eq!(pkg.part("c.xml"), Some(&b"c.xml"[..]));
        pkg.set_part("b.xml", b"new".to_vec());
        assert_eq!(pkg.part_names().collect::<Vec<_>>(), vec!["b.xml", "c.xml"]);
        assert_eq!(pkg.part("b.xml"), Some(&b"new"[..]));
        assert!(!pkg.has_part("a.xml"));
    }
}
