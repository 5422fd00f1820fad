//! Slide decks: text-run rewriting across slides.

use std::path::Path;

use quick_xml::events::{BytesEnd, BytesText, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};

use super::package::{rel_type, resolve_target, Package};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct SlideDeck {
    package: Package,
    /// Slide parts in presentation order.
    slides: Vec<String>,
}

impl SlideDeck {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_package(Package::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    pub fn from_package(package: Package) -> Result<Self> {
        let presentation = package.main_document_part()?;
        let rels = package.relationships(&presentation)?;

        let mut reader = XmlReader::from_str(package.part_str(&presentation)?);
        let mut slides = Vec::new();
        loop {
            match reader
                .read_event()
                .map_err(|e| EngineError::xml(&presentation, e))?
            {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                    for attr in e.attributes().with_checks(false) {
                        let attr = attr.map_err(|err| EngineError::xml(&presentation, err))?;
                        if attr.key.prefix().is_none() || attr.key.local_name().as_ref() != b"id" {
                            continue;
                        }
                        let rel_id = attr
                            .unescape_value()
                            .map_err(|err| EngineError::xml(&presentation, err))?;
                        match rels.get(&rel_id) {
                            Some(rel) if rel_type::is(&rel.kind, rel_type::SLIDE) => {
                                slides.push(resolve_target(&presentation, &rel.target));
                            }
                            _ => tracing::warn!(rel_id = %rel_id, "slide id without slide relationship"),
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        tracing::debug!(part = %presentation, slides = slides.len(), "opened slide deck");
        Ok(Self { package, slides })
    }

    pub fn slide_parts(&self) -> &[String] {
        &self.slides
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Every run's text, slide by slide, for inspection.
    pub fn run_texts(&self) -> Result<Vec<String>> {
        let mut texts = Vec::new();
        for part in &self.slides {
            let xml = self.package.part_str(part)?;
            rewrite_slide_runs(part, xml, &mut |text: &str| {
                texts.push(text.to_string());
                None
            })?;
        }
        Ok(texts)
    }

    /// Offer the text of every run in every shape text body to `rewrite`.
    ///
    /// When it returns `Some`, the run's text is replaced (the first `<a:t>`
    /// takes the new text, any later ones are emptied) and run properties
    /// are kept. Returns the number of runs replaced.
    pub fn rewrite_runs<F>(&mut self, mut rewrite: F) -> Result<usize>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut replaced = 0;
        for part in self.slides.clone() {
            let xml = self.package.part_str(&part)?;
            let (out, count) = rewrite_slide_runs(&part, xml, &mut rewrite)?;
            if count > 0 {
                self.package.set_part(part, out.into_bytes());
                replaced += count;
            }
        }
        Ok(replaced)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.package.to_bytes()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.package.save(path)
    }
}

fn rewrite_slide_runs<F>(part: &str, xml: &str, rewrite: &mut F) -> Result<(String, usize)>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());

    let mut shape_depth = 0usize;
    let mut body_depth = 0usize;
    let mut run: Option<Vec<Event<'static>>> = None;
    let mut run_depth = 0usize;
    let mut replaced = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| EngineError::xml(part, e))?;
        if let Event::Eof = event {
            break;
        }

        if let Some(buffer) = run.as_mut() {
            match &event {
                Event::Start(_) => run_depth += 1,
                Event::End(_) => run_depth -= 1,
                _ => {}
            }
            buffer.push(event.into_owned());
            if run_depth == 0 {
                let events = run.take().unwrap_or_default();
                if emit_run(&mut writer, events, rewrite, part)? {
                    replaced += 1;
                }
            }
            continue;
        }

        let starts_run = match &event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sp" => {
                    shape_depth += 1;
                    false
                }
                b"txBody" => {
                    body_depth += 1;
                    false
                }
                b"r" => shape_depth > 0 && body_depth > 0,
                _ => false,
            },
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"sp" => shape_depth = shape_depth.saturating_sub(1),
                    b"txBody" => body_depth = body_depth.saturating_sub(1),
                    _ => {}
                }
                false
            }
            _ => false,
        };
        if starts_run {
            run = Some(vec![event.into_owned()]);
            run_depth = 1;
            continue;
        }
        write(&mut writer, event, part)?;
    }

    let out = String::from_utf8(writer.into_inner())
        .map_err(|e| EngineError::malformed(part, e.to_string()))?;
    Ok((out, replaced))
}

/// Write one buffered `<a:r>`; returns whether its text was replaced.
fn emit_run<F>(
    writer: &mut XmlWriter<Vec<u8>>,
    events: Vec<Event<'static>>,
    rewrite: &mut F,
    part: &str,
) -> Result<bool>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut text = String::new();
    let mut in_t = false;
    for event in &events {
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_t = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_t = false,
            Event::Text(t) if in_t => {
                text.push_str(&t.unescape().map_err(|e| EngineError::xml(part, e))?);
            }
            Event::CData(t) if in_t => text.push_str(&String::from_utf8_lossy(t)),
            _ => {}
        }
    }

    let Some(new_text) = rewrite(&text) else {
        for event in events {
            write(writer, event, part)?;
        }
        return Ok(false);
    };

    let mut in_t = false;
    let mut filled = false;
    for event in events {
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                write(writer, Event::Start(e), part)?;
                if !filled {
                    write(writer, Event::Text(BytesText::new(&new_text)), part)?;
                    filled = true;
                }
                in_t = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"t" => {
                if filled {
                    write(writer, Event::Empty(e), part)?;
                } else {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    write(writer, Event::Start(e), part)?;
                    write(writer, Event::Text(BytesText::new(&new_text)), part)?;
                    write(writer, Event::End(BytesEnd::new(name)), part)?;
                    filled = true;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"t" => {
                in_t = false;
                write(writer, Event::End(e), part)?;
            }
            Event::Text(_) | Event::CData(_) if in_t => {}
            other => write(writer, other, part)?,
        }
    }
    Ok(true)
}

fn write(writer: &mut XmlWriter<Vec<u8>>, event: Event<'_>, part: &str) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| EngineError::xml(part, e))
}
