//! Certificates: a slide deck with `{{key}}` runs filled from one record.

use std::path::Path;

use crate::error::Result;
use crate::ooxml::SlideDeck;
use crate::record::Record;

use super::safe_file_name;

/// Record field naming the certificate holder.
pub const NAME_FIELD: &str = "name";
const DEFAULT_NAME: &str = "Certificate";

/// `<custom>.pptx`, or `<name with spaces as _>_Certificate.pptx`.
pub fn certificate_filename(record: &Record, custom: Option<&str>) -> String {
    match custom.map(safe_file_name).filter(|c| !c.is_empty()) {
        Some(custom) => format!("{custom}.pptx"),
        None => {
            let name = record.text_or(NAME_FIELD, DEFAULT_NAME).replace(' ', "_");
            format!("{}_Certificate.pptx", safe_file_name(&name))
        }
    }
}

/// Key of a placeholder run, if the run is one.
///
/// A run is a placeholder when it holds both `{{` and `}}`; the key is
/// what remains after dropping every brace pair, trimmed.
pub fn placeholder_key(run: &str) -> Option<String> {
    if run.contains("{{") && run.contains("}}") {
        Some(run.replace("{{", "").replace("}}", "").trim().to_string())
    } else {
        None
    }
}

/// Replace every placeholder run of `deck`. Returns the number replaced.
pub fn fill_deck(deck: &mut SlideDeck, record: &Record) -> Result<usize> {
    deck.rewrite_runs(|text| placeholder_key(text).map(|key| record.text(&key)))
}

/// Open `template`, fill it and save it in `out_dir`. Returns the file name.
pub fn materialize(
    template: &Path,
    record: &Record,
    custom_name: Option<&str>,
    out_dir: &Path,
) -> Result<String> {
    let mut deck = SlideDeck::open(template)?;
    let replaced = fill_deck(&mut deck, record)?;

    let filename = certificate_filename(record, custom_name);
    deck.save(&out_dir.join(&filename))?;
    tracing::info!(
        template = %template.display(),
        file = %filename,
        replaced,
        "generated certificate"
    );
    Ok(filename)
}
