//! Shared helpers for the HTTP integration tests: an app wired to a
//! `MemoryStore` over scratch directories, and template documents built in
//! code.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::Router;
use creo_core::ooxml::Package;
use creo_server::{build_router, AppState, ServerConfig};
use http_body_util::BodyExt;
use hyper::{header, Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub root: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("scratch dir");
        let config = ServerConfig {
            template_dir: root.path().join("templates"),
            generated_dir: root.path().join("generated"),
            upload_dir: root.path().join("upload"),
            ..ServerConfig::default()
        };
        config.ensure_dirs().expect("create dirs");
        let state = AppState::in_memory(config);
        let router = build_router(state.clone());
        Self {
            router,
            state,
            root,
        }
    }

    pub fn template_dir(&self) -> PathBuf {
        self.state.config.template_dir.clone()
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.state.config.generated_dir.clone()
    }

    pub fn add_template(&self, name: &str, bytes: &[u8]) {
        std::fs::write(self.template_dir().join(name), bytes).expect("write template");
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn json(&self, method: &str, uri: &str, body: serde_json::Value) -> TestResponse {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Multipart POST with one `file` field.
    pub async fn upload(&self, uri: &str, filename: &str, bytes: &[u8]) -> TestResponse {
        let boundary = "creo-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        self.send(
            Request::post(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: hyper::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }

    pub fn header(&self, name: header::HeaderName) -> String {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn package(parts: &[(String, String)]) -> Vec<u8> {
    let mut pkg = Package::default();
    for (name, body) in parts {
        pkg.set_part(name.clone(), body.as_bytes().to_vec());
    }
    pkg.to_bytes().expect("zip package")
}

/// Row-major cell grid; `(a1, text)` pairs become inline strings.
fn sheet_xml(cells: &[(&str, &str)]) -> String {
    let mut rows: std::collections::BTreeMap<u32, String> = Default::default();
    for (a1, text) in cells {
        let row: u32 = a1
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .expect("row number");
        rows.entry(row).or_default().push_str(&format!(
            r#"<c r="{a1}" s="1" t="inlineStr"><is><t>{}</t></is></c>"#,
            escape(text)
        ));
    }
    let body: String = rows
        .into_iter()
        .map(|(r, cells)| format!(r#"<row r="{r}">{cells}</row>"#))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData>{body}</sheetData></worksheet>"#
    )
}

/// Workbook with one worksheet per `(name, cells)` entry; the first is active.
pub fn workbook(sheets: &[(&str, &[(&str, &str)])]) -> Vec<u8> {
    let mut types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    let mut list = String::new();
    let mut parts = Vec::new();
    for (i, (name, cells)) in sheets.iter().enumerate() {
        let n = i + 1;
        types.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        ));
        list.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape(name)
        ));
        parts.push((format!("xl/worksheets/sheet{n}.xml"), sheet_xml(cells)));
    }
    types.push_str("</Types>");
    rels.push_str("</Relationships>");

    parts.push(("[Content_Types].xml".into(), types));
    parts.push((
        "_rels/.rels".into(),
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.into(),
    ));
    parts.push((
        "xl/workbook.xml".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><bookViews><workbookView activeTab="0"/></bookViews><sheets>{list}</sheets></workbook>"#
        ),
    ));
    parts.push(("xl/_rels/workbook.xml.rels".into(), rels));
    package(&parts)
}

/// The three department sheets of a grade template.
pub fn grades_template() -> Vec<u8> {
    let header: &[(&str, &str)] = &[("B9", "LAST NAME"), ("G9", "OVERALL")];
    workbook(&[
        ("PRODUCTION", header),
        ("SUPPORT", header),
        ("TECHNICAL", header),
    ])
}

/// Deck with one slide per entry, each entry listing the runs of one shape.
pub fn deck(slides: &[&[&str]]) -> Vec<u8> {
    let mut types = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    let mut ids = String::new();
    let mut parts = Vec::new();
    for (i, runs) in slides.iter().enumerate() {
        let n = i + 1;
        let runs: String = runs
            .iter()
            .map(|t| format!(r#"<a:r><a:rPr lang="en-US"/><a:t>{}</a:t></a:r>"#, escape(t)))
            .collect();
        types.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{n}.xml"/>"#
        ));
        ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{n}"/>"#, 255 + n));
        parts.push((
            format!("ppt/slides/slide{n}.xml"),
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/><p:sp><p:nvSpPr><p:cNvPr id="2" name="Text"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p>{runs}</a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
            ),
        ));
    }
    types.push_str("</Types>");
    rels.push_str("</Relationships>");

    parts.push(("[Content_Types].xml".into(), types));
    parts.push((
        "_rels/.rels".into(),
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#.into(),
    ));
    parts.push((
        "ppt/presentation.xml".into(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#
        ),
    ));
    parts.push(("ppt/_rels/presentation.xml.rels".into(), rels));
    package(&parts)
}

pub fn read_file(dir: &Path, name: &str) -> Vec<u8> {
    std::fs::read(dir.join(name)).expect("generated file")
}
