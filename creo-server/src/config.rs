//! Server configuration from environment variables.
//!
//! | variable | default |
//! |---|---|
//! | `HOST` | `127.0.0.1` |
//! | `PORT` | `5000` |
//! | `DATABASE_URL` | unset: in-memory store |
//! | `DB_MAX_CONNECTIONS` | `5` |
//! | `TEMPLATE_DIR` | `uploads/templates` |
//! | `GENERATED_DIR` | `static/generated` |
//! | `UPLOAD_DIR` | `static` |
//! | `GRADES_TEMPLATE` | `Grades.xlsx` |
//! | `RECENT_DOWNLOADS_CAPACITY` | `200` |

use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub template_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub grades_template: String,
    pub recent_downloads_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            database_url: None,
            db_max_connections: 5,
            template_dir: PathBuf::from("uploads/templates"),
            generated_dir: PathBuf::from("static/generated"),
            upload_dir: PathBuf::from("static"),
            grades_template: "Grades.xlsx".into(),
            recent_downloads_capacity: 200,
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT", defaults.port)?,
            database_url: lookup("DATABASE_URL"),
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            template_dir: lookup("TEMPLATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_dir),
            generated_dir: lookup("GENERATED_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.generated_dir),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            grades_template: lookup("GRADES_TEMPLATE").unwrap_or(defaults.grades_template),
            recent_downloads_capacity: parsed(
                &lookup,
                "RECENT_DOWNLOADS_CAPACITY",
                defaults.recent_downloads_capacity,
            )?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Create the template, generated and upload directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.template_dir, &self.generated_dir, &self.upload_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Where staged spreadsheet rows are written.
    pub fn staged_rows_path(&self) -> PathBuf {
        self.upload_dir.join("excel").join("uploaded_data.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
        assert_eq!(config.database_url, None);
        assert_eq!(config.template_dir, PathBuf::from("uploads/templates"));
        assert_eq!(config.recent_downloads_capacity, 200);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("HOST", "0.0.0.0"),
            ("DATABASE_URL", "postgres://localhost/creo"),
            ("GRADES_TEMPLATE", "Grades2025.xlsx"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/creo"));
        assert_eq!(config.grades_template, "Grades2025.xlsx");
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
