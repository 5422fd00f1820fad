//! Department classification for grade sheets.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical department categories, one worksheet each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Department {
    Technical,
    Production,
    Support,
}

/// Upper-cased aliases. Anything else routes to [`Department::Support`].
const ALIASES: &[(&str, Department)] = &[
    ("TECHNICAL", Department::Technical),
    ("IT", Department::Technical),
    ("PRODUCTION", Department::Production),
    ("PROD", Department::Production),
    ("SUPPORT", Department::Support),
];

impl Department {
    pub const ALL: [Department; 3] = [
        Department::Production,
        Department::Support,
        Department::Technical,
    ];

    /// Classify a free-text department.
    ///
    /// Unrecognized input (typos included) is filed under Support rather than
    /// rejected.
    pub fn classify(raw: &str) -> Self {
        let normalized = raw.trim().to_uppercase();
        match ALIASES.iter().find(|(alias, _)| *alias == normalized) {
            Some((_, dept)) => *dept,
            None => {
                tracing::debug!(department = raw, "unrecognized department routed to SUPPORT");
                Department::Support
            }
        }
    }

    /// Name of the template worksheet holding this department's rows.
    pub fn sheet_name(self) -> &'static str {
        match self {
            Department::Technical => "TECHNICAL",
            Department::Production => "PRODUCTION",
            Department::Support => "SUPPORT",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sheet_name())
    }
}
