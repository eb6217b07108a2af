//! Error types and report findings for geograph kernel operations.

use crate::config::ConfigError;
use crate::enrich::EnrichError;
use crate::split::SplitError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Report bucket a finding is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A source file is absent or unreadable.
    Missing,
    /// A document is malformed or structurally invalid.
    Schema,
    /// A slug is referenced but never defined.
    Referential,
    /// Informational or downgraded findings.
    Warning,
}

/// Severity of a finding.
///
/// `Error` always fails a run, `Warning` fails only in strict mode and
/// `Info` (topology) never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One concrete integrity finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub category: Category,
    pub severity: Severity,
    pub class: String,
    pub subject: String,
    pub message: String,
}

impl Finding {
    pub fn new(
        category: Category,
        severity: Severity,
        class: &str,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            class: class.to_string(),
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn schema(class: &str, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Category::Schema, Severity::Error, class, subject, message)
    }

    pub fn referential(
        class: &str,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Category::Referential, Severity::Error, class, subject, message)
    }

    pub fn warning(class: &str, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Category::Warning, Severity::Warning, class, subject, message)
    }

    /// Topology findings are reported but never gate a run.
    pub fn topology(class: &str, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Category::Warning, Severity::Info, class, subject, message)
    }

    /// Referential errors become warnings in tolerant mode.
    pub fn tolerate(self, tolerant: bool) -> Self {
        if tolerant && self.category == Category::Referential {
            Self {
                category: Category::Warning,
                severity: Severity::Warning,
                ..self
            }
        } else {
            self
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.subject, self.class, self.message)
    }
}

fn join_findings(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|finding| format!("{}: {}", finding.subject, finding.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A document failed structural validation. Carries every violation found.
#[derive(Debug, Clone, thiserror::Error)]
#[error("schema error in {document}: {}", join_findings(.violations))]
pub struct SchemaError {
    pub document: String,
    pub violations: Vec<Finding>,
}

impl SchemaError {
    pub fn new(document: impl Into<String>, violations: Vec<Finding>) -> Self {
        Self {
            document: document.into(),
            violations,
        }
    }
}

/// A slug was referenced but not defined, or claimed twice.
#[derive(Debug, Clone, thiserror::Error)]
#[error("referential error: {}", join_findings(.violations))]
pub struct ReferentialError {
    pub violations: Vec<Finding>,
}

/// Umbrella error for operations that span several kernel modules.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Referential(#[from] ReferentialError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("unknown suburb: {0}")]
    UnknownSuburb(String),

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerate_downgrades_only_referential_findings() {
        let referential = Finding::referential("referential.x", "atlantis", "unknown");
        let schema = Finding::schema("schema.x", "atlantis", "bad");

        let downgraded = referential.tolerate(true);
        assert_eq!(downgraded.category, Category::Warning);
        assert_eq!(downgraded.severity, Severity::Warning);
        assert_eq!(downgraded.class, "referential.x");

        assert_eq!(schema.clone().tolerate(true), schema);
    }

    #[test]
    fn schema_error_lists_every_violation() {
        let err = SchemaError::new(
            "clusters.json",
            vec![
                Finding::schema("a", "one", "first"),
                Finding::schema("b", "two", "second"),
            ],
        );
        let rendered = err.to_string();
        assert!(rendered.contains("one: first"));
        assert!(rendered.contains("two: second"));
    }
}
