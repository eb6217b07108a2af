//! Service coverage: which suburbs a service is offered in.
//!
//! A service with no entry is offered everywhere. That default is
//! deliberate: coverage only ever narrows availability.

use crate::catalog::ClusterIndex;
use crate::error::{Finding, SchemaError};
use crate::slug::{normalize, slug_candidate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const COVERAGE_DOCUMENT: &str = "coverage";

pub const CLASS_COVERAGE_SHAPE: &str = "schema.coverage.shape";
pub const CLASS_COVERAGE_SLUG_MISSING: &str = "schema.coverage.slug_missing";
pub const CLASS_COVERAGE_UNKNOWN_SUBURB: &str = "referential.coverage.unknown_suburb";
pub const CLASS_COVERAGE_EMPTY_SERVICE: &str = "coverage.service.empty";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap {
    services: BTreeMap<String, BTreeSet<String>>,
}

impl CoverageMap {
    pub fn new(services: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self { services }
    }

    /// Parse `service -> [suburb]`, where suburbs are strings or
    /// `{slug, name}` objects.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let mut violations = Vec::new();
        let Some(map) = value.as_object() else {
            violations.push(Finding::schema(
                CLASS_COVERAGE_SHAPE,
                COVERAGE_DOCUMENT,
                "expected a `service -> [suburb]` record",
            ));
            return Err(SchemaError::new(COVERAGE_DOCUMENT, violations));
        };

        let mut services: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (key, entry) in map {
            let service = normalize(key);
            let Some(items) = entry.as_array().filter(|_| !service.is_empty()) else {
                violations.push(Finding::schema(
                    CLASS_COVERAGE_SHAPE,
                    key,
                    "service must have a slug and an array of suburbs",
                ));
                continue;
            };
            let suburbs = services.entry(service.clone()).or_default();
            for (index, item) in items.iter().enumerate() {
                match slug_candidate(item) {
                    Some(slug) => {
                        suburbs.insert(slug);
                    }
                    None => violations.push(Finding::schema(
                        CLASS_COVERAGE_SLUG_MISSING,
                        format!("{service}[{index}]"),
                        "coverage entry has no resolvable slug",
                    )),
                }
            }
        }

        if violations.is_empty() {
            Ok(Self { services })
        } else {
            Err(SchemaError::new(COVERAGE_DOCUMENT, violations))
        }
    }

    /// Whether `service` is offered in `suburb`. Unknown services are open.
    pub fn is_offered(&self, service: &str, suburb: &str) -> bool {
        self.services
            .get(service)
            .is_none_or(|suburbs| suburbs.contains(suburb))
    }

    pub fn is_restricted(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn suburbs_for(&self, service: &str) -> Option<&BTreeSet<String>> {
        self.services.get(service)
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Report suburbs referenced by coverage but absent from the catalog,
    /// and services that cover nothing.
    pub fn validate(&self, index: &ClusterIndex, tolerant: bool) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (service, suburbs) in &self.services {
            if suburbs.is_empty() {
                findings.push(Finding::warning(
                    CLASS_COVERAGE_EMPTY_SERVICE,
                    service,
                    "service is restricted to zero suburbs",
                ));
            }
            for suburb in suburbs.iter().filter(|s| !index.contains(s)) {
                findings.push(
                    Finding::referential(
                        CLASS_COVERAGE_UNKNOWN_SUBURB,
                        suburb,
                        format!("service `{service}` references unknown suburb `{suburb}`"),
                    )
                    .tolerate(tolerant),
                );
            }
        }
        findings
    }
}
