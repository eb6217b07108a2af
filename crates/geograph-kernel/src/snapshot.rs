//! Proximity snapshot: the cached "nearby suburbs" result set.
//!
//! The `etag` is a content hash over the payload, so consumers can detect a
//! stale snapshot without comparing lists.

use crate::error::{Finding, SchemaError};
use crate::slug::{normalize, slug_candidate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

pub const SNAPSHOT_DOCUMENT: &str = "proximity snapshot";
pub const ETAG_PREFIX: &str = "nb1_";
pub const CLASS_SNAPSHOT_SHAPE: &str = "schema.snapshot.shape";

/// One recommended suburb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearbyEntry {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximitySnapshot {
    pub etag: String,
    pub nearby: BTreeMap<String, Vec<NearbyEntry>>,
}

/// Hash the canonical JSON rendering of the payload. Keys are sorted because
/// the map is ordered and every string is escaped by the encoder.
pub fn compute_etag(nearby: &BTreeMap<String, Vec<NearbyEntry>>) -> String {
    let canonical: serde_json::Map<String, Value> = nearby
        .iter()
        .map(|(source, entries)| {
            let items = entries
                .iter()
                .map(|entry| {
                    let mut item = serde_json::Map::new();
                    item.insert("name".to_string(), Value::String(entry.name.clone()));
                    item.insert("slug".to_string(), Value::String(entry.slug.clone()));
                    Value::Object(item)
                })
                .collect();
            (source.clone(), Value::Array(items))
        })
        .collect();
    let mut hasher = Sha256::new();
    hasher.update(Value::Object(canonical).to_string().as_bytes());
    format!("{ETAG_PREFIX}{:x}", hasher.finalize())
}

impl ProximitySnapshot {
    pub fn new(nearby: BTreeMap<String, Vec<NearbyEntry>>) -> Self {
        Self {
            etag: compute_etag(&nearby),
            nearby,
        }
    }

    /// Whether the stored etag matches the payload.
    pub fn is_consistent(&self) -> bool {
        self.etag == compute_etag(&self.nearby)
    }

    pub fn slugs_for(&self, source: &str) -> Vec<&str> {
        self.nearby
            .get(source)
            .map(|entries| entries.iter().map(|e| e.slug.as_str()).collect())
            .unwrap_or_default()
    }

    /// Parse a previously written snapshot.
    ///
    /// Accepts `{etag, nearby: {...}}` or a bare `{suburb: [...]}` record;
    /// list entries may be slugs or `{slug, name}` objects. Entries without a
    /// resolvable slug are skipped. The stored etag is kept verbatim so a
    /// stale fingerprint stays detectable.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        let shape_error = |message: &str| {
            SchemaError::new(
                SNAPSHOT_DOCUMENT,
                vec![Finding::schema(CLASS_SNAPSHOT_SHAPE, SNAPSHOT_DOCUMENT, message)],
            )
        };
        let Some(object) = value.as_object() else {
            return Err(shape_error("expected an object"));
        };
        let (etag, lists) = match object.get("nearby") {
            Some(Value::Object(lists)) => (
                object
                    .get("etag")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                lists,
            ),
            Some(_) => return Err(shape_error("`nearby` must be an object")),
            None => (String::new(), object),
        };

        let mut violations = Vec::new();
        let mut nearby = BTreeMap::new();
        for (source, list) in lists {
            let Some(items) = list.as_array() else {
                violations.push(Finding::schema(
                    CLASS_SNAPSHOT_SHAPE,
                    source,
                    "nearby list must be an array",
                ));
                continue;
            };
            let mut entries = Vec::with_capacity(items.len());
            for item in items {
                let Some(slug) = slug_candidate(item) else {
                    warn!(source = %source, "skipping snapshot entry without a slug");
                    continue;
                };
                let name = item
                    .get("name")
                    .and_then(Value::as_str)
                    .map_or_else(|| slug.clone(), str::to_string);
                entries.push(NearbyEntry { slug, name });
            }
            nearby.insert(normalize(source), entries);
        }

        if violations.is_empty() {
            Ok(Self { etag, nearby })
        } else {
            Err(SchemaError::new(SNAPSHOT_DOCUMENT, violations))
        }
    }
}

/// Before/after lists for one changed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChange {
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Difference between a previous snapshot and a freshly computed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDiff {
    pub previous_etag: String,
    pub current_etag: String,
    pub etag_matches: bool,
    /// The previous snapshot's etag matches its own payload.
    pub previous_consistent: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: BTreeMap<String, ListChange>,
}

impl SnapshotDiff {
    pub fn compute(previous: &ProximitySnapshot, current: &ProximitySnapshot) -> Self {
        let before: BTreeSet<&String> = previous.nearby.keys().collect();
        let after: BTreeSet<&String> = current.nearby.keys().collect();

        let added = after.difference(&before).map(|s| s.to_string()).collect();
        let removed = before.difference(&after).map(|s| s.to_string()).collect();
        let mut changed = BTreeMap::new();
        for source in before.intersection(&after) {
            let old = previous.slugs_for(source);
            let new = current.slugs_for(source);
            if old != new {
                changed.insert(
                    source.to_string(),
                    ListChange {
                        before: old.into_iter().map(str::to_string).collect(),
                        after: new.into_iter().map(str::to_string).collect(),
                    },
                );
            }
        }

        Self {
            previous_etag: previous.etag.clone(),
            current_etag: current.etag.clone(),
            etag_matches: previous.etag == current.etag,
            previous_consistent: previous.is_consistent(),
            added,
            removed,
            changed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
