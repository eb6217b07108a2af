//! Document schemas: historical input shapes resolved into one canonical form.
//!
//! Cluster documents arrive either as `{clusters: [...]}` (array of cluster
//! objects) or as a flat `cluster-slug -> [suburb, ...]` record. Adjacency
//! documents arrive as `suburb -> [slug, ...]` or
//! `suburb -> {adjacent_suburbs: [...]}`. The shape is resolved exactly once
//! here; everything downstream sees only [`ClusterDocument`] and
//! [`AdjacencyDocument`].

use crate::error::{Finding, SchemaError};
use crate::geo::{Coord, lat_in_range, lng_in_range};
use crate::slug::{display_name, is_canonical, normalize, raw_candidate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

pub const CLUSTER_DOCUMENT: &str = "clusters";
pub const ADJACENCY_DOCUMENT: &str = "adjacency";

pub const CLASS_DOCUMENT_SHAPE: &str = "schema.document.shape";
pub const CLASS_CLUSTER_SLUG_MISSING: &str = "schema.cluster.slug_missing";
pub const CLASS_CLUSTER_DUPLICATE: &str = "schema.cluster.duplicate_slug";
pub const CLASS_CLUSTER_SUBURBS_SHAPE: &str = "schema.cluster.suburbs_shape";
pub const CLASS_SUBURB_SLUG_MISSING: &str = "schema.suburb.slug_missing";
pub const CLASS_SUBURB_DUPLICATE: &str = "schema.suburb.duplicate_in_cluster";
pub const CLASS_COORDINATE_RANGE: &str = "schema.suburb.coordinate_out_of_range";
pub const CLASS_COORDINATE_TYPE: &str = "schema.suburb.coordinate_type";
pub const CLASS_COORDINATE_INCOMPLETE: &str = "schema.suburb.coordinate_incomplete";
pub const CLASS_SLUG_NOT_CANONICAL: &str = "schema.slug.not_canonical";
pub const CLASS_ADJACENCY_SHAPE: &str = "schema.adjacency.shape";
pub const CLASS_ADJACENCY_SLUG_MISSING: &str = "schema.adjacency.slug_missing";

/// Validation switches for document normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Reject raw slugs that are not already canonical.
    pub strict_slugs: bool,
}

/// A suburb as it appears in the canonical cluster document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuburbRecord {
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl SuburbRecord {
    pub fn coord(&self) -> Option<Coord> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coord::new(lat, lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub slug: String,
    pub name: String,
    pub suburbs: Vec<SuburbRecord>,
}

/// Canonical cluster document: always the array-of-clusters shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterDocument {
    pub clusters: Vec<ClusterRecord>,
}

/// Canonical adjacency document: `suburb -> [neighbour, ...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjacencyDocument {
    pub neighbors: BTreeMap<String, Vec<String>>,
}

enum ClusterShape<'a> {
    Listed(&'a [Value]),
    Keyed(&'a Map<String, Value>),
}

impl<'a> ClusterShape<'a> {
    fn detect(value: &'a Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::Listed(items)),
            Value::Object(map) => match map.get("clusters") {
                Some(Value::Array(items)) => Some(Self::Listed(items)),
                Some(_) => None,
                None => Some(Self::Keyed(map)),
            },
            _ => None,
        }
    }
}

/// One cluster entry before validation, independent of document shape.
struct RawCluster<'a> {
    subject: String,
    slug: Option<&'a str>,
    name: Option<&'a str>,
    suburbs: Option<&'a [Value]>,
}

impl<'a> RawCluster<'a> {
    fn listed(index: usize, value: &'a Value) -> Self {
        let object = value.as_object();
        Self {
            subject: format!("clusters[{index}]"),
            slug: raw_candidate(value),
            name: object.and_then(|o| o.get("name")).and_then(Value::as_str),
            suburbs: object
                .and_then(|o| o.get("suburbs"))
                .and_then(Value::as_array)
                .map(Vec::as_slice),
        }
    }

    fn keyed(key: &'a str, value: &'a Value) -> Self {
        let (name, suburbs) = match value {
            Value::Array(items) => (None, Some(items.as_slice())),
            Value::Object(object) => (
                object.get("name").and_then(Value::as_str),
                object
                    .get("suburbs")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice),
            ),
            _ => (None, None),
        };
        Self {
            subject: key.to_string(),
            slug: Some(key),
            name,
            suburbs,
        }
    }
}

fn check_canonical(raw: &str, subject: &str, options: SchemaOptions, out: &mut Vec<Finding>) {
    if options.strict_slugs && !is_canonical(raw) {
        out.push(Finding::schema(
            CLASS_SLUG_NOT_CANONICAL,
            subject,
            format!("raw slug `{raw}` is not canonical (expected `{}`)", normalize(raw)),
        ));
    }
}

enum CoordinateField {
    Absent,
    Value(f64),
    Invalid,
}

fn coordinate_field(object: Option<&Map<String, Value>>, key: &str) -> CoordinateField {
    match object.and_then(|o| o.get(key)) {
        None | Some(Value::Null) => CoordinateField::Absent,
        Some(Value::Number(number)) => number
            .as_f64()
            .map_or(CoordinateField::Invalid, CoordinateField::Value),
        Some(Value::String(text)) if text.trim().is_empty() => CoordinateField::Absent,
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_or(CoordinateField::Invalid, CoordinateField::Value),
        Some(_) => CoordinateField::Invalid,
    }
}

fn resolve_coordinates(
    object: Option<&Map<String, Value>>,
    subject: &str,
    out: &mut Vec<Finding>,
) -> (Option<f64>, Option<f64>) {
    let mut resolve = |key: &str, in_range: fn(f64) -> bool, bounds: &str| {
        match coordinate_field(object, key) {
            CoordinateField::Absent => None,
            CoordinateField::Invalid => {
                out.push(Finding::schema(
                    CLASS_COORDINATE_TYPE,
                    subject,
                    format!("`{key}` is not a number"),
                ));
                None
            }
            CoordinateField::Value(v) if !in_range(v) => {
                out.push(Finding::schema(
                    CLASS_COORDINATE_RANGE,
                    subject,
                    format!("`{key}`={v} outside {bounds}"),
                ));
                None
            }
            CoordinateField::Value(v) => Some(v),
        }
    };
    let lat = resolve("lat", lat_in_range, "[-90, 90]");
    let lng = resolve("lng", lng_in_range, "[-180, 180]");

    let lat_present = !matches!(coordinate_field(object, "lat"), CoordinateField::Absent);
    let lng_present = !matches!(coordinate_field(object, "lng"), CoordinateField::Absent);
    if lat_present != lng_present {
        out.push(Finding::schema(
            CLASS_COORDINATE_INCOMPLETE,
            subject,
            "`lat` and `lng` must be given together",
        ));
    }

    match (lat, lng) {
        (Some(lat), Some(lng)) => (Some(lat), Some(lng)),
        _ => (None, None),
    }
}

fn resolve_suburb(
    cluster_subject: &str,
    index: usize,
    value: &Value,
    options: SchemaOptions,
    out: &mut Vec<Finding>,
) -> Option<SuburbRecord> {
    let position = format!("{cluster_subject}.suburbs[{index}]");
    let Some(raw) = raw_candidate(value) else {
        out.push(Finding::schema(
            CLASS_SUBURB_SLUG_MISSING,
            position,
            "suburb has no `slug` or `name`",
        ));
        return None;
    };
    let slug = normalize(raw);
    if slug.is_empty() {
        out.push(Finding::schema(
            CLASS_SUBURB_SLUG_MISSING,
            position,
            format!("`{raw}` does not normalize to a slug"),
        ));
        return None;
    }
    check_canonical(raw, &position, options, out);

    let object = value.as_object();
    let name = match value {
        Value::String(text) => text.trim().to_string(),
        _ => object
            .and_then(|o| o.get("name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| display_name(&slug), str::to_string),
    };
    let (lat, lng) = resolve_coordinates(object, &slug, out);

    Some(SuburbRecord {
        slug,
        name,
        lat,
        lng,
    })
}

fn resolve_cluster(
    raw: RawCluster<'_>,
    options: SchemaOptions,
    out: &mut Vec<Finding>,
) -> Option<ClusterRecord> {
    let slug = raw.slug.map(normalize).filter(|slug| !slug.is_empty());
    let Some(slug) = slug else {
        out.push(Finding::schema(
            CLASS_CLUSTER_SLUG_MISSING,
            &raw.subject,
            "cluster has no resolvable `slug`",
        ));
        return None;
    };
    if let Some(raw_slug) = raw.slug {
        check_canonical(raw_slug, &raw.subject, options, out);
    }

    let Some(items) = raw.suburbs else {
        out.push(Finding::schema(
            CLASS_CLUSTER_SUBURBS_SHAPE,
            &slug,
            "cluster `suburbs` must be an array",
        ));
        return None;
    };

    let mut seen = BTreeSet::new();
    let mut suburbs = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(suburb) = resolve_suburb(&slug, index, item, options, out) else {
            continue;
        };
        if !seen.insert(suburb.slug.clone()) {
            out.push(Finding::schema(
                CLASS_SUBURB_DUPLICATE,
                &suburb.slug,
                format!("suburb listed more than once in cluster `{slug}`"),
            ));
            continue;
        }
        suburbs.push(suburb);
    }

    let name = raw
        .name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| display_name(&slug), str::to_string);

    Some(ClusterRecord {
        slug,
        name,
        suburbs,
    })
}

/// Normalize a cluster document of either supported shape.
///
/// Collects every violation before failing.
pub fn normalize_clusters(
    value: &Value,
    options: SchemaOptions,
) -> Result<ClusterDocument, SchemaError> {
    let mut violations = Vec::new();
    let Some(shape) = ClusterShape::detect(value) else {
        violations.push(Finding::schema(
            CLASS_DOCUMENT_SHAPE,
            CLUSTER_DOCUMENT,
            "expected `{clusters: [...]}` or a `cluster -> [suburb]` record",
        ));
        return Err(SchemaError::new(CLUSTER_DOCUMENT, violations));
    };

    let raw_clusters: Vec<RawCluster<'_>> = match shape {
        ClusterShape::Listed(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| RawCluster::listed(index, item))
            .collect(),
        ClusterShape::Keyed(map) => map
            .iter()
            .map(|(key, item)| RawCluster::keyed(key, item))
            .collect(),
    };

    let mut seen = BTreeSet::new();
    let mut clusters = Vec::with_capacity(raw_clusters.len());
    for raw in raw_clusters {
        let Some(cluster) = resolve_cluster(raw, options, &mut violations) else {
            continue;
        };
        if !seen.insert(cluster.slug.clone()) {
            violations.push(Finding::schema(
                CLASS_CLUSTER_DUPLICATE,
                &cluster.slug,
                "cluster slug defined more than once",
            ));
            continue;
        }
        clusters.push(cluster);
    }

    if violations.is_empty() {
        Ok(ClusterDocument { clusters })
    } else {
        Err(SchemaError::new(CLUSTER_DOCUMENT, violations))
    }
}

fn adjacency_targets(value: &Value) -> Option<&[Value]> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(object) => object
            .get("adjacent_suburbs")
            .and_then(Value::as_array)
            .map(Vec::as_slice),
        _ => None,
    }
}

/// Normalize an adjacency document of either supported shape.
///
/// Source keys that collapse to the same slug are merged; repeated targets
/// keep their first position.
pub fn normalize_adjacency(
    value: &Value,
    options: SchemaOptions,
) -> Result<AdjacencyDocument, SchemaError> {
    let mut violations = Vec::new();
    let Some(map) = value.as_object() else {
        violations.push(Finding::schema(
            CLASS_DOCUMENT_SHAPE,
            ADJACENCY_DOCUMENT,
            "expected a `suburb -> [slug]` record",
        ));
        return Err(SchemaError::new(ADJACENCY_DOCUMENT, violations));
    };

    let mut neighbors: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, entry) in map {
        let source = normalize(key);
        if source.is_empty() {
            violations.push(Finding::schema(
                CLASS_ADJACENCY_SLUG_MISSING,
                key,
                "adjacency source does not normalize to a slug",
            ));
            continue;
        }
        check_canonical(key, key, options, &mut violations);

        let Some(items) = adjacency_targets(entry) else {
            violations.push(Finding::schema(
                CLASS_ADJACENCY_SHAPE,
                &source,
                "expected an array or `{adjacent_suburbs: [...]}`",
            ));
            continue;
        };

        let targets = neighbors.entry(source.clone()).or_default();
        for (index, item) in items.iter().enumerate() {
            let position = format!("{source}[{index}]");
            let Some(raw) = raw_candidate(item) else {
                violations.push(Finding::schema(
                    CLASS_ADJACENCY_SLUG_MISSING,
                    position,
                    "neighbour has no resolvable slug",
                ));
                continue;
            };
            let target = normalize(raw);
            if target.is_empty() {
                violations.push(Finding::schema(
                    CLASS_ADJACENCY_SLUG_MISSING,
                    position,
                    format!("`{raw}` does not normalize to a slug"),
                ));
                continue;
            }
            check_canonical(raw, &position, options, &mut violations);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    if violations.is_empty() {
        Ok(AdjacencyDocument { neighbors })
    } else {
        Err(SchemaError::new(ADJACENCY_DOCUMENT, violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classes(err: &SchemaError) -> Vec<&str> {
        err.violations.iter().map(|v| v.class.as_str()).collect()
    }

    #[test]
    fn listed_and_keyed_shapes_normalize_identically() {
        let listed = json!({
            "clusters": [
                {"slug": "eastern-beaches", "name": "Eastern Beaches", "suburbs": ["Bondi", "Bronte"]}
            ]
        });
        let keyed = json!({"eastern-beaches": ["Bondi", "Bronte"]});

        let a = normalize_clusters(&listed, SchemaOptions::default()).expect("listed shape");
        let b = normalize_clusters(&keyed, SchemaOptions::default()).expect("keyed shape");
        assert_eq!(a, b);
        assert_eq!(a.clusters[0].suburbs[0].slug, "bondi");
        assert_eq!(a.clusters[0].suburbs[0].name, "Bondi");
    }

    #[test]
    fn normalized_document_snapshot() {
        let raw = json!({
            "clusters": [
                {"slug": "north", "suburbs": [
                    {"name": "Manly Vale", "lat": -33.78, "lng": 151.26},
                    "Dee Why"
                ]}
            ]
        });
        let doc = normalize_clusters(&raw, SchemaOptions::default()).expect("valid");
        insta::assert_json_snapshot!(doc, @r###"
        {
          "clusters": [
            {
              "slug": "north",
              "name": "North",
              "suburbs": [
                {
                  "slug": "manly-vale",
                  "name": "Manly Vale",
                  "lat": -33.78,
                  "lng": 151.26
                },
                {
                  "slug": "dee-why",
                  "name": "Dee Why"
                }
              ]
            }
          ]
        }
        "###);
    }

    #[test]
    fn every_violation_is_reported() {
        let raw = json!({
            "clusters": [
                {"name": "", "suburbs": ["a"]},
                {"slug": "c2", "suburbs": [
                    {"lat": 1.0},
                    {"slug": "x", "lat": 95.0, "lng": 10.0},
                    {"slug": "y", "lat": 10.0, "lng": -200.0},
                    "dup",
                    "Dup"
                ]}
            ]
        });
        let err = normalize_clusters(&raw, SchemaOptions::default()).expect_err("invalid");
        let found = classes(&err);
        assert!(found.contains(&CLASS_CLUSTER_SLUG_MISSING));
        assert!(found.contains(&CLASS_SUBURB_SLUG_MISSING));
        assert!(found.contains(&CLASS_SUBURB_DUPLICATE));
        assert_eq!(
            found.iter().filter(|c| **c == CLASS_COORDINATE_RANGE).count(),
            2
        );
    }

    #[test]
    fn string_coordinates_are_accepted() {
        let raw = json!({"c": [{"slug": "a", "lat": "-33.5", "lng": "151.0"}]});
        let doc = normalize_clusters(&raw, SchemaOptions::default()).expect("valid");
        assert_eq!(doc.clusters[0].suburbs[0].coord(), Some(Coord::new(-33.5, 151.0)));
    }

    #[test]
    fn lone_coordinate_is_rejected() {
        let raw = json!({"c": [{"slug": "a", "lat": -33.5}]});
        let err = normalize_clusters(&raw, SchemaOptions::default()).expect_err("incomplete");
        assert_eq!(classes(&err), vec![CLASS_COORDINATE_INCOMPLETE]);
    }

    #[test]
    fn strict_slugs_reject_uncanonical_sources() {
        let raw = json!({"clusters": [{"slug": "North Shore", "suburbs": ["chatswood", "Lane Cove"]}]});
        assert!(normalize_clusters(&raw, SchemaOptions::default()).is_ok());

        let err = normalize_clusters(&raw, SchemaOptions { strict_slugs: true })
            .expect_err("strict mode");
        assert_eq!(
            classes(&err),
            vec![CLASS_SLUG_NOT_CANONICAL, CLASS_SLUG_NOT_CANONICAL]
        );
    }

    #[test]
    fn non_object_document_is_rejected() {
        let err = normalize_clusters(&json!("nope"), SchemaOptions::default()).expect_err("shape");
        assert_eq!(classes(&err), vec![CLASS_DOCUMENT_SHAPE]);
        let err = normalize_clusters(&json!({"clusters": 3}), SchemaOptions::default())
            .expect_err("shape");
        assert_eq!(classes(&err), vec![CLASS_DOCUMENT_SHAPE]);
    }

    #[test]
    fn adjacency_shapes_normalize_identically() {
        let plain = json!({"bondi": ["bronte", "tamarama"]});
        let wrapped = json!({"bondi": {"adjacent_suburbs": ["bronte", "tamarama", "Bronte"]}});
        let a = normalize_adjacency(&plain, SchemaOptions::default()).expect("plain");
        let b = normalize_adjacency(&wrapped, SchemaOptions::default()).expect("wrapped");
        assert_eq!(a, b);
        assert_eq!(a.neighbors["bondi"], vec!["bronte", "tamarama"]);
    }

    #[test]
    fn adjacency_rejects_bad_entries() {
        let raw = json!({"bondi": 7, "bronte": [1, "!!"]});
        let err = normalize_adjacency(&raw, SchemaOptions::default()).expect_err("bad");
        assert_eq!(
            classes(&err),
            vec![
                CLASS_ADJACENCY_SHAPE,
                CLASS_ADJACENCY_SLUG_MISSING,
                CLASS_ADJACENCY_SLUG_MISSING
            ]
        );
    }
}
