//! Coordinate enrichment from CSV and GeoJSON sources.
//!
//! Enrichment only backfills suburbs that have no coordinates; authored
//! coordinates always win. Malformed rows and rows for unknown suburbs are
//! reported as warnings, never as failures.

use crate::catalog::Catalog;
use crate::error::Finding;
use crate::geo::{Coord, vertex_centroid};
use crate::slug::normalize;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const CLASS_ENRICH_ROW: &str = "enrich.row.malformed";
pub const CLASS_ENRICH_UNKNOWN: &str = "enrich.row.unknown_suburb";
pub const CLASS_ENRICH_CONFLICT: &str = "enrich.row.conflicting_coordinates";

/// Errors that make an enrichment source unusable as a whole.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("{source_name}: missing header row")]
    MissingHeader { source_name: String },

    #[error("{source_name}: no usable {column} column")]
    MissingColumn {
        source_name: String,
        column: &'static str,
    },

    #[error("{source_name}: expected a GeoJSON FeatureCollection or Feature")]
    NotGeoJson { source_name: String },
}

/// One coordinate observation for a suburb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateRow {
    pub slug: String,
    pub name: Option<String>,
    pub coord: Coord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichSummary {
    pub rows: usize,
    pub applied: usize,
    pub unknown: usize,
    pub already_located: usize,
}

fn sa2_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^sa2_(?:main_)?name(?:_?\d{2,4})?$").expect("sa2 name regex must compile")
    })
}

#[derive(Debug, Clone, Copy)]
struct CsvColumns {
    slug: Option<usize>,
    name: Option<usize>,
    lat: usize,
    lng: usize,
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.eq_ignore_ascii_case(c)))
}

impl CsvColumns {
    fn detect(headers: &[String], source_name: &str) -> Result<Self, EnrichError> {
        let slug = find_column(headers, &["slug"]);
        let name = find_column(headers, &["name", "suburb"])
            .or_else(|| headers.iter().position(|h| sa2_name_re().is_match(h)));
        if slug.is_none() && name.is_none() {
            return Err(EnrichError::MissingColumn {
                source_name: source_name.to_string(),
                column: "slug/name",
            });
        }
        let lat = find_column(headers, &["lat", "latitude", "y"]).ok_or_else(|| {
            EnrichError::MissingColumn {
                source_name: source_name.to_string(),
                column: "lat",
            }
        })?;
        let lng = find_column(headers, &["lng", "lon", "long", "longitude", "x"]).ok_or_else(
            || EnrichError::MissingColumn {
                source_name: source_name.to_string(),
                column: "lng",
            },
        )?;
        Ok(Self {
            slug,
            name,
            lat,
            lng,
        })
    }
}

/// Split one CSV record, honouring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// Parse coordinate rows from CSV text (`slug,name,lat,lng` or SA2-style
/// headers). Rows that cannot be used are returned as findings.
pub fn parse_csv(
    text: &str,
    source_name: &str,
) -> Result<(Vec<CoordinateRow>, Vec<Finding>), EnrichError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let Some((_, header)) = lines.next() else {
        return Err(EnrichError::MissingHeader {
            source_name: source_name.to_string(),
        });
    };
    let headers = split_csv_line(header.trim_start_matches('\u{feff}'));
    let columns = CsvColumns::detect(&headers, source_name)?;

    let mut rows = Vec::new();
    let mut findings = Vec::new();
    for (line_no, line) in lines {
        let subject = format!("{source_name}:{}", line_no + 1);
        let fields = split_csv_line(line);
        let field = |index: Option<usize>| {
            index
                .and_then(|i| fields.get(i))
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        };

        let name = field(columns.name).map(str::to_string);
        let slug = field(columns.slug)
            .or(name.as_deref())
            .map(normalize)
            .filter(|s| !s.is_empty());
        let lat = field(Some(columns.lat)).and_then(|v| v.parse::<f64>().ok());
        let lng = field(Some(columns.lng)).and_then(|v| v.parse::<f64>().ok());

        match (slug, lat, lng) {
            (Some(slug), Some(lat), Some(lng)) if Coord::new(lat, lng).is_valid() => {
                rows.push(CoordinateRow {
                    slug,
                    name,
                    coord: Coord::new(lat, lng),
                });
            }
            _ => findings.push(Finding::warning(
                CLASS_ENRICH_ROW,
                subject,
                "row lacks a slug or valid lat/lng",
            )),
        }
    }
    Ok((rows, findings))
}

fn position(value: &Value) -> Option<Coord> {
    let pair = value.as_array()?;
    let lng = pair.first()?.as_f64()?;
    let lat = pair.get(1)?.as_f64()?;
    Some(Coord::new(lat, lng))
}

/// Outer-ring vertices, without the closing vertex that repeats the first.
fn outer_ring(polygon: &Value) -> Vec<Coord> {
    let mut ring: Vec<Coord> = polygon
        .as_array()
        .and_then(|rings| rings.first())
        .and_then(Value::as_array)
        .map(|points| points.iter().filter_map(position).collect())
        .unwrap_or_default();
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

fn geometry_point(geometry: &Value) -> Option<Coord> {
    let coordinates = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Point" => position(coordinates),
        "Polygon" => vertex_centroid(&outer_ring(coordinates)),
        "MultiPolygon" => {
            let vertices: Vec<Coord> = coordinates
                .as_array()?
                .iter()
                .flat_map(outer_ring)
                .collect();
            vertex_centroid(&vertices)
        }
        _ => None,
    }
}

fn feature_name(properties: Option<&Value>) -> Option<String> {
    let properties = properties?.as_object()?;
    properties
        .get("name")
        .or_else(|| {
            properties
                .iter()
                .find(|(key, _)| sa2_name_re().is_match(key))
                .map(|(_, value)| value)
        })
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Parse coordinate rows from a GeoJSON Feature or FeatureCollection.
///
/// Non-point geometries contribute the centroid of their outer-ring
/// vertices.
pub fn parse_geojson(
    value: &Value,
    source_name: &str,
) -> Result<(Vec<CoordinateRow>, Vec<Finding>), EnrichError> {
    let features: Vec<&Value> = match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => value
            .get("features")
            .and_then(Value::as_array)
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
        Some("Feature") => vec![value],
        _ => {
            return Err(EnrichError::NotGeoJson {
                source_name: source_name.to_string(),
            });
        }
    };

    let mut rows = Vec::new();
    let mut findings = Vec::new();
    for (index, feature) in features.into_iter().enumerate() {
        let properties = feature.get("properties");
        let name = feature_name(properties);
        let slug = properties
            .and_then(|p| p.get("slug"))
            .and_then(Value::as_str)
            .or(name.as_deref())
            .map(normalize)
            .filter(|s| !s.is_empty());
        let coord = feature
            .get("geometry")
            .and_then(geometry_point)
            .filter(Coord::is_valid);

        match (slug, coord) {
            (Some(slug), Some(coord)) => rows.push(CoordinateRow { slug, name, coord }),
            _ => findings.push(Finding::warning(
                CLASS_ENRICH_ROW,
                format!("{source_name}#{index}"),
                "feature lacks a slug/name or a supported geometry",
            )),
        }
    }
    Ok((rows, findings))
}

/// Backfill coordinates into a new catalog.
///
/// The first row seen for a slug wins; later rows that disagree are
/// reported.
pub fn backfill(
    catalog: &Catalog,
    rows: &[CoordinateRow],
) -> (Catalog, EnrichSummary, Vec<Finding>) {
    let mut findings = Vec::new();
    let mut summary = EnrichSummary {
        rows: rows.len(),
        ..EnrichSummary::default()
    };
    let mut coords: BTreeMap<String, Coord> = BTreeMap::new();

    for row in rows {
        let Some(suburb) = catalog.suburb(&row.slug) else {
            summary.unknown += 1;
            findings.push(Finding::warning(
                CLASS_ENRICH_UNKNOWN,
                &row.slug,
                "enrichment row does not match any catalog suburb",
            ));
            continue;
        };
        if suburb.coord().is_some() {
            summary.already_located += 1;
            continue;
        }
        match coords.get(&row.slug) {
            Some(existing) if *existing != row.coord => findings.push(Finding::warning(
                CLASS_ENRICH_CONFLICT,
                &row.slug,
                "enrichment sources disagree; keeping the first row",
            )),
            Some(_) => {}
            None => {
                coords.insert(row.slug.clone(), row.coord);
            }
        }
    }

    let (next, applied) = catalog.with_backfilled_coords(&coords);
    summary.applied = applied.len();
    (next, summary, findings)
}
