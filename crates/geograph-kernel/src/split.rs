//! Cluster splitting: Lloyd's k-means over suburb coordinates.
//!
//! A rebalancing aid for oversized clusters. The result is advisory and
//! meant for human review before it replaces the cluster source of truth.

use crate::catalog::{Cluster, Suburb};
use crate::geo::Coord;
use crate::schema::{ClusterDocument, ClusterRecord};
use crate::slug::{display_name, normalize};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const MAX_ROUNDS: usize = 50;
pub const CONVERGENCE_EPSILON: f64 = 1e-9;

const COMPASS: [&str; 8] = [
    "east",
    "north-east",
    "north",
    "north-west",
    "west",
    "south-west",
    "south",
    "south-east",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("k must be at least 1")]
    InvalidK,

    #[error("cluster `{cluster}` has {available} suburb(s) with coordinates, fewer than k={k}")]
    InsufficientCoordinates {
        cluster: String,
        available: usize,
        k: usize,
    },

    #[error("expected {expected} label(s), got {actual}")]
    LabelCount { expected: usize, actual: usize },

    #[error("label `{0}` does not normalize to a slug")]
    InvalidLabel(String),

    #[error("label `{0}` is given more than once")]
    DuplicateLabel(String),

    #[error("sub-cluster slug `{0}` is already used by another cluster")]
    SlugTaken(String),
}

/// Result of splitting one cluster.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOutcome {
    pub base_slug: String,
    #[serde(serialize_with = "serialize_clusters")]
    pub clusters: Vec<Cluster>,
    /// Centroid of each output cluster, aligned with `clusters`.
    pub centroids: Vec<Coord>,
    /// Suburbs without coordinates; they stay in the base cluster.
    pub unplaced: Vec<String>,
    pub rounds: usize,
    pub converged: bool,
}

fn serialize_clusters<S: serde::Serializer>(
    clusters: &[Cluster],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(clusters.iter().map(Cluster::to_record))
}

fn squared_distance(a: Coord, b: Coord) -> f64 {
    (a.lat - b.lat).powi(2) + (a.lng - b.lng).powi(2)
}

/// Index of the closest centroid; the lowest index wins ties.
fn closest(centroids: &[Coord], point: Coord) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(*centroid, point);
        if d < best_distance {
            best = index;
            best_distance = d;
        }
    }
    best
}

fn compass_label(center: Coord, point: Coord) -> &'static str {
    let d_lat = point.lat - center.lat;
    let d_lng = point.lng - center.lng;
    if d_lat.abs() < CONVERGENCE_EPSILON && d_lng.abs() < CONVERGENCE_EPSILON {
        return "central";
    }
    let angle = d_lat.atan2(d_lng).to_degrees();
    let sector = ((angle / 45.0).round() as i64).rem_euclid(8) as usize;
    COMPASS[sector]
}

fn mean(points: &[Coord]) -> Coord {
    let n = points.len().max(1) as f64;
    let (lat, lng) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
    Coord::new(lat / n, lng / n)
}

/// Normalize the first `k` caller labels, one per k-means bucket.
fn caller_labels(labels: &[String], k: usize) -> Result<Vec<String>, SplitError> {
    if labels.len() < k {
        return Err(SplitError::LabelCount {
            expected: k,
            actual: labels.len(),
        });
    }
    let mut seen = BTreeSet::new();
    let mut slugs = Vec::with_capacity(k);
    for label in labels.iter().take(k) {
        let slug = normalize(label);
        if slug.is_empty() {
            return Err(SplitError::InvalidLabel(label.clone()));
        }
        if !seen.insert(slug.clone()) {
            return Err(SplitError::DuplicateLabel(label.clone()));
        }
        slugs.push(slug);
    }
    Ok(slugs)
}

/// Compass directions from the overall centre, or ordinals when two
/// directions collide.
fn compass_labels(centroids: &[Coord], overall: Coord) -> Vec<String> {
    let compass: Vec<String> = centroids
        .iter()
        .map(|c| compass_label(overall, *c).to_string())
        .collect();
    let distinct: BTreeSet<&String> = compass.iter().collect();
    if distinct.len() == compass.len() {
        compass
    } else {
        (1..=centroids.len()).map(|i| i.to_string()).collect()
    }
}

/// Partition `cluster` into at most `k` geographic sub-clusters.
///
/// Centroids are seeded from evenly spaced suburbs of the (slug-sorted)
/// input, buckets that end up empty keep their previous centroid, and
/// iteration stops after [`MAX_ROUNDS`] or once no centroid moves more than
/// [`CONVERGENCE_EPSILON`]. Empty buckets are omitted from the output;
/// caller labels stay bound to their bucket, so an empty bucket drops its
/// label too.
pub fn split_cluster(
    cluster: &Cluster,
    k: usize,
    labels: Option<&[String]>,
) -> Result<SplitOutcome, SplitError> {
    if k == 0 {
        return Err(SplitError::InvalidK);
    }
    let caller = labels.map(|labels| caller_labels(labels, k)).transpose()?;
    let points: Vec<(&Suburb, Coord)> = cluster
        .suburbs
        .iter()
        .filter_map(|s| s.coord().map(|c| (s, c)))
        .collect();
    if points.len() < k {
        return Err(SplitError::InsufficientCoordinates {
            cluster: cluster.slug.clone(),
            available: points.len(),
            k,
        });
    }
    let unplaced: Vec<String> = cluster
        .suburbs
        .iter()
        .filter(|s| s.coord().is_none())
        .map(|s| s.slug.clone())
        .collect();

    let n = points.len();
    let mut centroids: Vec<Coord> = (0..k).map(|i| points[i * n / k].1).collect();
    let mut assignment = vec![0usize; n];
    let mut rounds = 0;
    let mut converged = false;

    while rounds < MAX_ROUNDS {
        rounds += 1;
        for (slot, (_, point)) in assignment.iter_mut().zip(&points) {
            *slot = closest(&centroids, *point);
        }

        let mut max_shift: f64 = 0.0;
        for (bucket, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<Coord> = points
                .iter()
                .zip(&assignment)
                .filter(|(_, b)| **b == bucket)
                .map(|((_, c), _)| *c)
                .collect();
            if members.is_empty() {
                continue;
            }
            let next = mean(&members);
            max_shift = max_shift.max(squared_distance(*centroid, next).sqrt());
            *centroid = next;
        }
        if max_shift <= CONVERGENCE_EPSILON {
            converged = true;
            break;
        }
    }
    debug!(cluster = %cluster.slug, k, rounds, converged, "k-means finished");

    let mut buckets: Vec<(usize, Coord, Vec<&Suburb>)> = Vec::new();
    for (bucket, centroid) in centroids.iter().enumerate() {
        let members: Vec<&Suburb> = points
            .iter()
            .zip(&assignment)
            .filter(|(_, b)| **b == bucket)
            .map(|((s, _), _)| *s)
            .collect();
        if !members.is_empty() {
            buckets.push((bucket, *centroid, members));
        }
    }

    let overall = mean(&points.iter().map(|(_, c)| *c).collect::<Vec<_>>());
    let bucket_centroids: Vec<Coord> = buckets.iter().map(|(_, c, _)| *c).collect();
    let labels = match caller {
        Some(caller) => buckets
            .iter()
            .map(|(bucket, _, _)| caller[*bucket].clone())
            .collect(),
        None => compass_labels(&bucket_centroids, overall),
    };

    let clusters = buckets
        .iter()
        .zip(&labels)
        .map(|((_, _, members), label)| {
            let slug = format!("{}-{label}", cluster.slug);
            Cluster {
                name: format!("{} {}", cluster.name, display_name(label)),
                suburbs: members
                    .iter()
                    .map(|s| Suburb {
                        cluster_slug: slug.clone(),
                        ..(*s).clone()
                    })
                    .collect(),
                slug,
            }
        })
        .collect();

    Ok(SplitOutcome {
        base_slug: cluster.slug.clone(),
        clusters,
        centroids: bucket_centroids,
        unplaced,
        rounds,
        converged,
    })
}

impl SplitOutcome {
    /// A new cluster document with the base cluster replaced in place by the
    /// sub-clusters. Suburb records are taken from `doc`, so coordinates the
    /// split saw through enrichment are not written back. Unplaced suburbs
    /// stay behind under the base slug.
    pub fn apply(&self, doc: &ClusterDocument) -> Result<ClusterDocument, SplitError> {
        let taken: BTreeSet<&str> = doc
            .clusters
            .iter()
            .filter(|record| record.slug != self.base_slug)
            .map(|record| record.slug.as_str())
            .collect();
        if let Some(clash) = self
            .clusters
            .iter()
            .find(|cluster| taken.contains(cluster.slug.as_str()))
        {
            return Err(SplitError::SlugTaken(clash.slug.clone()));
        }

        let owner: BTreeMap<&str, usize> = self
            .clusters
            .iter()
            .enumerate()
            .flat_map(|(index, cluster)| {
                cluster.suburbs.iter().map(move |s| (s.slug.as_str(), index))
            })
            .collect();

        let mut clusters = Vec::with_capacity(doc.clusters.len() + self.clusters.len());
        for record in &doc.clusters {
            if record.slug != self.base_slug {
                clusters.push(record.clone());
                continue;
            }
            for (index, cluster) in self.clusters.iter().enumerate() {
                clusters.push(ClusterRecord {
                    slug: cluster.slug.clone(),
                    name: cluster.name.clone(),
                    suburbs: record
                        .suburbs
                        .iter()
                        .filter(|s| owner.get(s.slug.as_str()) == Some(&index))
                        .cloned()
                        .collect(),
                });
            }
            if !self.unplaced.is_empty() {
                clusters.push(ClusterRecord {
                    slug: record.slug.clone(),
                    name: record.name.clone(),
                    suburbs: record
                        .suburbs
                        .iter()
                        .filter(|s| self.unplaced.contains(&s.slug))
                        .cloned()
                        .collect(),
                });
            }
        }
        Ok(ClusterDocument { clusters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::schema::{SchemaOptions, normalize_clusters};
    use serde_json::{Value, json};

    fn cluster(value: Value) -> Cluster {
        let doc = normalize_clusters(&value, SchemaOptions::default()).expect("clusters");
        let catalog = Catalog::from_document(&doc).expect("catalog");
        catalog.clusters()[0].clone()
    }

    fn member_sets(outcome: &SplitOutcome) -> BTreeSet<Vec<String>> {
        outcome
            .clusters
            .iter()
            .map(|c| c.suburbs.iter().map(|s| s.slug.clone()).collect())
            .collect()
    }

    #[test]
    fn two_obvious_pairs_converge_regardless_of_seed_order() {
        let expected: BTreeSet<Vec<String>> = [
            vec!["a".to_string(), "c".to_string()],
            vec!["b".to_string(), "d".to_string()],
        ]
        .into_iter()
        .collect();

        // Slug order interleaves the pairs, so both seeds start in one pair.
        let interleaved = cluster(json!({"big": [
            {"slug": "a", "lat": 0.0, "lng": 0.0},
            {"slug": "b", "lat": 10.0, "lng": 10.0},
            {"slug": "c", "lat": 0.0, "lng": 0.1},
            {"slug": "d", "lat": 10.0, "lng": 10.1}
        ]}));
        let outcome = split_cluster(&interleaved, 2, None).expect("split");
        assert_eq!(member_sets(&outcome), expected);
        assert!(outcome.converged);

        let grouped = cluster(json!({"big": [
            {"slug": "a", "lat": 0.0, "lng": 0.0},
            {"slug": "c", "lat": 0.0, "lng": 0.1},
            {"slug": "b", "lat": 10.0, "lng": 10.0},
            {"slug": "d", "lat": 10.0, "lng": 10.1}
        ]}));
        let outcome = split_cluster(&grouped, 2, None).expect("split");
        assert_eq!(member_sets(&outcome), expected);
    }

    #[test]
    fn compass_labels_name_sub_clusters() {
        let c = cluster(json!({"inner-west": [
            {"slug": "a", "lat": 0.0, "lng": 0.0},
            {"slug": "b", "lat": 10.0, "lng": 0.0},
            {"slug": "c", "lat": 0.1, "lng": 0.0},
            {"slug": "d", "lat": 10.1, "lng": 0.0}
        ]}));
        let outcome = split_cluster(&c, 2, None).expect("split");
        let slugs: Vec<&str> = outcome.clusters.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["inner-west-south", "inner-west-north"]);
        assert_eq!(outcome.clusters[1].name, "Inner West North");
        assert!(
            outcome.clusters[1]
                .suburbs
                .iter()
                .all(|s| s.cluster_slug == "inner-west-north")
        );
    }

    #[test]
    fn explicit_labels_and_label_errors() {
        let c = cluster(json!({"x": [
            {"slug": "a", "lat": 0.0, "lng": 0.0},
            {"slug": "b", "lat": 5.0, "lng": 5.0}
        ]}));
        let labels = vec!["Upper".to_string(), "Lower".to_string()];
        let outcome = split_cluster(&c, 2, Some(&labels)).expect("split");
        assert_eq!(outcome.clusters[0].slug, "x-upper");
        assert_eq!(outcome.clusters[1].slug, "x-lower");

        let short = vec!["only".to_string()];
        assert_eq!(
            split_cluster(&c, 2, Some(&short)).expect_err("too few labels"),
            SplitError::LabelCount {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn insufficient_coordinates_fail() {
        let c = cluster(json!({"x": [{"slug": "a", "lat": 0.0, "lng": 0.0}, "b", "c"]}));
        let err = split_cluster(&c, 2, None).expect_err("too few located suburbs");
        assert_eq!(
            err,
            SplitError::InsufficientCoordinates {
                cluster: "x".to_string(),
                available: 1,
                k: 2
            }
        );
        assert_eq!(split_cluster(&c, 0, None).expect_err("k=0"), SplitError::InvalidK);
    }

    #[test]
    fn apply_replaces_cluster_and_keeps_unplaced() {
        let raw = json!({"clusters": [
            {"slug": "keep", "suburbs": ["z"]},
            {"slug": "big", "suburbs": [
                {"slug": "a", "lat": 0.0, "lng": 0.0},
                {"slug": "b", "lat": 0.0, "lng": 9.0},
                "loose"
            ]}
        ]});
        let doc = normalize_clusters(&raw, SchemaOptions::default()).expect("clusters");
        let catalog = Catalog::from_document(&doc).expect("catalog");
        let big = catalog.cluster("big").expect("big");
        let outcome = split_cluster(big, 2, None).expect("split");
        assert_eq!(outcome.unplaced, vec!["loose"]);

        let next = outcome.apply(&doc).expect("apply");
        let slugs: Vec<&str> = next.clusters.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["keep", "big-west", "big-east", "big"]);
        assert_eq!(next.clusters[3].suburbs.len(), 1);
        assert!(Catalog::from_document(&next).is_ok());
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let c = cluster(json!({"x": [
            {"slug": "a", "lat": 0.0, "lng": 0.0},
            {"slug": "b", "lat": 5.0, "lng": 5.0}
        ]}));
        let labels = vec!["Upper".to_string(), "upper".to_string()];
        assert_eq!(
            split_cluster(&c, 2, Some(&labels)).expect_err("same slug twice"),
            SplitError::DuplicateLabel("upper".to_string())
        );
    }

    #[test]
    fn caller_labels_follow_their_bucket_past_empty_ones() {
        // a and b share a point, so the second seed never wins a suburb.
        let c = cluster(json!({"x": [
            {"slug": "a", "lat": 0.0, "lng": 0.0},
            {"slug": "b", "lat": 0.0, "lng": 0.0},
            {"slug": "c", "lat": 10.0, "lng": 10.0}
        ]}));
        let labels = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let outcome = split_cluster(&c, 3, Some(&labels)).expect("split");
        let slugs: Vec<&str> = outcome.clusters.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["x-one", "x-three"]);
        assert_eq!(outcome.clusters[1].suburbs[0].slug, "c");
    }

    #[test]
    fn apply_refuses_slugs_owned_by_other_clusters() {
        let raw = json!({"clusters": [
            {"slug": "big-west", "suburbs": ["z"]},
            {"slug": "big", "suburbs": [
                {"slug": "a", "lat": 0.0, "lng": 0.0},
                {"slug": "b", "lat": 0.0, "lng": 9.0}
            ]}
        ]});
        let doc = normalize_clusters(&raw, SchemaOptions::default()).expect("clusters");
        let catalog = Catalog::from_document(&doc).expect("catalog");
        let outcome = split_cluster(catalog.cluster("big").expect("big"), 2, None).expect("split");
        assert_eq!(
            outcome.apply(&doc).expect_err("slug clash"),
            SplitError::SlugTaken("big-west".to_string())
        );
    }

    #[test]
    fn apply_writes_authored_records_not_catalog_copies() {
        let raw = json!({"clusters": [{"slug": "big", "suburbs": [
            {"slug": "a", "lat": 0.0, "lng": 0.0},
            {"slug": "b", "lat": 0.0, "lng": 9.0},
            "c"
        ]}]});
        let doc = normalize_clusters(&raw, SchemaOptions::default()).expect("clusters");
        let catalog = Catalog::from_document(&doc).expect("catalog");
        let mut big = catalog.cluster("big").expect("big").clone();
        // Coordinates that came from enrichment rather than the document.
        for suburb in &mut big.suburbs {
            if suburb.slug == "c" {
                suburb.lat = Some(0.0);
                suburb.lng = Some(8.9);
            }
        }
        let outcome = split_cluster(&big, 2, None).expect("split");
        assert!(outcome.unplaced.is_empty());

        let next = outcome.apply(&doc).expect("apply");
        let c = next
            .clusters
            .iter()
            .flat_map(|record| &record.suburbs)
            .find(|s| s.slug == "c")
            .expect("c is kept");
        assert_eq!((c.lat, c.lng), (None, None));
        let total: usize = next.clusters.iter().map(|r| r.suburbs.len()).sum();
        assert_eq!(total, 3);
    }
}
