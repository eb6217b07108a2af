//! Suburb catalog and the cluster index.
//!
//! The index enforces the single-claim invariant: a suburb belongs to
//! exactly one cluster. Unlike adjacency, this is never a soft finding.

use crate::error::{Finding, ReferentialError};
use crate::geo::Coord;
use crate::schema::{ClusterDocument, ClusterRecord, SuburbRecord};
use std::collections::BTreeMap;

pub const CLASS_SUBURB_MULTI_CLUSTER: &str = "referential.suburb.multiple_clusters";

#[derive(Debug, Clone, PartialEq)]
pub struct Suburb {
    pub slug: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub cluster_slug: String,
}

impl Suburb {
    pub fn coord(&self) -> Option<Coord> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coord::new(lat, lng)),
            _ => None,
        }
    }

    fn from_record(record: &SuburbRecord, cluster_slug: &str) -> Self {
        Self {
            slug: record.slug.clone(),
            name: record.name.clone(),
            lat: record.lat,
            lng: record.lng,
            cluster_slug: cluster_slug.to_string(),
        }
    }

    pub fn to_record(&self) -> SuburbRecord {
        SuburbRecord {
            slug: self.slug.clone(),
            name: self.name.clone(),
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub slug: String,
    pub name: String,
    /// Sorted by slug.
    pub suburbs: Vec<Suburb>,
}

impl Cluster {
    pub fn to_record(&self) -> ClusterRecord {
        ClusterRecord {
            slug: self.slug.clone(),
            name: self.name.clone(),
            suburbs: self.suburbs.iter().map(Suburb::to_record).collect(),
        }
    }
}

/// Suburb → cluster and cluster → suburbs lookup tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterIndex {
    suburb_to_cluster: BTreeMap<String, String>,
    cluster_to_suburbs: BTreeMap<String, Vec<String>>,
}

impl ClusterIndex {
    /// Build the index, failing if any suburb is claimed by two clusters.
    pub fn build(clusters: &[ClusterRecord]) -> Result<Self, ReferentialError> {
        let (index, violations) = Self::build_with_conflicts(clusters);
        if violations.is_empty() {
            Ok(index)
        } else {
            Err(ReferentialError { violations })
        }
    }

    /// Build the index with first-claim-wins semantics, returning every
    /// conflicting claim as a referential finding.
    pub fn build_with_conflicts(clusters: &[ClusterRecord]) -> (Self, Vec<Finding>) {
        let mut suburb_to_cluster: BTreeMap<String, String> = BTreeMap::new();
        let mut cluster_to_suburbs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut violations = Vec::new();

        for cluster in clusters {
            let members = cluster_to_suburbs.entry(cluster.slug.clone()).or_default();
            for suburb in &cluster.suburbs {
                match suburb_to_cluster.get(&suburb.slug) {
                    Some(owner) if owner != &cluster.slug => {
                        violations.push(Finding::referential(
                            CLASS_SUBURB_MULTI_CLUSTER,
                            &suburb.slug,
                            format!(
                                "suburb claimed by clusters `{owner}` and `{}`",
                                cluster.slug
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        suburb_to_cluster.insert(suburb.slug.clone(), cluster.slug.clone());
                        members.push(suburb.slug.clone());
                    }
                }
            }
            members.sort();
        }

        (
            Self {
                suburb_to_cluster,
                cluster_to_suburbs,
            },
            violations,
        )
    }

    pub fn cluster_of(&self, suburb: &str) -> Option<&str> {
        self.suburb_to_cluster.get(suburb).map(String::as_str)
    }

    pub fn suburbs_of(&self, cluster: &str) -> &[String] {
        self.cluster_to_suburbs
            .get(cluster)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, suburb: &str) -> bool {
        self.suburb_to_cluster.contains_key(suburb)
    }

    pub fn has_cluster(&self, cluster: &str) -> bool {
        self.cluster_to_suburbs.contains_key(cluster)
    }

    pub fn same_cluster(&self, a: &str, b: &str) -> bool {
        match (self.cluster_of(a), self.cluster_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn suburb_to_cluster(&self) -> &BTreeMap<String, String> {
        &self.suburb_to_cluster
    }

    pub fn cluster_to_suburbs(&self) -> &BTreeMap<String, Vec<String>> {
        &self.cluster_to_suburbs
    }
}

/// Indexed, immutable view of a normalized cluster document.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    clusters: Vec<Cluster>,
    suburbs: BTreeMap<String, Suburb>,
    index: ClusterIndex,
}

impl Catalog {
    /// Build a catalog, failing on any multi-cluster claim.
    pub fn from_document(doc: &ClusterDocument) -> Result<Self, ReferentialError> {
        let (catalog, violations) = Self::from_document_with_conflicts(doc);
        if violations.is_empty() {
            Ok(catalog)
        } else {
            Err(ReferentialError { violations })
        }
    }

    /// Build a catalog where later claims on an already-indexed suburb are
    /// dropped and reported.
    pub fn from_document_with_conflicts(doc: &ClusterDocument) -> (Self, Vec<Finding>) {
        let (index, violations) = ClusterIndex::build_with_conflicts(&doc.clusters);

        let mut suburbs = BTreeMap::new();
        let mut clusters = Vec::with_capacity(doc.clusters.len());
        for record in &doc.clusters {
            let mut members: Vec<Suburb> = record
                .suburbs
                .iter()
                .filter(|s| index.cluster_of(&s.slug) == Some(record.slug.as_str()))
                .map(|s| Suburb::from_record(s, &record.slug))
                .collect();
            members.sort_by(|a, b| a.slug.cmp(&b.slug));
            for suburb in &members {
                suburbs.insert(suburb.slug.clone(), suburb.clone());
            }
            clusters.push(Cluster {
                slug: record.slug.clone(),
                name: record.name.clone(),
                suburbs: members,
            });
        }

        (
            Self {
                clusters,
                suburbs,
                index,
            },
            violations,
        )
    }

    pub fn index(&self) -> &ClusterIndex {
        &self.index
    }

    /// Clusters in document order.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster(&self, slug: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.slug == slug)
    }

    pub fn suburb(&self, slug: &str) -> Option<&Suburb> {
        self.suburbs.get(slug)
    }

    /// All suburbs in slug order.
    pub fn suburbs(&self) -> impl Iterator<Item = &Suburb> {
        self.suburbs.values()
    }

    pub fn len(&self) -> usize {
        self.suburbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suburbs.is_empty()
    }

    /// Canonical document view (clusters in order, suburbs sorted).
    pub fn to_document(&self) -> ClusterDocument {
        ClusterDocument {
            clusters: self.clusters.iter().map(Cluster::to_record).collect(),
        }
    }

    /// A new catalog with coordinates filled in for suburbs lacking them.
    ///
    /// Existing coordinates are never overwritten. Returns the slugs that
    /// received coordinates.
    pub fn with_backfilled_coords(&self, coords: &BTreeMap<String, Coord>) -> (Self, Vec<String>) {
        let mut applied = Vec::new();
        let mut next = self.clone();
        for cluster in &mut next.clusters {
            for suburb in &mut cluster.suburbs {
                if suburb.coord().is_some() {
                    continue;
                }
                if let Some(coord) = coords.get(&suburb.slug) {
                    suburb.lat = Some(coord.lat);
                    suburb.lng = Some(coord.lng);
                    applied.push(suburb.slug.clone());
                }
            }
        }
        for cluster in &next.clusters {
            for suburb in &cluster.suburbs {
                next.suburbs.insert(suburb.slug.clone(), suburb.clone());
            }
        }
        applied.sort();
        (next, applied)
    }
}
