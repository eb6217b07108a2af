//! Proximity scoring and the "nearby suburbs" ranking.
//!
//! `score(a, b)` is the sum of three terms:
//!
//! ```text
//! adjacency  +adjacencyBoost            when b is a direct neighbour of a
//! cluster    +clusterBoost              when a and b share a cluster
//!            -|crossClusterPenalty|     otherwise (0 under `allow`)
//! distance   -|biasKm| * distanceWeight * haversine_km(a, b)
//!            0 when either side has no coordinates
//! ```
//!
//! Every ordering is total: ties on score resolve by ascending slug, so the
//! same catalog and weights always produce the same lists.

use crate::adjacency::AdjacencyGraph;
use crate::catalog::{Catalog, Suburb};
use crate::config::{CrossClusterMode, ScoreWeights};
use crate::coverage::CoverageMap;
use crate::geo::haversine_km;
use crate::snapshot::{NearbyEntry, ProximitySnapshot};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Per-term score breakdown for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub slug: String,
    pub name: String,
    pub cluster: String,
    pub adjacent: bool,
    pub same_cluster: bool,
    pub adjacency_term: f64,
    pub cluster_term: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub distance_term: f64,
    pub total: f64,
}

/// What a snapshot repair changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairSummary {
    pub sources_dropped: Vec<String>,
    pub sources_added: Vec<String>,
    pub self_references: usize,
    pub duplicates: usize,
    pub unknown_targets: usize,
    pub excluded_targets: usize,
    pub truncated: usize,
    pub padded: usize,
}

impl RepairSummary {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

fn by_score_then_slug(a: &ScoreBreakdown, b: &ScoreBreakdown) -> Ordering {
    b.total.total_cmp(&a.total).then_with(|| a.slug.cmp(&b.slug))
}

/// Scorer bound to one catalog, graph and weight set.
#[derive(Debug, Clone, Copy)]
pub struct Proximity<'a> {
    catalog: &'a Catalog,
    adjacency: &'a AdjacencyGraph,
    weights: &'a ScoreWeights,
    service: Option<(&'a CoverageMap, &'a str)>,
}

impl<'a> Proximity<'a> {
    pub fn new(
        catalog: &'a Catalog,
        adjacency: &'a AdjacencyGraph,
        weights: &'a ScoreWeights,
    ) -> Self {
        Self {
            catalog,
            adjacency,
            weights,
            service: None,
        }
    }

    /// Restrict recommendations to suburbs offering `service` when the
    /// weights ask for `onlyCovered`.
    pub fn for_service(mut self, coverage: &'a CoverageMap, service: &'a str) -> Self {
        self.service = Some((coverage, service));
        self
    }

    pub fn weights(&self) -> &ScoreWeights {
        self.weights
    }

    pub fn explain(&self, a: &Suburb, b: &Suburb) -> ScoreBreakdown {
        let adjacent = self.adjacency.has_edge(&a.slug, &b.slug);
        let same_cluster = a.cluster_slug == b.cluster_slug;

        let adjacency_term = if adjacent {
            self.weights.adjacency_boost
        } else {
            0.0
        };
        let cluster_term = match (same_cluster, self.weights.cross_cluster_mode) {
            (true, _) => self.weights.cluster_boost,
            (false, CrossClusterMode::Allow) => 0.0,
            (false, _) => -self.weights.cross_cluster_penalty.abs(),
        };
        let distance_km = match (a.coord(), b.coord()) {
            (Some(x), Some(y)) => Some(haversine_km(x, y)),
            _ => None,
        };
        let distance_term = distance_km.map_or(0.0, |km| -self.weights.per_km_penalty() * km);

        ScoreBreakdown {
            slug: b.slug.clone(),
            name: b.name.clone(),
            cluster: b.cluster_slug.clone(),
            adjacent,
            same_cluster,
            adjacency_term,
            cluster_term,
            distance_km,
            distance_term,
            total: adjacency_term + cluster_term + distance_term,
        }
    }

    pub fn score(&self, a: &Suburb, b: &Suburb) -> f64 {
        self.explain(a, b).total
    }

    /// Whether `b` may be recommended for `a` at all.
    fn is_candidate(&self, a: &Suburb, b: &Suburb) -> bool {
        if a.slug == b.slug {
            return false;
        }
        if self.weights.cross_cluster_mode == CrossClusterMode::Drop
            && a.cluster_slug != b.cluster_slug
        {
            return false;
        }
        match self.service {
            Some((coverage, service)) if self.weights.only_covered => {
                coverage.is_offered(service, &b.slug)
            }
            _ => true,
        }
    }

    /// Every candidate for `a` with its breakdown, best first.
    pub fn ranked(&self, a: &Suburb) -> Vec<ScoreBreakdown> {
        let mut ranked: Vec<ScoreBreakdown> = self
            .catalog
            .suburbs()
            .filter(|b| self.is_candidate(a, b))
            .map(|b| self.explain(a, b))
            .collect();
        ranked.sort_by(by_score_then_slug);
        ranked
    }

    /// Full-catalog ranking: the `limit` best-scoring candidates.
    pub fn nearest(&self, a: &Suburb, limit: usize) -> Vec<&'a Suburb> {
        self.ranked(a)
            .into_iter()
            .take(limit)
            .filter_map(|row| self.catalog.suburb(&row.slug))
            .collect()
    }

    /// Tiered recommendation using the configured limit.
    pub fn nearby(&self, a: &Suburb) -> Vec<&'a Suburb> {
        self.nearby_with_limit(a, self.weights.limit)
    }

    /// Tiered recommendation: direct neighbours by score, then same-cluster
    /// suburbs by distance, then the global ranking.
    pub fn nearby_with_limit(&self, a: &Suburb, limit: usize) -> Vec<&'a Suburb> {
        let mut chosen: Vec<&'a Suburb> = Vec::with_capacity(limit);
        let mut seen: BTreeSet<&str> = BTreeSet::new();

        let mut neighbours: Vec<ScoreBreakdown> = self
            .adjacency
            .neighbors(&a.slug)
            .iter()
            .filter_map(|slug| self.catalog.suburb(slug))
            .filter(|b| self.is_candidate(a, b))
            .map(|b| self.explain(a, b))
            .collect();
        neighbours.sort_by(by_score_then_slug);
        for row in neighbours {
            if chosen.len() >= limit {
                break;
            }
            if let Some(suburb) = self.catalog.suburb(&row.slug)
                && seen.insert(suburb.slug.as_str())
            {
                chosen.push(suburb);
            }
        }

        if chosen.len() < limit {
            let mut peers: Vec<(Option<f64>, &'a Suburb)> = self
                .catalog
                .index()
                .suburbs_of(&a.cluster_slug)
                .iter()
                .filter_map(|slug| self.catalog.suburb(slug))
                .filter(|b| !seen.contains(b.slug.as_str()) && self.is_candidate(a, b))
                .map(|b| {
                    let km = a.coord().zip(b.coord()).map(|(x, y)| haversine_km(x, y));
                    (km, b)
                })
                .collect();
            peers.sort_by(|(da, pa), (db, pb)| match (da, db) {
                (Some(x), Some(y)) => x.total_cmp(y).then_with(|| pa.slug.cmp(&pb.slug)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => pa.slug.cmp(&pb.slug),
            });
            for (_, suburb) in peers {
                if chosen.len() >= limit {
                    break;
                }
                seen.insert(suburb.slug.as_str());
                chosen.push(suburb);
            }
        }

        if chosen.len() < limit {
            for suburb in self.nearest(a, self.catalog.len()) {
                if chosen.len() >= limit {
                    break;
                }
                if seen.insert(suburb.slug.as_str()) {
                    chosen.push(suburb);
                }
            }
        }

        chosen
    }

    fn entries(suburbs: &[&Suburb]) -> Vec<NearbyEntry> {
        suburbs
            .iter()
            .map(|s| NearbyEntry {
                slug: s.slug.clone(),
                name: s.name.clone(),
            })
            .collect()
    }

    /// Nearby lists for every suburb in the catalog.
    pub fn snapshot(&self) -> ProximitySnapshot {
        let nearby: BTreeMap<String, Vec<NearbyEntry>> = self
            .catalog
            .suburbs()
            .map(|a| (a.slug.clone(), Self::entries(&self.nearby(a))))
            .collect();
        debug!(sources = nearby.len(), "computed proximity snapshot");
        ProximitySnapshot::new(nearby)
    }

    /// Repair a prior snapshot against the current catalog.
    ///
    /// Drops unknown sources, self references, duplicates, unknown and
    /// ineligible targets, truncates to `limit`, then pads shortfalls from
    /// [`Proximity::nearest`]. Catalog suburbs missing from the prior
    /// snapshot get a fresh [`Proximity::nearby`] list.
    pub fn repair(&self, previous: &ProximitySnapshot) -> (ProximitySnapshot, RepairSummary) {
        let limit = self.weights.limit;
        let mut summary = RepairSummary::default();
        let mut nearby: BTreeMap<String, Vec<NearbyEntry>> = BTreeMap::new();

        for (source, entries) in &previous.nearby {
            let Some(a) = self.catalog.suburb(source) else {
                summary.sources_dropped.push(source.clone());
                continue;
            };

            let mut kept: Vec<&'a Suburb> = Vec::with_capacity(limit);
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            for entry in entries {
                if entry.slug == a.slug {
                    summary.self_references += 1;
                    continue;
                }
                let Some(b) = self.catalog.suburb(&entry.slug) else {
                    summary.unknown_targets += 1;
                    continue;
                };
                if !seen.insert(b.slug.as_str()) {
                    summary.duplicates += 1;
                    continue;
                }
                if !self.is_candidate(a, b) {
                    summary.excluded_targets += 1;
                    continue;
                }
                kept.push(b);
            }

            if kept.len() > limit {
                summary.truncated += kept.len() - limit;
                kept.truncate(limit);
            }
            if kept.len() < limit {
                for b in self.nearest(a, self.catalog.len()) {
                    if kept.len() >= limit {
                        break;
                    }
                    if seen.insert(b.slug.as_str()) {
                        summary.padded += 1;
                        kept.push(b);
                    }
                }
            }
            nearby.insert(a.slug.clone(), Self::entries(&kept));
        }

        for a in self.catalog.suburbs() {
            if !nearby.contains_key(&a.slug) {
                summary.sources_added.push(a.slug.clone());
                nearby.insert(a.slug.clone(), Self::entries(&self.nearby(a)));
            }
        }

        (ProximitySnapshot::new(nearby), summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaOptions, normalize_adjacency, normalize_clusters};
    use serde_json::{Value, json};

    struct Fixture {
        catalog: Catalog,
        adjacency: AdjacencyGraph,
    }

    impl Fixture {
        fn new(clusters: Value, adjacency: Value) -> Self {
            let doc = normalize_clusters(&clusters, SchemaOptions::default()).expect("clusters");
            let adj = normalize_adjacency(&adjacency, SchemaOptions::default()).expect("adj");
            Self {
                catalog: Catalog::from_document(&doc).expect("catalog"),
                adjacency: AdjacencyGraph::build(&adj),
            }
        }

        fn suburb(&self, slug: &str) -> &Suburb {
            self.catalog.suburb(slug).expect("fixture suburb")
        }

        fn slugs(list: Vec<&Suburb>) -> Vec<&str> {
            list.into_iter().map(|s| s.slug.as_str()).collect()
        }
    }

    fn scenario_weights() -> ScoreWeights {
        ScoreWeights {
            adjacency_boost: 24.0,
            cluster_boost: 200.0,
            bias_km: 1.0,
            cross_cluster_penalty: 200.0,
            ..ScoreWeights::default()
        }
    }

    fn scenario() -> Fixture {
        Fixture::new(
            json!({
                "clusterA": [
                    {"slug": "p", "lat": 0.0, "lng": 0.0},
                    {"slug": "q", "lat": 0.0, "lng": 1.0}
                ],
                "clusterB": [{"slug": "r", "lat": 0.0, "lng": 10.0}]
            }),
            json!({"p": ["q"]}),
        )
    }

    #[test]
    fn adjacency_and_cluster_dominate_distance() {
        let f = scenario();
        let weights = scenario_weights();
        let scorer = Proximity::new(&f.catalog, &f.adjacency, &weights);
        let nearest = scorer.nearest(f.suburb("p"), 1);
        assert_eq!(Fixture::slugs(nearest), vec!["q"]);

        let q = scorer.explain(f.suburb("p"), f.suburb("q"));
        assert!(q.adjacent && q.same_cluster);
        assert_eq!(q.adjacency_term, 24.0);
        assert_eq!(q.cluster_term, 200.0);
        assert!((q.distance_term + 111.19).abs() < 0.01);
    }

    #[test]
    fn nearest_is_deterministic_with_slug_tie_break() {
        let f = Fixture::new(json!({"c": ["a", "zeta", "beta", "mu"]}), json!({}));
        let weights = ScoreWeights::default();
        let scorer = Proximity::new(&f.catalog, &f.adjacency, &weights);
        let first = Fixture::slugs(scorer.nearest(f.suburb("a"), 3));
        let second = Fixture::slugs(scorer.nearest(f.suburb("a"), 3));
        assert_eq!(first, vec!["beta", "mu", "zeta"]);
        assert_eq!(first, second);
    }

    #[test]
    fn cross_cluster_pair_scores_strictly_lower() {
        let split = Fixture::new(
            json!({"one": [{"slug": "a", "lat": 0.0, "lng": 0.0}],
                   "two": [{"slug": "b", "lat": 0.0, "lng": 0.5}]}),
            json!({}),
        );
        let joined = Fixture::new(
            json!({"one": [
                {"slug": "a", "lat": 0.0, "lng": 0.0},
                {"slug": "b", "lat": 0.0, "lng": 0.5}
            ]}),
            json!({}),
        );
        let weights = ScoreWeights::default();
        let cross = Proximity::new(&split.catalog, &split.adjacency, &weights)
            .score(split.suburb("a"), split.suburb("b"));
        let same = Proximity::new(&joined.catalog, &joined.adjacency, &weights)
            .score(joined.suburb("a"), joined.suburb("b"));
        assert!(cross < same);

        let allow = ScoreWeights {
            cross_cluster_mode: CrossClusterMode::Allow,
            ..ScoreWeights::default()
        };
        let allowed = Proximity::new(&split.catalog, &split.adjacency, &allow)
            .explain(split.suburb("a"), split.suburb("b"));
        assert_eq!(allowed.cluster_term, 0.0);
    }

    #[test]
    fn missing_coordinates_contribute_zero_distance() {
        let f = Fixture::new(
            json!({"c": [{"slug": "a", "lat": 0.0, "lng": 0.0}, "b"]}),
            json!({}),
        );
        let weights = ScoreWeights::default();
        let row = Proximity::new(&f.catalog, &f.adjacency, &weights)
            .explain(f.suburb("a"), f.suburb("b"));
        assert_eq!(row.distance_km, None);
        assert_eq!(row.distance_term, 0.0);
        assert_eq!(row.total, weights.cluster_boost);
    }

    #[test]
    fn nearby_is_tiered() {
        let f = Fixture::new(
            json!({
                "east": [
                    {"slug": "home", "lat": 0.0, "lng": 0.0},
                    {"slug": "close", "lat": 0.0, "lng": 0.1},
                    {"slug": "far", "lat": 0.0, "lng": 3.0},
                    "unlocated"
                ],
                "west": [{"slug": "over-border", "lat": 0.0, "lng": -0.05}]
            }),
            json!({"home": ["far"]}),
        );
        let weights = ScoreWeights::default().with_limit(5);
        let scorer = Proximity::new(&f.catalog, &f.adjacency, &weights);
        let list = Fixture::slugs(scorer.nearby(f.suburb("home")));
        assert_eq!(list, vec!["far", "close", "unlocated", "over-border"]);

        let short = ScoreWeights::default().with_limit(2);
        let scorer = Proximity::new(&f.catalog, &f.adjacency, &short);
        assert_eq!(
            Fixture::slugs(scorer.nearby(f.suburb("home"))),
            vec!["far", "close"]
        );
    }

    #[test]
    fn drop_mode_and_coverage_filter_candidates() {
        let f = scenario();
        let drop = ScoreWeights {
            cross_cluster_mode: CrossClusterMode::Drop,
            ..scenario_weights()
        };
        let scorer = Proximity::new(&f.catalog, &f.adjacency, &drop);
        assert_eq!(Fixture::slugs(scorer.nearest(f.suburb("p"), 5)), vec!["q"]);

        let coverage = CoverageMap::from_value(&json!({"plumbing": ["r"]})).expect("coverage");
        let covered = ScoreWeights {
            only_covered: true,
            ..scenario_weights()
        };
        let scorer =
            Proximity::new(&f.catalog, &f.adjacency, &covered).for_service(&coverage, "plumbing");
        assert_eq!(Fixture::slugs(scorer.nearby(f.suburb("p"))), vec!["r"]);

        let scorer =
            Proximity::new(&f.catalog, &f.adjacency, &covered).for_service(&coverage, "painting");
        assert_eq!(
            Fixture::slugs(scorer.nearby(f.suburb("p"))),
            vec!["q", "r"]
        );
    }

    #[test]
    fn repair_drops_invalid_entries_and_pads_to_limit() {
        let f = Fixture::new(
            json!({"c": [
                {"slug": "p", "lat": 0.0, "lng": 0.0},
                {"slug": "q", "lat": 0.0, "lng": 0.1},
                {"slug": "r", "lat": 0.0, "lng": 0.2},
                {"slug": "s", "lat": 0.0, "lng": 0.3}
            ]}),
            json!({}),
        );
        let weights = ScoreWeights::default().with_limit(2);
        let scorer = Proximity::new(&f.catalog, &f.adjacency, &weights);
        let entry = |slug: &str| NearbyEntry {
            slug: slug.to_string(),
            name: slug.to_string(),
        };
        let previous = ProximitySnapshot::new(BTreeMap::from([
            (
                "p".to_string(),
                vec![entry("p"), entry("atlantis"), entry("s"), entry("s")],
            ),
            ("ghost".to_string(), vec![entry("p")]),
        ]));

        let (fixed, summary) = scorer.repair(&previous);
        assert_eq!(fixed.slugs_for("p"), vec!["s", "q"]);
        assert!(fixed.nearby.values().all(|list| list.len() <= 2));
        assert_eq!(summary.self_references, 1);
        assert_eq!(summary.unknown_targets, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.padded, 1);
        assert_eq!(summary.sources_dropped, vec!["ghost"]);
        assert_eq!(summary.sources_added, vec!["q", "r", "s"]);
        assert!(fixed.is_consistent());
        assert_eq!(fixed.nearby["p"][0].name, "S");
    }

    #[test]
    fn snapshot_is_reproducible() {
        let f = scenario();
        let weights = scenario_weights();
        let scorer = Proximity::new(&f.catalog, &f.adjacency, &weights);
        let a = scorer.snapshot();
        let b = scorer.snapshot();
        assert_eq!(a, b);
        assert_eq!(a.slugs_for("r"), vec!["q", "p"]);
    }
}
