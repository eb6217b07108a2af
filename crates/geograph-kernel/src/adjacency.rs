//! Directed adjacency graph between suburbs.
//!
//! Adjacency is intended to be symmetric but is stored per source node;
//! reciprocity is measured, never enforced. Validation rules are evaluated
//! independently so one run reports every finding.

use crate::catalog::ClusterIndex;
use crate::config::{CrossClusterMode, CrossClusterPolicy};
use crate::error::Finding;
use crate::schema::AdjacencyDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const CLASS_MISSING_SOURCE: &str = "referential.adjacency.missing_source";
pub const CLASS_MISSING_TARGET: &str = "referential.adjacency.missing_target";
pub const CLASS_SELF_LOOP: &str = "schema.adjacency.self_loop";
pub const CLASS_CROSS_CLUSTER: &str = "topology.adjacency.cross_cluster_edge";
pub const CLASS_LOW_RECIPROCITY: &str = "topology.adjacency.low_reciprocity";
pub const CLASS_ISOLATED: &str = "topology.adjacency.isolated_suburb";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacencyGraph {
    neighbors: BTreeMap<String, Vec<String>>,
}

/// Edge statistics reported alongside validation findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStats {
    pub sources: usize,
    pub total_edges: usize,
    pub reciprocal_edges: usize,
    /// Reciprocal edges over non-self-loop directed edges; 1.0 when empty.
    pub reciprocity_rate: f64,
    pub cross_cluster_edges: usize,
    pub self_loops: usize,
    pub missing_nodes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AdjacencyValidation {
    pub findings: Vec<Finding>,
    pub stats: EdgeStats,
}

/// Outcome of a cross-cluster enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforceSummary {
    pub kept: usize,
    pub removed: usize,
    pub removed_edges: Vec<(String, String)>,
}

impl AdjacencyGraph {
    pub fn build(doc: &AdjacencyDocument) -> Self {
        Self {
            neighbors: doc.neighbors.clone(),
        }
    }

    pub fn neighbors(&self, slug: &str) -> &[String] {
        self.neighbors
            .get(slug)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.neighbors(from).iter().any(|n| n == to)
    }

    /// All directed edges in (source, target-list) order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.neighbors.iter().flat_map(|(from, targets)| {
            targets.iter().map(move |to| (from.as_str(), to.as_str()))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.neighbors.values().map(Vec::len).sum()
    }

    pub fn source_count(&self) -> usize {
        self.neighbors.len()
    }

    /// `(reciprocal, considered)` over edges that are not self-loops.
    pub fn reciprocity(&self) -> (usize, usize) {
        let mut reciprocal = 0;
        let mut considered = 0;
        for (from, to) in self.edges().filter(|(from, to)| from != to) {
            considered += 1;
            if self.has_edge(to, from) {
                reciprocal += 1;
            }
        }
        (reciprocal, considered)
    }

    pub fn to_document(&self) -> AdjacencyDocument {
        AdjacencyDocument {
            neighbors: self.neighbors.clone(),
        }
    }

    /// Validate against the cluster index.
    ///
    /// Missing nodes are referential findings (warnings when `tolerant`),
    /// self-loops are schema findings, and cross-cluster edges, isolated
    /// suburbs and low reciprocity are topology findings.
    pub fn validate(
        &self,
        index: &ClusterIndex,
        tolerant: bool,
        low_reciprocity_threshold: f64,
    ) -> AdjacencyValidation {
        let mut findings = Vec::new();
        let mut stats = EdgeStats {
            sources: self.source_count(),
            total_edges: self.edge_count(),
            ..EdgeStats::default()
        };

        for (from, targets) in &self.neighbors {
            let source_known = index.contains(from);
            if !source_known {
                stats.missing_nodes += 1;
                findings.push(
                    Finding::referential(
                        CLASS_MISSING_SOURCE,
                        from,
                        "adjacency source is not in any cluster",
                    )
                    .tolerate(tolerant),
                );
            }

            for to in targets {
                if from == to {
                    stats.self_loops += 1;
                    findings.push(Finding::schema(
                        CLASS_SELF_LOOP,
                        from,
                        "suburb lists itself as a neighbour",
                    ));
                    continue;
                }
                if !index.contains(to) {
                    stats.missing_nodes += 1;
                    findings.push(
                        Finding::referential(
                            CLASS_MISSING_TARGET,
                            format!("{from}->{to}"),
                            format!("neighbour `{to}` is not in any cluster"),
                        )
                        .tolerate(tolerant),
                    );
                    continue;
                }
                if source_known && !index.same_cluster(from, to) {
                    stats.cross_cluster_edges += 1;
                    findings.push(Finding::topology(
                        CLASS_CROSS_CLUSTER,
                        format!("{from}->{to}"),
                        format!(
                            "edge crosses clusters `{}` -> `{}`",
                            index.cluster_of(from).unwrap_or_default(),
                            index.cluster_of(to).unwrap_or_default()
                        ),
                    ));
                }
            }
        }

        for suburb in index.suburb_to_cluster().keys() {
            if self.neighbors(suburb).is_empty() {
                findings.push(Finding::topology(
                    CLASS_ISOLATED,
                    suburb,
                    "suburb has no outgoing adjacency",
                ));
            }
        }

        let (reciprocal, considered) = self.reciprocity();
        stats.reciprocal_edges = reciprocal;
        stats.reciprocity_rate = if considered == 0 {
            1.0
        } else {
            reciprocal as f64 / considered as f64
        };
        if considered > 0 && stats.reciprocity_rate < low_reciprocity_threshold {
            findings.push(Finding::topology(
                CLASS_LOW_RECIPROCITY,
                "adjacency",
                format!(
                    "reciprocity {:.3} below {:.3}",
                    stats.reciprocity_rate, low_reciprocity_threshold
                ),
            ));
        }

        AdjacencyValidation { findings, stats }
    }

    /// Produce a new graph with disallowed cross-cluster edges removed.
    ///
    /// Blacklisted pairs are always removed. Other cross-cluster edges are
    /// removed unless whitelisted, except under [`CrossClusterMode::Allow`].
    /// Edges touching unknown suburbs are left for validation to report.
    pub fn enforce_cross_cluster(
        &self,
        index: &ClusterIndex,
        mode: CrossClusterMode,
        policy: &CrossClusterPolicy,
    ) -> (Self, EnforceSummary) {
        let mut summary = EnforceSummary::default();
        let mut neighbors = BTreeMap::new();

        for (from, targets) in &self.neighbors {
            let mut kept = Vec::with_capacity(targets.len());
            for to in targets {
                let known = index.contains(from) && index.contains(to);
                let cross = known && !index.same_cluster(from, to);
                let disallowed = policy.is_blacklisted(from, to)
                    || (cross
                        && mode != CrossClusterMode::Allow
                        && !policy.is_whitelisted(from, to));
                if disallowed {
                    summary.removed_edges.push((from.clone(), to.clone()));
                } else {
                    kept.push(to.clone());
                }
            }
            summary.kept += kept.len();
            neighbors.insert(from.clone(), kept);
        }
        summary.removed = summary.removed_edges.len();

        info!(
            removed = summary.removed,
            kept = summary.kept,
            mode = mode.as_str(),
            "enforced cross-cluster adjacency policy"
        );
        (Self { neighbors }, summary)
    }
}
