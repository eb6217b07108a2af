//! Side outputs: graph-edge export and per-suburb score explanations.

use geograph_kernel::{AdjacencyGraph, Catalog, Proximity, ScoreBreakdown, Suburb};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub cluster: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub reciprocal: bool,
    pub cross_cluster: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Nodes for every catalog suburb and edges for every adjacency entry whose
/// endpoints are both known.
pub fn graph_export(catalog: &Catalog, adjacency: &AdjacencyGraph) -> GraphExport {
    let nodes = catalog
        .suburbs()
        .map(|s| GraphNode {
            id: s.slug.clone(),
            label: s.name.clone(),
            cluster: s.cluster_slug.clone(),
            lat: s.lat,
            lng: s.lng,
        })
        .collect();

    let index = catalog.index();
    let edges = adjacency
        .edges()
        .filter(|(from, to)| from != to && index.contains(from) && index.contains(to))
        .map(|(from, to)| GraphEdge {
            source: from.to_string(),
            target: to.to_string(),
            reciprocal: adjacency.has_edge(to, from),
            cross_cluster: !index.same_cluster(from, to),
        })
        .collect();

    GraphExport { nodes, edges }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub suburb: String,
    pub cluster: String,
    /// The tiered recommendation actually published for this suburb.
    pub nearby: Vec<String>,
    /// Best-scoring candidates with their per-term breakdown.
    pub top: Vec<ScoreBreakdown>,
}

pub fn explain(proximity: &Proximity<'_>, suburb: &Suburb, top_n: usize) -> Explanation {
    let mut top = proximity.ranked(suburb);
    top.truncate(top_n);
    Explanation {
        suburb: suburb.slug.clone(),
        cluster: suburb.cluster_slug.clone(),
        nearby: proximity
            .nearby(suburb)
            .iter()
            .map(|s| s.slug.clone())
            .collect(),
        top,
    }
}
