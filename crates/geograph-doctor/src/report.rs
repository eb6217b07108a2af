//! Doctor report model and its JSON/text renderings.

use crate::export::Explanation;
use geograph_kernel::{
    Category, EdgeStats, EnrichSummary, Finding, RepairSummary, Severity, SnapshotDiff,
    SplitOutcome,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;

pub const DOCTOR_REPORT_SCHEMA: u64 = 1;
pub const DOCTOR_REPORT_KIND: &str = "geograph.doctor.report.v1";

pub const RESULT_ACCEPTED: &str = "accepted";
pub const RESULT_REJECTED: &str = "rejected";

const HISTOGRAM_BUCKETS: [(usize, Option<usize>); 6] = [
    (0, Some(0)),
    (1, Some(5)),
    (6, Some(10)),
    (11, Some(20)),
    (21, Some(40)),
    (41, None),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Loaded,
    Missing,
    Invalid,
    Skipped,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Missing => "missing",
            Self::Invalid => "invalid",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub role: String,
    pub path: Option<String>,
    pub state: FileState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMode {
    pub strict: bool,
    pub tolerant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCounts {
    pub clusters: usize,
    pub suburbs: usize,
    pub located_suburbs: usize,
    pub adjacency_sources: usize,
    pub edges: usize,
    pub services: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBucket {
    pub label: String,
    pub clusters: usize,
}

/// Cluster sizes grouped into fixed ranges.
pub fn size_histogram(sizes: impl IntoIterator<Item = usize>) -> Vec<HistogramBucket> {
    let mut counts = [0usize; HISTOGRAM_BUCKETS.len()];
    for size in sizes {
        if let Some(slot) = HISTOGRAM_BUCKETS
            .iter()
            .position(|(min, max)| size >= *min && max.is_none_or(|max| size <= max))
        {
            counts[slot] += 1;
        }
    }
    HISTOGRAM_BUCKETS
        .iter()
        .zip(counts)
        .map(|((min, max), clusters)| HistogramBucket {
            label: match max {
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{min}-{max}"),
                None => format!("{min}+"),
            },
            clusters,
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIssues {
    pub missing: Vec<Finding>,
    pub schema: Vec<Finding>,
    pub referential: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ReportIssues {
    pub fn push(&mut self, finding: Finding) {
        match finding.category {
            Category::Missing => self.missing.push(finding),
            Category::Schema => self.schema.push(finding),
            Category::Referential => self.referential.push(finding),
            Category::Warning => self.warnings.push(finding),
        }
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.push(finding);
        }
    }

    /// Missing inputs, schema errors and referential errors.
    pub fn has_blocking(&self) -> bool {
        !self.missing.is_empty() || !self.schema.is_empty() || !self.referential.is_empty()
    }

    /// Warnings that fail a strict run. Topology findings never do.
    pub fn strict_warnings(&self) -> usize {
        self.warnings
            .iter()
            .filter(|f| f.severity >= Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.missing.len() + self.schema.len() + self.referential.len()
    }

    fn all(&self) -> impl Iterator<Item = &Finding> {
        self.missing
            .iter()
            .chain(&self.schema)
            .chain(&self.referential)
            .chain(&self.warnings)
    }

    /// Deterministic ordering so reruns render identically.
    pub fn sort(&mut self) {
        for list in [
            &mut self.missing,
            &mut self.schema,
            &mut self.referential,
            &mut self.warnings,
        ] {
            list.sort_by(|a, b| {
                a.class
                    .cmp(&b.class)
                    .then_with(|| a.subject.cmp(&b.subject))
                    .then_with(|| a.message.cmp(&b.message))
            });
            list.dedup();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub etag: String,
    pub sources: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReport {
    pub schema: u64,
    pub report_kind: String,
    pub generated_at: String,
    pub result: String,
    pub stage: String,
    pub mode: ReportMode,
    pub files: Vec<FileStatus>,
    pub counts: ReportCounts,
    pub cluster_sizes: Vec<HistogramBucket>,
    pub edge_stats: Option<EdgeStats>,
    pub failure_classes: Vec<String>,
    pub warning_classes: Vec<String>,
    pub issues: ReportIssues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrich: Option<EnrichSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_diff: Option<SnapshotDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<Explanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitOutcome>,
    /// Side outputs written by this run.
    pub outputs: Vec<String>,
}

impl DoctorReport {
    pub fn accepted(&self) -> bool {
        self.result == RESULT_ACCEPTED
    }

    /// Settle `result` and the class lists from the collected issues.
    pub fn finalize(&mut self) {
        self.issues.sort();
        let failing = self.issues.has_blocking()
            || (self.mode.strict && self.issues.strict_warnings() > 0);
        self.result = if failing {
            RESULT_REJECTED
        } else {
            RESULT_ACCEPTED
        }
        .to_string();

        let (failures, warnings): (Vec<&Finding>, Vec<&Finding>) = self
            .issues
            .all()
            .partition(|f| f.category != Category::Warning);
        self.failure_classes = classes(failures);
        self.warning_classes = classes(warnings);
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self).map(|mut text| {
            text.push('\n');
            text
        })
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "[doctor] {} (stage={}, clusters={}, suburbs={}, edges={}, errors={}, warnings={})",
            if self.accepted() { "OK" } else { "FAIL" },
            self.stage,
            self.counts.clusters,
            self.counts.suburbs,
            self.counts.edges,
            self.issues.error_count(),
            self.issues.warnings.len()
        );
        let _ = writeln!(
            out,
            "  mode: strict={} tolerant={}",
            self.mode.strict, self.mode.tolerant
        );
        for file in &self.files {
            let _ = writeln!(
                out,
                "  file {}: {} {}",
                file.role,
                file.state.as_str(),
                file.path.as_deref().unwrap_or("-")
            );
        }
        let histogram: Vec<String> = self
            .cluster_sizes
            .iter()
            .map(|b| format!("{}:{}", b.label, b.clusters))
            .collect();
        let _ = writeln!(out, "  cluster sizes: {}", histogram.join(" "));
        if let Some(stats) = &self.edge_stats {
            let _ = writeln!(
                out,
                "  edges: total={} reciprocal={} reciprocity={:.3} cross_cluster={} self_loops={} missing_nodes={}",
                stats.total_edges,
                stats.reciprocal_edges,
                stats.reciprocity_rate,
                stats.cross_cluster_edges,
                stats.self_loops,
                stats.missing_nodes
            );
        }
        if let Some(enrich) = &self.enrich {
            let _ = writeln!(
                out,
                "  enrich: rows={} applied={} unknown={} already_located={}",
                enrich.rows, enrich.applied, enrich.unknown, enrich.already_located
            );
        }
        if let Some(snapshot) = &self.snapshot {
            let _ = writeln!(
                out,
                "  snapshot: etag={} sources={}",
                snapshot.etag, snapshot.sources
            );
        }
        if let Some(diff) = &self.snapshot_diff {
            let _ = writeln!(
                out,
                "  snapshot diff: etag_matches={} added={} removed={} changed={}",
                diff.etag_matches,
                diff.added.len(),
                diff.removed.len(),
                diff.changed.len()
            );
        }
        if let Some(repair) = &self.repair {
            let _ = writeln!(
                out,
                "  repair: dropped={} added={} self={} duplicates={} unknown={} excluded={} truncated={} padded={}",
                repair.sources_dropped.len(),
                repair.sources_added.len(),
                repair.self_references,
                repair.duplicates,
                repair.unknown_targets,
                repair.excluded_targets,
                repair.truncated,
                repair.padded
            );
        }
        if let Some(explain) = &self.explain {
            let _ = writeln!(out, "  explain {} ({}):", explain.suburb, explain.cluster);
            for row in &explain.top {
                let _ = writeln!(
                    out,
                    "    {:>10.3} {} adj={:.1} cluster={:.1} dist={:.3}",
                    row.total, row.slug, row.adjacency_term, row.cluster_term, row.distance_term
                );
            }
        }
        if let Some(split) = &self.split {
            let _ = writeln!(
                out,
                "  split {}: rounds={} converged={}",
                split.base_slug, split.rounds, split.converged
            );
            for cluster in &split.clusters {
                let _ = writeln!(out, "    {} ({} suburbs)", cluster.slug, cluster.suburbs.len());
            }
            if !split.unplaced.is_empty() {
                let _ = writeln!(out, "    unplaced: {}", split.unplaced.join(", "));
            }
        }
        for output in &self.outputs {
            let _ = writeln!(out, "  wrote {output}");
        }
        for finding in self
            .issues
            .missing
            .iter()
            .chain(&self.issues.schema)
            .chain(&self.issues.referential)
        {
            let _ = writeln!(
                out,
                "  - {} {} ({})",
                finding.subject, finding.class, finding.message
            );
        }
        for finding in &self.issues.warnings {
            let label = if finding.severity == Severity::Info {
                "INFO"
            } else {
                "WARN"
            };
            let _ = writeln!(
                out,
                "  - {label} {} {} ({})",
                finding.subject, finding.class, finding.message
            );
        }
        out
    }
}

fn classes<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Vec<String> {
    findings
        .into_iter()
        .map(|finding| finding.class.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
