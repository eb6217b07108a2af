//! The doctor pipeline: `Load → Validate → Index → Score → Report`.
//!
//! Every stage collects findings instead of failing fast; the pass/fail
//! decision is made once, when the report is finalized. The report is
//! written to disk on every run, accepted or not.

use crate::export::{explain, graph_export};
use crate::report::{
    DOCTOR_REPORT_KIND, DOCTOR_REPORT_SCHEMA, DoctorReport, FileState, FileStatus, ReportCounts,
    ReportIssues, ReportMode, SnapshotSummary, size_histogram,
};
use chrono::{SecondsFormat, Utc};
use geograph_kernel::{
    AdjacencyDocument, AdjacencyGraph, Catalog, Category, ClusterDocument, CoordinateRow,
    CoverageMap, Finding, GeoConfig, GeoError, LoadOptions, Proximity, ProximitySnapshot, Severity,
    SnapshotDiff, SourcePaths, StoreError, enrich, normalize, read_adjacency, read_clusters,
    read_config, read_coverage, read_enrich_csv, read_enrich_geojson, read_json, split_cluster,
    write_json_pretty, write_text,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_REPORT_DIR: &str = ".geograph/reports";
pub const REPORT_JSON_FILE: &str = "doctor-report.json";
pub const REPORT_TEXT_FILE: &str = "doctor-report.txt";
pub const DEFAULT_SPLIT_K: usize = 2;

pub const CLASS_FILE_MISSING: &str = "missing.file";
pub const CLASS_FILE_UNREADABLE: &str = "schema.file.unreadable";
pub const CLASS_CONFIG_INVALID: &str = "schema.config.invalid";
pub const CLASS_ENRICH_UNUSABLE: &str = "schema.enrich.unusable";
pub const CLASS_OUTPUT_WRITE: &str = "missing.output.write_failed";
pub const CLASS_CLUSTER_OVERSIZED: &str = "topology.cluster.oversized";
pub const CLASS_CLUSTER_EMPTY: &str = "topology.cluster.empty";
pub const CLASS_SUBURB_UNLOCATED: &str = "topology.suburb.no_coordinates";
pub const CLASS_EXPLAIN_UNKNOWN: &str = "doctor.explain.unknown_suburb";
pub const CLASS_SPLIT_UNAVAILABLE: &str = "doctor.split.unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Load,
    Validate,
    Index,
    Score,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Index => "index",
            Self::Score => "score",
            Self::Report => "report",
        }
    }
}

/// Everything a doctor run needs. Side outputs are off unless set.
#[derive(Debug, Clone)]
pub struct DoctorOptions {
    pub sources: SourcePaths,
    /// Warnings fail the run; slugs must already be canonical.
    pub strict: bool,
    /// Referential errors are downgraded to warnings.
    pub tolerant: bool,
    pub previous_snapshot: Option<PathBuf>,
    pub explain: Option<String>,
    pub graph_out: Option<PathBuf>,
    /// Where to write the repaired snapshot, when requested.
    pub fixed_out: Option<PathBuf>,
    pub suggest_split: Option<String>,
    pub split_k: usize,
    pub limit: Option<usize>,
    pub report_dir: PathBuf,
}

impl DoctorOptions {
    pub fn new(sources: SourcePaths) -> Self {
        Self {
            sources,
            strict: false,
            tolerant: false,
            previous_snapshot: None,
            explain: None,
            graph_out: None,
            fixed_out: None,
            suggest_split: None,
            split_k: DEFAULT_SPLIT_K,
            limit: None,
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
        }
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            strict_slugs: self.strict,
            tolerant: self.tolerant,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("failed to render doctor report: {0}")]
    Render(#[from] serde_json::Error),

    #[error("failed to write doctor report: {0}")]
    Write(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct DoctorRun {
    pub report: DoctorReport,
    pub stage: Stage,
    pub report_json: PathBuf,
    pub report_text: PathBuf,
}

impl DoctorRun {
    pub fn accepted(&self) -> bool {
        self.report.accepted()
    }
}

/// Translate a load failure into report findings.
fn load_failure(role: &str, error: GeoError) -> (FileState, Vec<Finding>) {
    match error {
        GeoError::Store(StoreError::Missing(path)) => (
            FileState::Missing,
            vec![Finding::new(
                Category::Missing,
                Severity::Error,
                CLASS_FILE_MISSING,
                role,
                format!("{path} not found"),
            )],
        ),
        GeoError::Schema(error) => (FileState::Invalid, error.violations),
        GeoError::Config(error) => (
            FileState::Invalid,
            vec![Finding::schema(CLASS_CONFIG_INVALID, role, error.to_string())],
        ),
        GeoError::Enrich(error) => (
            FileState::Invalid,
            vec![Finding::schema(CLASS_ENRICH_UNUSABLE, role, error.to_string())],
        ),
        other => (
            FileState::Invalid,
            vec![Finding::schema(CLASS_FILE_UNREADABLE, role, other.to_string())],
        ),
    }
}

struct Loader<'a> {
    files: Vec<FileStatus>,
    issues: &'a mut ReportIssues,
}

impl Loader<'_> {
    fn load<T>(
        &mut self,
        role: &str,
        path: Option<&Path>,
        read: impl FnOnce(&Path) -> Result<T, GeoError>,
    ) -> Option<T> {
        let Some(path) = path else {
            self.files.push(FileStatus {
                role: role.to_string(),
                path: None,
                state: FileState::Skipped,
            });
            return None;
        };
        let (state, value) = match read(path) {
            Ok(value) => (FileState::Loaded, Some(value)),
            Err(error) => {
                let (state, findings) = load_failure(role, error);
                warn!(role, path = %path.display(), state = state.as_str(), "input rejected");
                self.issues.extend(findings);
                (state, None)
            }
        };
        self.files.push(FileStatus {
            role: role.to_string(),
            path: Some(path.display().to_string()),
            state,
        });
        value
    }
}

type EnrichReader = fn(&Path) -> Result<(Vec<CoordinateRow>, Vec<Finding>), GeoError>;

fn read_snapshot(path: &Path) -> Result<ProximitySnapshot, GeoError> {
    Ok(ProximitySnapshot::from_value(&read_json(path)?)?)
}

fn topology_findings(catalog: &Catalog, config: &GeoConfig) -> Vec<Finding> {
    let threshold = config.doctor.oversized_cluster_threshold;
    let mut findings = Vec::new();
    for cluster in catalog.clusters() {
        if cluster.suburbs.is_empty() {
            findings.push(Finding::topology(
                CLASS_CLUSTER_EMPTY,
                &cluster.slug,
                "cluster has no suburbs",
            ));
        } else if cluster.suburbs.len() > threshold {
            findings.push(Finding::topology(
                CLASS_CLUSTER_OVERSIZED,
                &cluster.slug,
                format!(
                    "cluster has {} suburbs (threshold {threshold})",
                    cluster.suburbs.len()
                ),
            ));
        }
    }
    for suburb in catalog.suburbs().filter(|s| s.coord().is_none()) {
        findings.push(Finding::topology(
            CLASS_SUBURB_UNLOCATED,
            &suburb.slug,
            "suburb has no coordinates; distance terms fall back to 0",
        ));
    }
    findings
}

fn write_output<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
    outputs: &mut Vec<String>,
    issues: &mut ReportIssues,
) {
    match write_json_pretty(path, value) {
        Ok(()) => outputs.push(path.display().to_string()),
        Err(error) => issues.push(Finding::new(
            Category::Missing,
            Severity::Error,
            CLASS_OUTPUT_WRITE,
            path.display().to_string(),
            error.to_string(),
        )),
    }
}

/// Run every stage and write the report under `options.report_dir`.
pub fn run_doctor(options: &DoctorOptions) -> Result<DoctorRun, DoctorError> {
    let load_options = options.load_options();
    let sources = &options.sources;
    let mut issues = ReportIssues::default();

    // Load
    info!(stage = Stage::Load.as_str(), "doctor stage");
    let mut loader = Loader {
        files: Vec::new(),
        issues: &mut issues,
    };
    let config = loader
        .load("config", sources.config.as_deref(), |p| read_config(Some(p)))
        .unwrap_or_default();
    let clusters: Option<ClusterDocument> =
        loader.load("clusters", Some(&sources.clusters), |p| {
            read_clusters(p, load_options)
        });
    let adjacency_doc: Option<AdjacencyDocument> =
        loader.load("adjacency", Some(&sources.adjacency), |p| {
            read_adjacency(p, load_options)
        });
    let coverage: CoverageMap = loader
        .load("coverage", sources.coverage.as_deref(), |p| {
            read_coverage(Some(p))
        })
        .unwrap_or_default();
    let mut enrich_rows: Vec<CoordinateRow> = Vec::new();
    let mut enrich_requested = false;
    for (role, path, read) in [
        (
            "enrich_csv",
            sources.enrich_csv.as_deref(),
            read_enrich_csv as EnrichReader,
        ),
        (
            "enrich_geojson",
            sources.enrich_geojson.as_deref(),
            read_enrich_geojson as EnrichReader,
        ),
    ] {
        enrich_requested |= path.is_some();
        if let Some((rows, findings)) = loader.load(role, path, read) {
            enrich_rows.extend(rows);
            loader.issues.extend(findings);
        }
    }
    let previous = loader.load("snapshot", options.previous_snapshot.as_deref(), read_snapshot);
    let files = loader.files;

    let mode = ReportMode {
        strict: options.strict,
        tolerant: options.tolerant,
    };
    let mut report = DoctorReport {
        schema: DOCTOR_REPORT_SCHEMA,
        report_kind: DOCTOR_REPORT_KIND.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        result: String::new(),
        stage: Stage::Load.as_str().to_string(),
        mode,
        files,
        counts: ReportCounts {
            services: coverage.len(),
            ..ReportCounts::default()
        },
        cluster_sizes: size_histogram(std::iter::empty()),
        edge_stats: None,
        failure_classes: Vec::new(),
        warning_classes: Vec::new(),
        issues: ReportIssues::default(),
        enrich: None,
        snapshot: None,
        snapshot_diff: None,
        repair: None,
        explain: None,
        split: None,
        outputs: Vec::new(),
    };

    let mut stage = Stage::Load;
    if let (Some(clusters), Some(adjacency_doc)) = (clusters, adjacency_doc) {
        // Validate
        stage = Stage::Validate;
        info!(stage = stage.as_str(), "doctor stage");
        let (mut catalog, conflicts) = Catalog::from_document_with_conflicts(&clusters);
        // Double cluster claims are never downgraded.
        issues.extend(conflicts);
        if enrich_requested {
            let (enriched, summary, findings) = enrich::backfill(&catalog, &enrich_rows);
            catalog = enriched;
            issues.extend(findings);
            report.enrich = Some(summary);
        }
        let adjacency = AdjacencyGraph::build(&adjacency_doc);
        let validation = adjacency.validate(
            catalog.index(),
            options.tolerant,
            config.doctor.low_reciprocity_threshold,
        );
        issues.extend(validation.findings);
        issues.extend(coverage.validate(catalog.index(), options.tolerant));
        issues.extend(topology_findings(&catalog, &config));

        // Index
        stage = Stage::Index;
        info!(stage = stage.as_str(), suburbs = catalog.len(), "doctor stage");
        report.counts = ReportCounts {
            clusters: catalog.clusters().len(),
            suburbs: catalog.len(),
            located_suburbs: catalog.suburbs().filter(|s| s.coord().is_some()).count(),
            adjacency_sources: validation.stats.sources,
            edges: validation.stats.total_edges,
            services: coverage.len(),
        };
        report.cluster_sizes = size_histogram(catalog.clusters().iter().map(|c| c.suburbs.len()));
        report.edge_stats = Some(validation.stats);

        if !issues.has_blocking() {
            // Score
            stage = Stage::Score;
            info!(stage = stage.as_str(), "doctor stage");
            let mut weights = config.nearby.clone();
            if let Some(limit) = options.limit {
                weights = weights.with_limit(limit);
            }
            let proximity = Proximity::new(&catalog, &adjacency, &weights);
            let snapshot = proximity.snapshot();
            report.snapshot = Some(SnapshotSummary {
                etag: snapshot.etag.clone(),
                sources: snapshot.nearby.len(),
            });

            let fixed = match &previous {
                Some(previous) => {
                    report.snapshot_diff = Some(SnapshotDiff::compute(previous, &snapshot));
                    let (fixed, summary) = proximity.repair(previous);
                    report.repair = Some(summary);
                    fixed
                }
                None => snapshot,
            };
            if let Some(path) = &options.fixed_out {
                write_output(path, &fixed, &mut report.outputs, &mut issues);
            }

            if let Some(raw) = &options.explain {
                match catalog.suburb(&normalize(raw)) {
                    Some(suburb) => {
                        report.explain =
                            Some(explain(&proximity, suburb, config.doctor.explain_top));
                    }
                    None => issues.push(Finding::warning(
                        CLASS_EXPLAIN_UNKNOWN,
                        raw,
                        "cannot explain a suburb that is not in the catalog",
                    )),
                }
            }

            if let Some(path) = &options.graph_out {
                let export = graph_export(&catalog, &adjacency);
                write_output(path, &export, &mut report.outputs, &mut issues);
            }

            if let Some(raw) = &options.suggest_split {
                let outcome = catalog
                    .cluster(&normalize(raw))
                    .ok_or_else(|| GeoError::UnknownCluster(normalize(raw)))
                    .and_then(|cluster| {
                        split_cluster(cluster, options.split_k, None).map_err(GeoError::from)
                    });
                match outcome {
                    Ok(outcome) => report.split = Some(outcome),
                    Err(error) => issues.push(Finding::warning(
                        CLASS_SPLIT_UNAVAILABLE,
                        raw,
                        error.to_string(),
                    )),
                }
            }
        }
    }

    // Report
    info!(stage = Stage::Report.as_str(), "doctor stage");
    report.stage = stage.as_str().to_string();
    report.issues = issues;
    report.finalize();

    let report_json = options.report_dir.join(REPORT_JSON_FILE);
    let report_text = options.report_dir.join(REPORT_TEXT_FILE);
    write_text(&report_json, &report.to_json_string()?)?;
    write_text(&report_text, &report.render_text())?;
    info!(
        result = %report.result,
        errors = report.issues.error_count(),
        warnings = report.issues.warnings.len(),
        "doctor finished"
    );

    Ok(DoctorRun {
        report,
        stage,
        report_json,
        report_text,
    })
}
