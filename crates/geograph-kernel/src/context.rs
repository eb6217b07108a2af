//! Source loading: read every input document once and assemble the
//! in-memory model used by the scorer, the splitter and the doctor.

use crate::adjacency::AdjacencyGraph;
use crate::catalog::{Catalog, Cluster, Suburb};
use crate::config::{GeoConfig, load_config};
use crate::coverage::CoverageMap;
use crate::enrich::{self, CoordinateRow, EnrichSummary};
use crate::error::{Category, Finding, GeoError, ReferentialError, SchemaError, Severity};
use crate::proximity::Proximity;
use crate::schema::{
    ADJACENCY_DOCUMENT, AdjacencyDocument, ClusterDocument, SchemaOptions, normalize_adjacency,
    normalize_clusters,
};
use crate::slug::normalize;
use crate::store::{read_json, read_text};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Locations of the input documents. Only clusters and adjacency are
/// required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePaths {
    pub clusters: PathBuf,
    pub adjacency: PathBuf,
    pub coverage: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub enrich_csv: Option<PathBuf>,
    pub enrich_geojson: Option<PathBuf>,
}

impl SourcePaths {
    pub fn new(clusters: impl Into<PathBuf>, adjacency: impl Into<PathBuf>) -> Self {
        Self {
            clusters: clusters.into(),
            adjacency: adjacency.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Reject slugs that are not already canonical.
    pub strict_slugs: bool,
    /// Downgrade referential findings to warnings.
    pub tolerant: bool,
}

impl LoadOptions {
    fn schema(&self) -> SchemaOptions {
        SchemaOptions {
            strict_slugs: self.strict_slugs,
        }
    }
}

pub fn read_clusters(path: &Path, options: LoadOptions) -> Result<ClusterDocument, GeoError> {
    let value = read_json(path)?;
    Ok(normalize_clusters(&value, options.schema())?)
}

pub fn read_adjacency(path: &Path, options: LoadOptions) -> Result<AdjacencyDocument, GeoError> {
    let value = read_json(path)?;
    Ok(normalize_adjacency(&value, options.schema())?)
}

/// Coverage is optional; no document means every service is open everywhere.
pub fn read_coverage(path: Option<&Path>) -> Result<CoverageMap, GeoError> {
    match path {
        Some(path) => Ok(CoverageMap::from_value(&read_json(path)?)?),
        None => Ok(CoverageMap::default()),
    }
}

pub fn read_config(path: Option<&Path>) -> Result<GeoConfig, GeoError> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(GeoConfig::default()),
    }
}

pub fn read_enrich_csv(path: &Path) -> Result<(Vec<CoordinateRow>, Vec<Finding>), GeoError> {
    let text = read_text(path)?;
    Ok(enrich::parse_csv(&text, &path.display().to_string())?)
}

pub fn read_enrich_geojson(path: &Path) -> Result<(Vec<CoordinateRow>, Vec<Finding>), GeoError> {
    let value = read_json(path)?;
    Ok(enrich::parse_geojson(&value, &path.display().to_string())?)
}

/// Parse every configured enrichment source. Returns `None` when no source
/// is configured.
pub fn read_enrichment(
    paths: &SourcePaths,
) -> Result<Option<(Vec<CoordinateRow>, Vec<Finding>)>, GeoError> {
    if paths.enrich_csv.is_none() && paths.enrich_geojson.is_none() {
        return Ok(None);
    }
    let mut rows = Vec::new();
    let mut findings = Vec::new();
    if let Some(path) = &paths.enrich_csv {
        let (parsed, issues) = read_enrich_csv(path)?;
        rows.extend(parsed);
        findings.extend(issues);
    }
    if let Some(path) = &paths.enrich_geojson {
        let (parsed, issues) = read_enrich_geojson(path)?;
        rows.extend(parsed);
        findings.extend(issues);
    }
    Ok(Some((rows, findings)))
}

/// Fail on blocking findings: schema errors first, then referential errors.
fn reject_blocking(findings: &[Finding]) -> Result<(), GeoError> {
    let blocking = |category: Category| -> Vec<Finding> {
        findings
            .iter()
            .filter(|f| f.category == category && f.severity == Severity::Error)
            .cloned()
            .collect()
    };
    let schema = blocking(Category::Schema);
    if !schema.is_empty() {
        return Err(SchemaError::new(ADJACENCY_DOCUMENT, schema).into());
    }
    let referential = blocking(Category::Referential);
    if !referential.is_empty() {
        return Err(ReferentialError {
            violations: referential,
        }
        .into());
    }
    Ok(())
}

/// The loaded, validated model.
#[derive(Debug, Clone, Default)]
pub struct GeoContext {
    pub catalog: Catalog,
    pub adjacency: AdjacencyGraph,
    pub coverage: CoverageMap,
    pub config: GeoConfig,
    /// Non-blocking findings gathered while loading.
    pub warnings: Vec<Finding>,
    pub enrich: Option<EnrichSummary>,
}

impl GeoContext {
    pub fn new(
        catalog: Catalog,
        adjacency: AdjacencyGraph,
        coverage: CoverageMap,
        config: GeoConfig,
    ) -> Self {
        Self {
            catalog,
            adjacency,
            coverage,
            config,
            warnings: Vec::new(),
            enrich: None,
        }
    }

    /// Load and validate every source, failing fast on the first blocking
    /// problem. Warnings (and referential findings in tolerant mode) are kept
    /// on the context.
    pub fn load(paths: &SourcePaths, options: LoadOptions) -> Result<Self, GeoError> {
        let config = read_config(paths.config.as_deref())?;
        let clusters = read_clusters(&paths.clusters, options)?;
        let adjacency_doc = read_adjacency(&paths.adjacency, options)?;
        let coverage = read_coverage(paths.coverage.as_deref())?;
        debug!(
            clusters = clusters.clusters.len(),
            sources = adjacency_doc.neighbors.len(),
            "documents normalized"
        );

        // A suburb claimed by two clusters stays blocking in tolerant mode.
        let (mut catalog, mut findings) = Catalog::from_document_with_conflicts(&clusters);

        let mut enrich_summary = None;
        if let Some((rows, issues)) = read_enrichment(paths)? {
            let (enriched, summary, backfill_findings) = enrich::backfill(&catalog, &rows);
            info!(applied = summary.applied, rows = summary.rows, "coordinates backfilled");
            catalog = enriched;
            findings.extend(issues);
            findings.extend(backfill_findings);
            enrich_summary = Some(summary);
        }

        let adjacency = AdjacencyGraph::build(&adjacency_doc);
        let validation = adjacency.validate(
            catalog.index(),
            options.tolerant,
            config.doctor.low_reciprocity_threshold,
        );
        findings.extend(validation.findings);
        findings.extend(coverage.validate(catalog.index(), options.tolerant));

        reject_blocking(&findings)?;
        info!(
            suburbs = catalog.len(),
            edges = adjacency.edge_count(),
            warnings = findings.len(),
            "sources loaded"
        );

        Ok(Self {
            catalog,
            adjacency,
            coverage,
            config,
            warnings: findings,
            enrich: enrich_summary,
        })
    }

    pub fn proximity(&self) -> Proximity<'_> {
        Proximity::new(&self.catalog, &self.adjacency, &self.config.nearby)
    }

    /// A scorer filtered by `service` coverage, when one is given.
    pub fn proximity_for<'a>(&'a self, service: Option<&'a str>) -> Proximity<'a> {
        match service {
            Some(service) => self.proximity().for_service(&self.coverage, service),
            None => self.proximity(),
        }
    }

    /// Look up a suburb by raw or canonical slug.
    pub fn suburb(&self, raw: &str) -> Result<&Suburb, GeoError> {
        let slug = normalize(raw);
        self.catalog
            .suburb(&slug)
            .ok_or(GeoError::UnknownSuburb(slug))
    }

    pub fn cluster(&self, raw: &str) -> Result<&Cluster, GeoError> {
        let slug = normalize(raw);
        self.catalog
            .cluster(&slug)
            .ok_or(GeoError::UnknownCluster(slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct TempDirGuard(PathBuf);

    impl TempDirGuard {
        fn new(prefix: &str) -> Self {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos();
            let path = std::env::temp_dir().join(format!(
                "{prefix}-{}-{nanos}",
                std::process::id()
            ));
            fs::create_dir_all(&path).expect("temp dir");
            Self(path)
        }

        fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.0.join(name);
            fs::write(&path, contents).expect("write fixture");
            path
        }
    }

    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn fixture(tmp: &TempDirGuard, adjacency: &str) -> SourcePaths {
        let clusters = tmp.write(
            "clusters.json",
            r#"{"north": [{"slug": "a", "lat": 0.0, "lng": 0.0}, "b"], "south": ["c"]}"#,
        );
        let adjacency = tmp.write("adjacency.json", adjacency);
        SourcePaths::new(clusters, adjacency)
    }

    #[test]
    fn load_builds_a_scoring_context() {
        let tmp = TempDirGuard::new("geograph-context-load");
        let mut paths = fixture(&tmp, r#"{"a": ["b"], "b": ["a"]}"#);
        paths.enrich_csv = Some(tmp.write("coords.csv", "slug,name,lat,lng\nb,B,0.0,0.01\n"));

        let ctx = GeoContext::load(&paths, LoadOptions::default()).expect("load");
        assert_eq!(ctx.catalog.len(), 3);
        assert!(ctx.suburb("B").expect("b").coord().is_some());
        assert_eq!(ctx.enrich.as_ref().map(|s| s.applied), Some(1));

        let a = ctx.suburb("a").expect("a");
        let nearby: Vec<&str> = ctx
            .proximity()
            .nearby(a)
            .iter()
            .map(|s| s.slug.as_str())
            .collect();
        assert_eq!(nearby, vec!["b", "c"]);
        assert!(matches!(ctx.cluster("west"), Err(GeoError::UnknownCluster(_))));
    }

    #[test]
    fn unknown_adjacency_target_is_fatal_unless_tolerant() {
        let tmp = TempDirGuard::new("geograph-context-tolerant");
        let paths = fixture(&tmp, r#"{"a": ["atlantis"]}"#);

        let err = GeoContext::load(&paths, LoadOptions::default()).expect_err("strict load");
        assert!(matches!(err, GeoError::Referential(_)));

        let ctx = GeoContext::load(
            &paths,
            LoadOptions {
                tolerant: true,
                ..LoadOptions::default()
            },
        )
        .expect("tolerant load");
        assert!(ctx.warnings.iter().any(|f| f.subject.contains("atlantis")));
    }

    #[test]
    fn double_cluster_claim_is_fatal_even_when_tolerant() {
        let tmp = TempDirGuard::new("geograph-context-double-claim");
        let clusters = tmp.write("clusters.json", r#"{"a": ["x"], "b": ["x", "y"]}"#);
        let adjacency = tmp.write("adjacency.json", "{}");
        let paths = SourcePaths::new(clusters, adjacency);

        let err = GeoContext::load(
            &paths,
            LoadOptions {
                tolerant: true,
                ..LoadOptions::default()
            },
        )
        .expect_err("tolerant load");
        assert!(matches!(err, GeoError::Referential(_)));
    }

    #[test]
    fn missing_document_is_a_store_error() {
        let tmp = TempDirGuard::new("geograph-context-missing");
        let paths = SourcePaths::new(tmp.0.join("nope.json"), tmp.0.join("nope2.json"));
        let err = GeoContext::load(&paths, LoadOptions::default()).expect_err("missing");
        assert!(matches!(err, GeoError::Store(_)));
    }
}
