use crate::cli::SourceArgs;
use geograph_kernel::{GeoContext, LoadOptions, Severity, SourcePaths, write_json_pretty};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

impl SourceArgs {
    pub fn to_paths(&self) -> SourcePaths {
        SourcePaths {
            clusters: PathBuf::from(&self.clusters),
            adjacency: PathBuf::from(&self.adjacency),
            coverage: self.coverage.as_ref().map(PathBuf::from),
            config: self.config.as_ref().map(PathBuf::from),
            enrich_csv: self.enrich_csv.as_ref().map(PathBuf::from),
            enrich_geojson: self.enrich_geojson.as_ref().map(PathBuf::from),
        }
    }

    pub fn load_options(&self, strict_slugs: bool) -> LoadOptions {
        LoadOptions {
            strict_slugs,
            tolerant: self.tolerant,
        }
    }
}

pub fn load_context_or_exit(sources: &SourceArgs) -> GeoContext {
    let ctx = GeoContext::load(&sources.to_paths(), sources.load_options(false))
        .unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(1);
        });
    for finding in &ctx.warnings {
        if finding.severity == Severity::Info {
            debug!(class = %finding.class, subject = %finding.subject, "{}", finding.message);
        } else {
            warn!(class = %finding.class, subject = %finding.subject, "{}", finding.message);
        }
    }
    ctx
}

pub fn print_json_or_exit(payload: &Value, what: &str) {
    let rendered = serde_json::to_string_pretty(payload).unwrap_or_else(|e| {
        eprintln!("error: failed to render {what} payload: {e}");
        std::process::exit(2);
    });
    println!("{rendered}");
}

pub fn write_json_or_exit<T: Serialize + ?Sized>(path: &Path, value: &T) {
    write_json_pretty(path, value).unwrap_or_else(|e| {
        eprintln!("error: failed to write {}: {e}", path.display());
        std::process::exit(1);
    });
}
