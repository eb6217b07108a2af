use crate::cli::SourceArgs;
use crate::support::{print_json_or_exit, write_json_or_exit};
use geograph_kernel::{GeoError, read_adjacency, read_clusters};
use serde_json::json;
use std::path::{Path, PathBuf};

const NORMALIZE_KIND: &str = "geograph.normalize.v1";
const CLUSTERS_FILE: &str = "clusters.json";
const ADJACENCY_FILE: &str = "adjacency.json";

fn fail(error: GeoError, json_output: bool) -> ! {
    if json_output
        && let GeoError::Schema(schema) = &error
    {
        print_json_or_exit(
            &json!({
                "schema": 1,
                "normalizeKind": NORMALIZE_KIND,
                "result": "rejected",
                "document": schema.document,
                "violations": schema.violations,
            }),
            "normalize",
        );
    } else if let GeoError::Schema(schema) = &error {
        println!(
            "[normalize] FAIL ({}: {} violation(s))",
            schema.document,
            schema.violations.len()
        );
        for finding in &schema.violations {
            println!(
                "  - {} {} ({})",
                finding.subject, finding.class, finding.message
            );
        }
    } else {
        eprintln!("error: {error}");
    }
    std::process::exit(1);
}

pub fn run(sources: SourceArgs, strict: bool, out_dir: String, json_output: bool) {
    let options = sources.load_options(strict);
    let paths = sources.to_paths();
    let clusters =
        read_clusters(&paths.clusters, options).unwrap_or_else(|e| fail(e, json_output));
    let adjacency =
        read_adjacency(&paths.adjacency, options).unwrap_or_else(|e| fail(e, json_output));

    let out_dir = PathBuf::from(out_dir);
    let clusters_out = out_dir.join(CLUSTERS_FILE);
    let adjacency_out = out_dir.join(ADJACENCY_FILE);
    write_json_or_exit(&clusters_out, &clusters);
    write_json_or_exit(&adjacency_out, &adjacency);

    let suburbs: usize = clusters.clusters.iter().map(|c| c.suburbs.len()).sum();
    let display = |path: &Path| path.display().to_string();
    if json_output {
        print_json_or_exit(
            &json!({
                "schema": 1,
                "normalizeKind": NORMALIZE_KIND,
                "result": "accepted",
                "clusters": clusters.clusters.len(),
                "suburbs": suburbs,
                "adjacencySources": adjacency.neighbors.len(),
                "outputs": [display(&clusters_out), display(&adjacency_out)],
            }),
            "normalize",
        );
    } else {
        println!(
            "[normalize] OK (clusters={}, suburbs={}, adjacencySources={})",
            clusters.clusters.len(),
            suburbs,
            adjacency.neighbors.len()
        );
        println!("  wrote {}", display(&clusters_out));
        println!("  wrote {}", display(&adjacency_out));
    }
}
