use crate::cli::SourceArgs;
use crate::support::{load_context_or_exit, print_json_or_exit, write_json_or_exit};
use geograph_kernel::CrossClusterMode;
use serde_json::json;
use std::path::PathBuf;

const ENFORCE_KIND: &str = "geograph.enforce_cross_cluster.v1";

pub fn run(sources: SourceArgs, mode: Option<CrossClusterMode>, dry_run: bool, json_output: bool) {
    let ctx = load_context_or_exit(&sources);
    let mode = mode.unwrap_or(ctx.config.nearby.cross_cluster_mode);
    let (graph, summary) =
        ctx.adjacency
            .enforce_cross_cluster(ctx.catalog.index(), mode, &ctx.config.cross_cluster);

    let adjacency_path = PathBuf::from(&sources.adjacency);
    let rewritten = !dry_run && summary.removed > 0;
    if rewritten {
        write_json_or_exit(&adjacency_path, &graph.to_document());
    }

    if json_output {
        print_json_or_exit(
            &json!({
                "schema": 1,
                "enforceKind": ENFORCE_KIND,
                "mode": mode.as_str(),
                "dryRun": dry_run,
                "rewritten": rewritten,
                "adjacencyPath": adjacency_path.display().to_string(),
                "kept": summary.kept,
                "removed": summary.removed,
                "removedEdges": summary
                    .removed_edges
                    .iter()
                    .map(|(from, to)| json!({"source": from, "target": to}))
                    .collect::<Vec<_>>(),
            }),
            "enforce-cross-cluster",
        );
    } else {
        println!(
            "[enforce-cross-cluster] {} (mode={}, kept={}, removed={})",
            if rewritten { "REWROTE" } else { "OK" },
            mode.as_str(),
            summary.kept,
            summary.removed
        );
        for (from, to) in &summary.removed_edges {
            println!("  - removed {from}->{to}");
        }
    }
}
