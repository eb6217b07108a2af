use crate::cli::SourceArgs;
use crate::support::{load_context_or_exit, print_json_or_exit, write_json_or_exit};
use geograph_kernel::{Catalog, read_clusters, split_cluster};
use serde_json::json;
use std::path::PathBuf;

const SPLIT_KIND: &str = "geograph.split.v1";

pub struct Args {
    pub cluster: String,
    pub sources: SourceArgs,
    pub k: usize,
    pub labels: Vec<String>,
    pub write: bool,
    pub json: bool,
}

pub fn run(args: Args) {
    let ctx = load_context_or_exit(&args.sources);
    let cluster = ctx.cluster(&args.cluster).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });
    let labels = (!args.labels.is_empty()).then_some(args.labels.as_slice());
    let outcome = split_cluster(cluster, args.k, labels).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });

    let clusters_path = PathBuf::from(&args.sources.clusters);
    if args.write {
        // Sub-clusters are rebuilt from the authored records, not the enriched catalog.
        let authored = read_clusters(&clusters_path, args.sources.load_options(false))
            .unwrap_or_else(|e| {
                eprintln!("error: {e}");
                std::process::exit(1);
            });
        let next = outcome.apply(&authored).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            std::process::exit(1);
        });
        if let Err(e) = Catalog::from_document(&next) {
            eprintln!("error: split would produce an invalid catalog: {e}");
            std::process::exit(1);
        }
        write_json_or_exit(&clusters_path, &next);
    }

    if args.json {
        print_json_or_exit(
            &json!({
                "schema": 1,
                "splitKind": SPLIT_KIND,
                "written": args.write,
                "clustersPath": clusters_path.display().to_string(),
                "split": outcome,
            }),
            "split",
        );
    } else {
        println!(
            "[split] {} (k={}, rounds={}, converged={})",
            outcome.base_slug, args.k, outcome.rounds, outcome.converged
        );
        for (sub, centroid) in outcome.clusters.iter().zip(&outcome.centroids) {
            let members: Vec<&str> = sub.suburbs.iter().map(|s| s.slug.as_str()).collect();
            println!(
                "  - {} \"{}\" @({:.4},{:.4}): {}",
                sub.slug,
                sub.name,
                centroid.lat,
                centroid.lng,
                members.join(", ")
            );
        }
        if !outcome.unplaced.is_empty() {
            println!("  - unplaced (kept in {}): {}", outcome.base_slug, outcome.unplaced.join(", "));
        }
        if args.write {
            println!("  wrote {}", clusters_path.display());
        }
    }
}
