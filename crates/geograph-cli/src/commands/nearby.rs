use crate::cli::SourceArgs;
use crate::support::{load_context_or_exit, print_json_or_exit, write_json_or_exit};
use geograph_kernel::ScoreBreakdown;
use serde_json::json;
use std::path::PathBuf;

const NEARBY_KIND: &str = "geograph.nearby.v1";

pub struct Args {
    pub suburb: Option<String>,
    pub sources: SourceArgs,
    pub service: Option<String>,
    pub limit: Option<usize>,
    pub out: Option<String>,
    pub json: bool,
}

pub fn run(args: Args) {
    let mut ctx = load_context_or_exit(&args.sources);
    if let Some(limit) = args.limit {
        ctx.config.nearby = ctx.config.nearby.clone().with_limit(limit);
    }
    let service = args.service.as_deref().map(geograph_kernel::normalize);
    let proximity = ctx.proximity_for(service.as_deref());

    let Some(raw) = args.suburb else {
        let snapshot = proximity.snapshot();
        if let Some(out) = &args.out {
            write_json_or_exit(&PathBuf::from(out), &snapshot);
        }
        if args.json {
            print_json_or_exit(
                &json!({
                    "schema": 1,
                    "nearbyKind": NEARBY_KIND,
                    "service": service,
                    "etag": snapshot.etag,
                    "nearby": snapshot.nearby,
                }),
                "nearby",
            );
        } else {
            println!(
                "[nearby] snapshot (etag={}, sources={})",
                snapshot.etag,
                snapshot.nearby.len()
            );
            if let Some(out) = &args.out {
                println!("  wrote {out}");
            }
        }
        return;
    };

    let suburb = ctx.suburb(&raw).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });
    let rows: Vec<ScoreBreakdown> = proximity
        .nearby(suburb)
        .into_iter()
        .map(|b| proximity.explain(suburb, b))
        .collect();

    if args.json {
        print_json_or_exit(
            &json!({
                "schema": 1,
                "nearbyKind": NEARBY_KIND,
                "suburb": suburb.slug,
                "cluster": suburb.cluster_slug,
                "service": service,
                "limit": proximity.weights().limit,
                "nearby": rows,
            }),
            "nearby",
        );
    } else {
        println!(
            "[nearby] {} ({}, limit={})",
            suburb.slug,
            suburb.cluster_slug,
            proximity.weights().limit
        );
        for (rank, row) in rows.iter().enumerate() {
            let km = row
                .distance_km
                .map_or_else(|| "-".to_string(), |km| format!("{km:.2}km"));
            println!(
                "  {}. {} ({}) score={:.3} {km}",
                rank + 1,
                row.slug,
                row.cluster,
                row.total
            );
        }
    }
}
