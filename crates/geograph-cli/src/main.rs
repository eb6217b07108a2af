//! Geograph CLI: the `geograph` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "GEOGRAPH_LOG";
const DEFAULT_LOG_FILTER: &str = "geograph_kernel=info,geograph_doctor=info,geograph=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Doctor {
            sources,
            strict,
            explain,
            graph,
            snapshot,
            write,
            fixed_out,
            suggest_split,
            k,
            limit,
            report_dir,
            json,
        } => commands::doctor::run(commands::doctor::Args {
            sources,
            strict,
            explain,
            graph,
            snapshot,
            write,
            fixed_out,
            suggest_split,
            k,
            limit,
            report_dir,
            json,
        }),

        Commands::Normalize {
            sources,
            strict,
            out_dir,
            json,
        } => commands::normalize::run(sources, strict, out_dir, json),

        Commands::Nearby {
            suburb,
            sources,
            service,
            limit,
            out,
            json,
        } => commands::nearby::run(commands::nearby::Args {
            suburb,
            sources,
            service,
            limit,
            out,
            json,
        }),

        Commands::EnforceCrossCluster {
            sources,
            mode,
            dry_run,
            json,
        } => commands::enforce_cross_cluster::run(sources, mode.map(Into::into), dry_run, json),

        Commands::Split {
            cluster,
            sources,
            k,
            labels,
            write,
            json,
        } => commands::split::run(commands::split::Args {
            cluster,
            sources,
            k,
            labels,
            write,
            json,
        }),
    }
}
