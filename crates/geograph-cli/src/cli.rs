use clap::{Args, Parser, Subcommand, ValueEnum};
use geograph_kernel::CrossClusterMode;

#[derive(Parser)]
#[command(
    name = "geograph",
    about = "Geograph: suburb clusters, adjacency and nearby-suburb scoring",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Input documents shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Cluster document (array-of-clusters or record-of-arrays)
    #[arg(long, default_value = "data/clusters.json")]
    pub clusters: String,

    /// Adjacency document (record or `adjacent_suburbs` array)
    #[arg(long, default_value = "data/adjacency.json")]
    pub adjacency: String,

    /// Optional service coverage document (`service -> [suburb]`)
    #[arg(long)]
    pub coverage: Option<String>,

    /// Optional config file (`.toml` or JSON)
    #[arg(long)]
    pub config: Option<String>,

    /// Optional CSV of suburb coordinates used to backfill missing ones
    #[arg(long)]
    pub enrich_csv: Option<String>,

    /// Optional GeoJSON of suburb geometries used to backfill coordinates
    #[arg(long)]
    pub enrich_geojson: Option<String>,

    /// Downgrade referential errors to warnings
    #[arg(long, env = "GEOGRAPH_TOLERANT")]
    pub tolerant: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Allow,
    Penalize,
    Drop,
}

impl From<ModeArg> for CrossClusterMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Allow => Self::Allow,
            ModeArg::Penalize => Self::Penalize,
            ModeArg::Drop => Self::Drop,
        }
    }
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Validate every source document and write the integrity report
    Doctor {
        #[command(flatten)]
        sources: SourceArgs,

        /// Fail on warnings and require canonical slugs
        #[arg(long)]
        strict: bool,

        /// Explain the score breakdown for one suburb
        #[arg(long)]
        explain: Option<String>,

        /// Write a graph-edge export to this path
        #[arg(long)]
        graph: Option<String>,

        /// Previous proximity snapshot to diff and repair
        #[arg(long)]
        snapshot: Option<String>,

        /// Write the repaired ("fixed") snapshot
        #[arg(long)]
        write: bool,

        /// Destination of the fixed snapshot
        #[arg(long, default_value = ".geograph/nearby.fixed.json")]
        fixed_out: String,

        /// Suggest a split for this cluster
        #[arg(long)]
        suggest_split: Option<String>,

        /// Number of sub-clusters for --suggest-split
        #[arg(long, default_value_t = 2)]
        k: usize,

        /// Override nearby.limit (at least 1)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        limit: Option<usize>,

        /// Directory for doctor-report.json and doctor-report.txt
        #[arg(long, default_value = ".geograph/reports")]
        report_dir: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite cluster and adjacency documents in canonical form
    Normalize {
        #[command(flatten)]
        sources: SourceArgs,

        /// Reject slugs that are not already canonical
        #[arg(long)]
        strict: bool,

        /// Output directory for the normalized documents
        #[arg(long, default_value = ".geograph/normalized")]
        out_dir: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank nearby suburbs for one suburb, or build the full snapshot
    Nearby {
        /// Suburb slug or name; omit to compute the whole snapshot
        suburb: Option<String>,

        #[command(flatten)]
        sources: SourceArgs,

        /// Restrict recommendations to suburbs offering this service
        #[arg(long)]
        service: Option<String>,

        /// Override nearby.limit (at least 1)
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        limit: Option<usize>,

        /// Write the snapshot to this path
        #[arg(long)]
        out: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove adjacency edges disallowed by the cross-cluster policy
    EnforceCrossCluster {
        #[command(flatten)]
        sources: SourceArgs,

        /// Override nearby.crossClusterMode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Report what would be removed without rewriting the adjacency file
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Split one cluster into geographic sub-clusters (k-means)
    Split {
        /// Cluster slug or name
        cluster: String,

        #[command(flatten)]
        sources: SourceArgs,

        /// Number of sub-clusters
        #[arg(long, default_value_t = 2)]
        k: usize,

        /// Sub-cluster labels (repeatable); defaults to compass directions
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Rewrite the cluster document with the split applied
        #[arg(long)]
        write: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
