//! # Geograph Kernel
//!
//! The geographic catalog engine: suburbs grouped into clusters, a directed
//! adjacency graph between suburbs, service coverage, and the deterministic
//! "nearby suburbs" scoring derived from them.
//!
//! Every structure here is built once per run from flat files and is
//! immutable afterwards. Changes happen by producing a new normalized
//! document, persisting it, and reloading.
//!
//! ## Architecture
//!
//! ```text
//! slug                  ← canonical identifier alphabet
//!     │
//! schema                ← historical document shapes → one canonical shape
//!     │
//! catalog (ClusterIndex) ← suburb ↔ cluster lookup, single-claim invariant
//!     │
//! adjacency / coverage  ← directed neighbour graph, service availability
//!     │
//! GeoContext            ← everything above, loaded once per run
//!     │
//! proximity / split     ← nearby ranking, snapshot repair, k-means rebalancing
//! ```

pub mod adjacency;
pub mod catalog;
pub mod config;
pub mod context;
pub mod coverage;
pub mod enrich;
pub mod error;
pub mod geo;
pub mod proximity;
pub mod schema;
pub mod slug;
pub mod snapshot;
pub mod split;
pub mod store;

pub use adjacency::{AdjacencyGraph, AdjacencyValidation, EdgeStats, EnforceSummary};
pub use catalog::{Catalog, Cluster, ClusterIndex, Suburb};
pub use config::{
    ConfigError, CrossClusterMode, CrossClusterPolicy, DoctorConfig, GeoConfig, ScoreWeights,
    load_config,
};
pub use context::{
    GeoContext, LoadOptions, SourcePaths, read_adjacency, read_clusters, read_config,
    read_coverage, read_enrich_csv, read_enrich_geojson, read_enrichment,
};
pub use coverage::CoverageMap;
pub use enrich::{CoordinateRow, EnrichError, EnrichSummary};
pub use error::{Category, Finding, GeoError, ReferentialError, SchemaError, Severity};
pub use geo::{Coord, EARTH_RADIUS_KM, haversine_km};
pub use proximity::{Proximity, RepairSummary, ScoreBreakdown};
pub use schema::{
    AdjacencyDocument, ClusterDocument, ClusterRecord, SchemaOptions, SuburbRecord,
    normalize_adjacency, normalize_clusters,
};
pub use slug::{normalize, slug_candidate};
pub use snapshot::{ListChange, NearbyEntry, ProximitySnapshot, SnapshotDiff};
pub use split::{SplitError, SplitOutcome, split_cluster};
pub use store::{StoreError, read_json, read_text, write_json_pretty, write_text};
