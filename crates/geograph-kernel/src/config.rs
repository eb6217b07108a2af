//! Run configuration: scoring weights, cross-cluster policy, doctor knobs.
//!
//! Loaded once per run from JSON or TOML (chosen by file extension) and
//! immutable afterwards. Every field has a default so partial documents
//! are valid.

use crate::slug::normalize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_LIMIT: usize = 6;
pub const DEFAULT_ADJACENCY_BOOST: f64 = 24.0;
pub const DEFAULT_CLUSTER_BOOST: f64 = 200.0;
pub const DEFAULT_BIAS_KM: f64 = 1.0;
pub const DEFAULT_CROSS_CLUSTER_PENALTY: f64 = 200.0;
pub const DEFAULT_OVERSIZED_CLUSTER_THRESHOLD: usize = 40;
pub const DEFAULT_EXPLAIN_TOP: usize = 10;
pub const DEFAULT_LOW_RECIPROCITY: f64 = 0.5;

/// How cross-cluster pairs are treated, in scoring and in enforcement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossClusterMode {
    /// No penalty; enforcement removes only blacklisted edges.
    Allow,
    /// Cross-cluster pairs score `-|crossClusterPenalty|`; enforcement keeps
    /// only same-cluster or whitelisted edges.
    #[default]
    Penalize,
    /// As `Penalize`, and cross-cluster suburbs are never recommended.
    Drop,
}

impl CrossClusterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Penalize => "penalize",
            Self::Drop => "drop",
        }
    }
}

/// Weights for the proximity score. Immutable per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreWeights {
    pub limit: usize,
    pub adjacency_boost: f64,
    pub cluster_boost: f64,
    pub bias_km: f64,
    /// Multiplier on the per-kilometre penalty.
    pub distance_weight: f64,
    /// Recommend only suburbs offering the selected service.
    pub only_covered: bool,
    pub cross_cluster_mode: CrossClusterMode,
    pub cross_cluster_penalty: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            adjacency_boost: DEFAULT_ADJACENCY_BOOST,
            cluster_boost: DEFAULT_CLUSTER_BOOST,
            bias_km: DEFAULT_BIAS_KM,
            distance_weight: 1.0,
            only_covered: false,
            cross_cluster_mode: CrossClusterMode::Penalize,
            cross_cluster_penalty: DEFAULT_CROSS_CLUSTER_PENALTY,
        }
    }
}

impl ScoreWeights {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Penalty applied per kilometre of great-circle distance.
    pub fn per_km_penalty(&self) -> f64 {
        self.bias_km.abs() * self.distance_weight
    }
}

/// Explicit cross-cluster edge lists. Pairs are unordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrossClusterPolicy {
    pub whitelist_edges: Vec<(String, String)>,
    pub blacklist_edges: Vec<(String, String)>,
}

fn pair_matches(pairs: &[(String, String)], a: &str, b: &str) -> bool {
    pairs.iter().any(|(x, y)| {
        let (x, y) = (normalize(x), normalize(y));
        (x == a && y == b) || (x == b && y == a)
    })
}

impl CrossClusterPolicy {
    pub fn is_whitelisted(&self, a: &str, b: &str) -> bool {
        pair_matches(&self.whitelist_edges, a, b)
    }

    pub fn is_blacklisted(&self, a: &str, b: &str) -> bool {
        pair_matches(&self.blacklist_edges, a, b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoctorConfig {
    /// Clusters with more suburbs than this are reported as oversized.
    pub oversized_cluster_threshold: usize,
    /// Candidates listed per suburb in score explanations.
    pub explain_top: usize,
    /// Reciprocity below this rate is reported as a topology warning.
    pub low_reciprocity_threshold: f64,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            oversized_cluster_threshold: DEFAULT_OVERSIZED_CLUSTER_THRESHOLD,
            explain_top: DEFAULT_EXPLAIN_TOP,
            low_reciprocity_threshold: DEFAULT_LOW_RECIPROCITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeoConfig {
    pub nearby: ScoreWeights,
    pub cross_cluster: CrossClusterPolicy,
    pub doctor: DoctorConfig,
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: failed to read config: {message}")]
    Read { path: String, message: String },

    #[error("{path}: invalid JSON config: {message}")]
    Json { path: String, message: String },

    #[error("{path}: invalid TOML config: {message}")]
    Toml { path: String, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl GeoConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Json {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Toml {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.nearby;
        if weights.limit == 0 {
            return Err(ConfigError::Invalid("nearby.limit must be at least 1".to_string()));
        }
        let numeric = [
            ("nearby.adjacencyBoost", weights.adjacency_boost),
            ("nearby.clusterBoost", weights.cluster_boost),
            ("nearby.biasKm", weights.bias_km),
            ("nearby.distanceWeight", weights.distance_weight),
            ("nearby.crossClusterPenalty", weights.cross_cluster_penalty),
            (
                "doctor.lowReciprocityThreshold",
                self.doctor.low_reciprocity_threshold,
            ),
        ];
        for (field, value) in numeric {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{field} must be finite")));
            }
        }
        Ok(())
    }
}

/// Load configuration from a `.toml` or JSON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<GeoConfig, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: display.clone(),
        message: e.to_string(),
    })?;

    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let config: GeoConfig = if is_toml {
        toml::from_str(&text).map_err(|e| ConfigError::Toml {
            path: display,
            message: e.to_string(),
        })?
    } else {
        serde_json::from_str(&text).map_err(|e| ConfigError::Json {
            path: display,
            message: e.to_string(),
        })?
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = GeoConfig::from_json_str("{}").expect("defaults");
        assert_eq!(config, GeoConfig::default());
        assert_eq!(config.nearby.limit, DEFAULT_LIMIT);
        assert_eq!(config.nearby.cross_cluster_mode, CrossClusterMode::Penalize);
    }

    #[test]
    fn json_config_parses_camel_case_fields() {
        let config = GeoConfig::from_json_str(
            r#"{
                "nearby": {
                    "limit": 3,
                    "adjacencyBoost": 10,
                    "biasKm": -2.5,
                    "onlyCovered": true,
                    "crossClusterMode": "drop"
                },
                "crossCluster": {"whitelistEdges": [["Bondi", "manly"]]}
            }"#,
        )
        .expect("valid config");
        assert_eq!(config.nearby.limit, 3);
        assert_eq!(config.nearby.adjacency_boost, 10.0);
        assert_eq!(config.nearby.per_km_penalty(), 2.5);
        assert!(config.nearby.only_covered);
        assert_eq!(config.nearby.cross_cluster_mode, CrossClusterMode::Drop);
        assert!(config.cross_cluster.is_whitelisted("manly", "bondi"));
        assert!(!config.cross_cluster.is_blacklisted("manly", "bondi"));
    }

    #[test]
    fn toml_config_parses() {
        let config = GeoConfig::from_toml_str(
            r#"
            [nearby]
            limit = 4
            crossClusterMode = "allow"

            [doctor]
            oversizedClusterThreshold = 12
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.nearby.limit, 4);
        assert_eq!(config.nearby.cross_cluster_mode, CrossClusterMode::Allow);
        assert_eq!(config.doctor.oversized_cluster_threshold, 12);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = GeoConfig::from_json_str(r#"{"nearby": {"limit": 0}}"#).expect_err("invalid");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = GeoConfig::from_json_str(r#"{"nearby": {"crossClusterMode": "sometimes"}}"#)
            .expect_err("invalid");
        assert!(matches!(err, ConfigError::Json { .. }));
    }
}
