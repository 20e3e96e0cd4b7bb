//! Engine configuration.

use quarry_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Order in which edges are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrder {
    /// Declaration order, checked to be a valid execution order
    #[default]
    Declared,
    /// Derived from the graph
    Topological,
}

/// How much of a transform chain is applied when a cross-table operation
/// forces it into a concrete table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializeMode {
    /// Canonicalization plus the first queued step
    #[default]
    FirstStep,
    /// Canonicalization plus every queued step
    FullChain,
}

/// Execution engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory for temporary artifacts
    pub temp_dir: PathBuf,
    /// Edge execution order
    pub edge_order: EdgeOrder,
    /// Forced materialization depth
    pub materialize: MaterializeMode,
    /// Product name prefixed to audit messages
    pub title: String,
}

impl EngineConfig {
    /// Default audit title
    pub const DEFAULT_TITLE: &'static str = "Quarry Analytics";

    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            edge_order: EdgeOrder::default(),
            materialize: MaterializeMode::default(),
            title: Self::DEFAULT_TITLE.to_string(),
        }
    }

    /// Parse from JSON; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` if the JSON is malformed
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::InvalidEncoding {
            reason: format!("engine config: {}", e),
        })
    }

    /// Set the temp directory
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Set the edge order
    #[must_use]
    pub fn with_edge_order(mut self, order: EdgeOrder) -> Self {
        self.edge_order = order;
        self
    }

    /// Set the materialization mode
    #[must_use]
    pub fn with_materialize(mut self, mode: MaterializeMode) -> Self {
        self.materialize = mode;
        self
    }

    /// Set the audit title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.edge_order, EdgeOrder::Declared);
        assert_eq!(config.materialize, MaterializeMode::FirstStep);
        assert_eq!(config.title, "Quarry Analytics");
        assert_eq!(config.temp_dir, std::env::temp_dir());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config =
            EngineConfig::from_json(r#"{"edge_order": "topological", "temp_dir": "/scratch"}"#)
                .unwrap();
        assert_eq!(config.edge_order, EdgeOrder::Topological);
        assert_eq!(config.temp_dir, PathBuf::from("/scratch"));
        assert_eq!(config.materialize, MaterializeMode::FirstStep);
        assert_eq!(config.title, EngineConfig::DEFAULT_TITLE);
    }

    #[test]
    fn test_config_bad_json() {
        let err = EngineConfig::from_json(r#"{"edge_order": "sideways"}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_config_builders() {
        let config = EngineConfig::new()
            .with_temp_dir("/tmp/q")
            .with_materialize(MaterializeMode::FullChain)
            .with_title("Audit");
        assert_eq!(config.temp_dir, PathBuf::from("/tmp/q"));
        assert_eq!(config.materialize, MaterializeMode::FullChain);
        assert_eq!(config.title, "Audit");
    }
}
