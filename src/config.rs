//! Simulator configuration.
//!
//! Loaded from TOML:
//! ```text
//! [[shards]]
//! nodes = [
//!     { name = "n1", primary = true },
//!     { name = "n2", tags = ["east"] },
//! ]
//! [shards.anomaly]
//! default_delay_ms = 20
//! journal_commit_interval_ms = 300
//! custom_delays = [{ from = "n1", to = "n2", delay_ms = 50 }]
//!
//! [sharding.users]
//! type = "hash"
//! ```

use crate::anomaly::{AnomalyConfig, MongoDbAnomalies};
use crate::handler::{BackendHandle, QueryHandler};
use crate::model::Node;
use crate::sharding::{ShardingRouter, StrategyConfig};
use crate::time::TimeHandler;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Errors that can occur when loading a configuration
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading the file
    Io { path: String, source: std::io::Error },
    /// TOML syntax or shape error
    Parse { source: toml::de::Error },
    /// Well-formed but inconsistent configuration
    Invalid { reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path, source)
            }
            ConfigError::Parse { source } => write!(f, "Invalid config: {}", source),
            ConfigError::Invalid { reason } => write!(f, "Invalid config: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { reason: reason.into() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub primary: bool,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        NodeConfig {
            name: name.into(),
            tags: BTreeSet::new(),
            primary: false,
        }
    }

    pub fn primary(name: impl Into<String>) -> Self {
        NodeConfig {
            primary: true,
            ..Self::new(name)
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// One replica set: its nodes and the anomalies between them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            nodes: vec![NodeConfig::primary("n1"), NodeConfig::new("n2"), NodeConfig::new("n3")],
            anomaly: AnomalyConfig::new(50),
        }
    }
}

impl ClusterConfig {
    pub fn new(nodes: Vec<NodeConfig>, anomaly: AnomalyConfig) -> Self {
        ClusterConfig { nodes, anomaly }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(invalid("cluster has no nodes"));
        }
        let mut names = BTreeSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(invalid("node name is empty"));
            }
            if !names.insert(node.name.as_str()) {
                return Err(invalid(format!("duplicate node name '{}'", node.name)));
            }
        }
        let primaries = self.nodes.iter().filter(|n| n.primary).count();
        if primaries > 1 {
            return Err(invalid(format!("cluster has {} primaries", primaries)));
        }
        let names: Vec<&str> = names.into_iter().collect();
        self.anomaly.validate(&names).map_err(invalid)
    }

    /// Materialized nodes; the first node is primary when none is flagged
    pub fn nodes(&self) -> Vec<Node> {
        let has_primary = self.nodes.iter().any(|n| n.primary);
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                Node::new(n.name.clone())
                    .with_tags(n.tags.iter().cloned())
                    .with_primary(n.primary || (!has_primary && i == 0))
            })
            .collect()
    }

    pub fn build_handler(&self, time: Arc<dyn TimeHandler>) -> QueryHandler {
        let anomalies = MongoDbAnomalies::new(&self.anomaly, time.clone());
        QueryHandler::new(self.nodes(), anomalies, time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_shards")]
    pub shards: Vec<ClusterConfig>,
    /// Table name -> sharding strategy; unlisted tables live on shard 0
    #[serde(default)]
    pub sharding: BTreeMap<String, StrategyConfig>,
}

fn default_shards() -> Vec<ClusterConfig> {
    vec![ClusterConfig::default()]
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            shards: default_shards(),
            sharding: BTreeMap::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimulatorConfig = toml::from_str(text).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), shards = config.shards.len(), "config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards.is_empty() {
            return Err(invalid("no shards configured"));
        }
        let mut seen = BTreeSet::new();
        for cluster in &self.shards {
            cluster.validate()?;
            for node in &cluster.nodes {
                if !seen.insert(node.name.as_str()) {
                    return Err(invalid(format!("node '{}' appears in more than one shard", node.name)));
                }
            }
        }
        Ok(())
    }

    /// Spawn one backend per shard and put a router in front of them.
    /// Must be called from within a tokio runtime.
    pub fn build_router(&self, time: Arc<dyn TimeHandler>) -> ShardingRouter {
        let backends = self
            .shards
            .iter()
            .enumerate()
            .map(|(id, cluster)| BackendHandle::spawn(cluster.build_handler(time.clone()), id))
            .collect();
        self.sharding
            .iter()
            .fold(ShardingRouter::new(backends), |router, (table, strategy)| {
                router.with_boxed_strategy(table.clone(), strategy.build())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_node_becomes_primary() {
        let cluster = ClusterConfig::new(
            vec![NodeConfig::new("a"), NodeConfig::new("b").with_tag("east")],
            AnomalyConfig::default(),
        );
        cluster.validate().unwrap();
        let nodes = cluster.nodes();
        assert!(nodes[0].is_primary());
        assert!(!nodes[1].is_primary());
        assert!(nodes[1].has_tag("east"));
    }

    #[test]
    fn test_validation_errors() {
        let two_primaries = ClusterConfig::new(
            vec![NodeConfig::primary("a"), NodeConfig::primary("b")],
            AnomalyConfig::default(),
        );
        assert!(matches!(two_primaries.validate(), Err(ConfigError::Invalid { .. })));

        let duplicate = ClusterConfig::new(vec![NodeConfig::new("a"), NodeConfig::new("a")], AnomalyConfig::default());
        assert!(duplicate.validate().is_err());

        let empty = ClusterConfig::new(Vec::new(), AnomalyConfig::default());
        assert!(empty.validate().is_err());

        let bad_edge = ClusterConfig::new(
            vec![NodeConfig::new("a")],
            AnomalyConfig::new(0).with_custom_delay("a", "z", 5),
        );
        let err = bad_edge.validate().unwrap_err();
        assert!(err.to_string().contains("'z'"));
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            [[shards]]
            nodes = [{ name = "n1", primary = true }, { name = "n2", tags = ["east"] }]
            [shards.anomaly]
            default_delay_ms = 20
            journal_commit_interval_ms = 300
            custom_delays = [{ from = "n1", to = "n2", delay_ms = 50 }]
            [shards.anomaly.tag_sets.eastern]
            east = 1

            [[shards]]
            nodes = [{ name = "m1" }]

            [sharding.users]
            type = "range"
            boundaries = ["m"]
        "#;
        let config = SimulatorConfig::from_toml_str(text).unwrap();
        assert_eq!(config.shards.len(), 2);
        let anomaly = &config.shards[0].anomaly;
        assert_eq!(anomaly.default_delay_ms, 20);
        assert_eq!(anomaly.journal_commit_interval_ms, 300);
        assert_eq!(anomaly.custom_delays[0].delay_ms, 50);
        assert_eq!(anomaly.tag_sets["eastern"]["east"], 1);
        assert_eq!(config.shards[1].anomaly, AnomalyConfig::default());
        assert_eq!(
            config.sharding["users"],
            StrategyConfig::Range {
                boundaries: vec!["m".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            SimulatorConfig::from_toml_str("shards = 3"),
            Err(ConfigError::Parse { .. })
        ));
        let shared = r#"
            [[shards]]
            nodes = [{ name = "n1" }]
            [[shards]]
            nodes = [{ name = "n1" }]
        "#;
        assert!(matches!(
            SimulatorConfig::from_toml_str(shared),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_empty_config_is_default_cluster() {
        let config = SimulatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimulatorConfig::default());
        assert_eq!(config.shards[0].nodes().len(), 3);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim.toml");
        std::fs::write(&path, "[[shards]]\nnodes = [{ name = \"solo\" }]\n").unwrap();
        let config = SimulatorConfig::from_file(&path).unwrap();
        assert_eq!(config.shards[0].nodes()[0].name(), "solo");

        let missing = SimulatorConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
