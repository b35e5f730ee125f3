use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Directed delay between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayEdge {
    pub from: String,
    pub to: String,
    pub delay_ms: u64,
}

/// Latency between a client and a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDelayEdge {
    pub client: String,
    pub node: String,
    pub delay_ms: u64,
}

/// Parameters of the MongoDB-like anomaly model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Delay between any two nodes without a custom edge
    pub default_delay_ms: u64,
    /// Period of the simulated journal commit
    pub journal_commit_interval_ms: u64,
    pub custom_delays: Vec<DelayEdge>,
    pub client_delays: Vec<ClientDelayEdge>,
    /// Tag set name -> (tag -> required acknowledgments)
    pub tag_sets: BTreeMap<String, BTreeMap<String, u32>>,
    /// Reject writes that arrive at a secondary
    pub secondaries_read_only: bool,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        AnomalyConfig {
            default_delay_ms: 0,
            journal_commit_interval_ms: 100,
            custom_delays: Vec::new(),
            client_delays: Vec::new(),
            tag_sets: BTreeMap::new(),
            secondaries_read_only: false,
        }
    }
}

impl AnomalyConfig {
    pub fn new(default_delay_ms: u64) -> Self {
        AnomalyConfig {
            default_delay_ms,
            ..Default::default()
        }
    }

    pub fn with_custom_delay(mut self, from: impl Into<String>, to: impl Into<String>, delay_ms: u64) -> Self {
        self.custom_delays.push(DelayEdge {
            from: from.into(),
            to: to.into(),
            delay_ms,
        });
        self
    }

    /// Same delay in both directions
    pub fn with_symmetric_delay(self, a: &str, b: &str, delay_ms: u64) -> Self {
        self.with_custom_delay(a, b, delay_ms).with_custom_delay(b, a, delay_ms)
    }

    pub fn with_client_delay(mut self, client: impl Into<String>, node: impl Into<String>, delay_ms: u64) -> Self {
        self.client_delays.push(ClientDelayEdge {
            client: client.into(),
            node: node.into(),
            delay_ms,
        });
        self
    }

    pub fn with_journal_commit_interval(mut self, interval_ms: u64) -> Self {
        self.journal_commit_interval_ms = interval_ms;
        self
    }

    pub fn with_tag_requirement(mut self, tag_set: impl Into<String>, tag: impl Into<String>, acks: u32) -> Self {
        self.tag_sets
            .entry(tag_set.into())
            .or_default()
            .insert(tag.into(), acks);
        self
    }

    pub fn with_secondaries_read_only(mut self, read_only: bool) -> Self {
        self.secondaries_read_only = read_only;
        self
    }

    /// Check the parameters against the node names of the cluster
    pub fn validate(&self, node_names: &[&str]) -> Result<(), String> {
        if self.journal_commit_interval_ms < 3 {
            return Err(format!(
                "journal_commit_interval_ms must be at least 3, got {}",
                self.journal_commit_interval_ms
            ));
        }
        for edge in &self.custom_delays {
            for name in [&edge.from, &edge.to] {
                if !node_names.contains(&name.as_str()) {
                    return Err(format!("delay edge names unknown node '{}'", name));
                }
            }
        }
        for edge in &self.client_delays {
            if !node_names.contains(&edge.node.as_str()) {
                return Err(format!("client delay names unknown node '{}'", edge.node));
            }
        }
        Ok(())
    }
}
