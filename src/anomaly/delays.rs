use super::config::AnomalyConfig;
use crate::model::Node;
use std::collections::HashMap;

/// Node-to-node and client-to-node latencies
///
/// Any node pair without a custom edge falls back to the default delay.
/// A node is always at distance zero from itself.
#[derive(Debug, Clone)]
pub struct DelayGraph {
    default_delay_ms: u64,
    edges: HashMap<(String, String), u64>,
    client_edges: HashMap<(String, String), u64>,
}

impl DelayGraph {
    pub fn new(default_delay_ms: u64) -> Self {
        DelayGraph {
            default_delay_ms,
            edges: HashMap::new(),
            client_edges: HashMap::new(),
        }
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        let mut graph = DelayGraph::new(config.default_delay_ms);
        for edge in &config.custom_delays {
            graph.set_delay(&edge.from, &edge.to, edge.delay_ms);
        }
        for edge in &config.client_delays {
            graph.set_client_delay(&edge.client, &edge.node, edge.delay_ms);
        }
        graph
    }

    pub fn set_delay(&mut self, from: &str, to: &str, delay_ms: u64) {
        self.edges.insert((from.to_string(), to.to_string()), delay_ms);
    }

    pub fn set_client_delay(&mut self, client: &str, node: &str, delay_ms: u64) {
        self.client_edges
            .insert((client.to_string(), node.to_string()), delay_ms);
    }

    pub fn default_delay_ms(&self) -> u64 {
        self.default_delay_ms
    }

    /// One-way delay from `from` to `to`
    pub fn delay(&self, from: &Node, to: &Node) -> u64 {
        if from == to {
            return 0;
        }
        self.edges
            .get(&(from.name().to_string(), to.name().to_string()))
            .copied()
            .unwrap_or(self.default_delay_ms)
    }

    /// Request leg plus response leg
    pub fn round_trip(&self, from: &Node, to: &Node) -> u64 {
        self.delay(from, to).saturating_add(self.delay(to, from))
    }

    /// Client to node latency; 0 for unknown clients or missing edges
    pub fn client_delay(&self, client: Option<&str>, node: &Node) -> u64 {
        client
            .and_then(|c| {
                self.client_edges
                    .get(&(c.to_string(), node.name().to_string()))
                    .copied()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_edges_override_default() {
        let config = AnomalyConfig::new(100)
            .with_custom_delay("n1", "n2", 50)
            .with_custom_delay("n2", "n1", 25)
            .with_client_delay("app", "n1", 7);
        let graph = DelayGraph::from_config(&config);
        let (n1, n2, n3) = (Node::new("n1"), Node::new("n2"), Node::new("n3"));

        assert_eq!(graph.delay(&n1, &n2), 50);
        assert_eq!(graph.delay(&n2, &n1), 25);
        assert_eq!(graph.delay(&n1, &n3), 100);
        assert_eq!(graph.delay(&n1, &n1), 0);
        assert_eq!(graph.round_trip(&n1, &n2), 75);
        assert_eq!(graph.round_trip(&n1, &n3), 200);

        assert_eq!(graph.client_delay(Some("app"), &n1), 7);
        assert_eq!(graph.client_delay(Some("app"), &n2), 0);
        assert_eq!(graph.client_delay(None, &n1), 0);
    }
}
