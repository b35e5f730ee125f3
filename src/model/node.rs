use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identity of a simulated replica
///
/// Two nodes are the same node when their names match; tags and the primary
/// flag do not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    name: String,
    tags: BTreeSet<String>,
    is_primary: bool,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            tags: BTreeSet::new(),
            is_primary: false,
        }
    }

    pub fn primary(name: impl Into<String>) -> Self {
        Node::new(name).with_primary(true)
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Find a node by name
pub fn find_node<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Node> {
    nodes.iter().find(|n| n.name == name)
}

/// The node flagged primary, if any
pub fn primary_node(nodes: &[Node]) -> Option<&Node> {
    nodes.iter().find(|n| n.is_primary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_name() {
        let a = Node::new("a").with_tags(["x"]);
        let a2 = Node::primary("a");
        assert_eq!(a, a2);
        assert_ne!(a, Node::new("b"));
    }

    #[test]
    fn test_lookup_helpers() {
        let nodes = vec![Node::new("s1"), Node::primary("p"), Node::new("s2").with_tags(["dc1"])];
        assert_eq!(primary_node(&nodes).map(Node::name), Some("p"));
        assert!(find_node(&nodes, "s2").is_some_and(|n| n.has_tag("dc1")));
        assert!(find_node(&nodes, "missing").is_none());
    }
}
