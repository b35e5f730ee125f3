//! Versions and their per-node visibility.
//!
//! A [`Version`] is one snapshot of a record's columns plus the metadata of
//! the write that produced it. Its [`StalenessMap`] is attached once, when the
//! write is stamped, and has no mutators afterwards.

use super::Node;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single column value
pub type Value = serde_json::Value;

/// Column name to value, ordered by column name
pub type Columns = BTreeMap<String, Value>;

/// Delay (ms) after which each node observes a write
///
/// A node missing from the map never observes the write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessMap {
    delays: BTreeMap<String, u64>,
}

impl StalenessMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: &Node, delay_ms: u64) {
        self.delays.insert(node.name().to_string(), delay_ms);
    }

    pub fn with(mut self, node: &Node, delay_ms: u64) -> Self {
        self.insert(node, delay_ms);
        self
    }

    pub fn delay_for(&self, node: &Node) -> Option<u64> {
        self.delays.get(node.name()).copied()
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.delays.iter().map(|(name, delay)| (name.as_str(), *delay))
    }
}

/// One snapshot of a record
///
/// Equality compares `values` only; write metadata is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    values: Columns,
    written_at: Timestamp,
    written_by: Option<Node>,
    visibility: StalenessMap,
    is_null: bool,
}

impl Version {
    /// Unstamped version holding `values`
    pub fn new(values: Columns) -> Self {
        Version {
            values,
            written_at: Timestamp::ZERO,
            written_by: None,
            visibility: StalenessMap::new(),
            is_null: false,
        }
    }

    /// The sentinel for "never written"
    pub fn null() -> Self {
        Version {
            values: Columns::new(),
            written_at: Timestamp::ZERO,
            written_by: None,
            visibility: StalenessMap::new(),
            is_null: true,
        }
    }

    /// Deletion marker
    pub fn tombstone() -> Self {
        Version::null()
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Version::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Attach the write metadata. Consumes the version so the visibility map
    /// cannot be changed once a version has been stamped.
    pub fn stamped(mut self, written_by: &Node, written_at: Timestamp, visibility: StalenessMap) -> Self {
        self.written_by = Some(written_by.clone());
        self.written_at = written_at;
        self.visibility = visibility;
        self
    }

    /// Fill in every column of `base` this version does not set itself
    pub fn overlay_on(mut self, base: &Columns) -> Self {
        for (name, value) in base {
            self.values
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn values(&self) -> &Columns {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Columns {
        &mut self.values
    }

    pub fn into_values(self) -> Columns {
        self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn written_at(&self) -> Timestamp {
        self.written_at
    }

    pub fn written_by(&self) -> Option<&Node> {
        self.written_by.as_ref()
    }

    pub fn visibility(&self) -> &StalenessMap {
        &self.visibility
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Moment from which `node` observes this version, `None` if never
    pub fn visible_since(&self, node: &Node) -> Option<Timestamp> {
        self.visibility
            .delay_for(node)
            .map(|delay| self.written_at.plus_millis(delay))
    }

    pub fn is_visible_to(&self, node: &Node, at: Timestamp) -> bool {
        self.visible_since(node).is_some_and(|since| since <= at)
    }

    /// Independent copy restricted to `columns` (all columns when `None`).
    /// Write metadata is carried over unchanged.
    pub fn clone_columns(&self, columns: Option<&BTreeSet<String>>) -> Version {
        let values = match columns {
            None => self.values.clone(),
            Some(wanted) => self
                .values
                .iter()
                .filter(|(name, _)| wanted.contains(*name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        };
        Version {
            values,
            written_at: self.written_at,
            written_by: self.written_by.clone(),
            visibility: self.visibility.clone(),
            is_null: self.is_null,
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

/// A version together with the key it was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub version: Version,
}

impl Record {
    pub fn new(key: impl Into<String>, version: Version) -> Self {
        Record {
            key: key.into(),
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Version {
        let node = Node::new("a");
        Version::from_pairs([("name", json!("adele")), ("age", json!(35))]).stamped(
            &node,
            Timestamp(10),
            StalenessMap::new().with(&node, 0),
        )
    }

    #[test]
    fn test_clone_columns_subset() {
        let original = sample();
        let clone = original.clone_columns(Some(&BTreeSet::from(["name".to_string()])));

        assert_eq!(clone.values().len(), 1);
        assert_eq!(clone.get("name"), Some(&json!("adele")));
        assert_eq!(clone.written_by(), original.written_by());
        assert_eq!(clone.written_at(), original.written_at());
        assert_eq!(clone.visibility(), original.visibility());
    }

    #[test]
    fn test_clone_isolation() {
        let original = sample();
        let mut clone = original.clone_columns(None);
        clone.set("name", json!("bob"));
        clone.values_mut().remove("age");

        assert_eq!(original.get("name"), Some(&json!("adele")));
        assert_eq!(original.get("age"), Some(&json!(35)));
    }

    #[test]
    fn test_equality_ignores_metadata() {
        let a = sample();
        let b = Version::from_pairs([("age", json!(35)), ("name", json!("adele"))]);
        assert_eq!(a, b);
        assert_ne!(a.written_by(), b.written_by());
    }

    #[test]
    fn test_visible_since() {
        let a = Node::new("a");
        let b = Node::new("b");
        let c = Node::new("c");
        let v = Version::from_pairs([("x", json!(1))]).stamped(
            &a,
            Timestamp(100),
            StalenessMap::new().with(&a, 0).with(&b, 500),
        );

        assert_eq!(v.visible_since(&a), Some(Timestamp(100)));
        assert_eq!(v.visible_since(&b), Some(Timestamp(600)));
        assert_eq!(v.visible_since(&c), None);
        assert!(!v.is_visible_to(&b, Timestamp(599)));
        assert!(v.is_visible_to(&b, Timestamp(600)));
        assert!(!v.is_visible_to(&c, Timestamp(u64::MAX)));
    }
}
