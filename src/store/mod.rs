//! Versioned key/value backend.
//!
//! Keys live in an ordered map so range scans can step to the next greater
//! or next lesser key. Every operation, reads included, holds the single
//! store mutex for its whole duration.
//!
//! # TigerStyle Invariants
//!
//! - For a given (node, key, timestamp) at most one version is visible: the
//!   newest one whose `written_at + visibility[node] <= timestamp`
//! - Writes only prepend; no stored version is ever modified
//! - Callers receive copies, never references into the map

use crate::error::SimError;
use crate::model::{Node, Record, StalenessMap, Version, VersionSet};
use crate::time::Timestamp;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

pub struct Store {
    data: Mutex<BTreeMap<String, VersionSet>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store {
            data: Mutex::new(BTreeMap::new()),
        }
    }

    /// What `node` sees for `key` at `at`, restricted to `columns`.
    /// Returns the NULL sentinel when nothing is visible.
    pub fn get(
        &self,
        node: &Node,
        key: &str,
        columns: Option<&BTreeSet<String>>,
        at: Timestamp,
    ) -> Version {
        let data = self.data.lock();
        let version = visible(&data, node, key, at)
            .map(|v| v.clone_columns(columns))
            .unwrap_or_else(Version::null);

        // TigerStyle: Postcondition
        debug_assert!(
            version.is_null() || version.is_visible_to(node, at),
            "Postcondition violated: returned version not visible to {} at {:?}",
            node,
            at
        );
        version
    }

    /// Up to `count` non-null records starting at `key` (inclusive), walking
    /// the keyspace upwards or downwards. Each key follows the same
    /// visibility rule as [`Store::get`].
    pub fn get_range(
        &self,
        node: &Node,
        key: &str,
        count: usize,
        ascending: bool,
        columns: Option<&BTreeSet<String>>,
        at: Timestamp,
    ) -> Vec<Record> {
        let data = self.data.lock();
        let mut records = Vec::with_capacity(count.min(64));
        if count == 0 {
            return records;
        }

        let candidates: Box<dyn Iterator<Item = (&String, &VersionSet)> + '_> = if ascending {
            Box::new(data.range::<str, _>((Bound::Included(key), Bound::Unbounded)))
        } else {
            Box::new(data.range::<str, _>((Bound::Unbounded, Bound::Included(key))).rev())
        };

        for (candidate_key, versions) in candidates {
            if let Some(version) = versions.visible(node, at).filter(|v| !v.is_null()) {
                records.push(Record::new(candidate_key.clone(), version.clone_columns(columns)));
                if records.len() == count {
                    break;
                }
            }
        }

        // TigerStyle: Postconditions
        debug_assert!(records.len() <= count, "Postcondition violated: scan exceeded count");
        debug_assert!(
            records.windows(2).all(|w| if ascending { w[0].key < w[1].key } else { w[0].key > w[1].key }),
            "Postcondition violated: scan out of key order"
        );
        records
    }

    /// Prepend `version` as a fresh record. Fails unless `node` sees nothing
    /// (or a deletion) for `key` at the version's write time.
    pub fn insert(&self, node: &Node, key: &str, version: Version) -> Result<(), SimError> {
        let mut data = self.data.lock();
        let exists = visible(&data, node, key, version.written_at()).is_some_and(|v| !v.is_null());
        if exists {
            return Err(SimError::insert(key));
        }
        data.entry(key.to_string()).or_default().prepend(version);
        Ok(())
    }

    /// Prepend `version` over the record `node` currently sees. Columns the
    /// update does not set keep their visible values. Returns the stored
    /// version.
    pub fn update(&self, node: &Node, key: &str, version: Version) -> Result<Version, SimError> {
        let mut data = self.data.lock();
        let base = match visible(&data, node, key, version.written_at()) {
            Some(current) if !current.is_null() => current.values().clone(),
            _ => return Err(SimError::update(key)),
        };
        let merged = version.overlay_on(&base);
        data.entry(key.to_string()).or_default().prepend(merged.clone());
        Ok(merged)
    }

    /// Prepend a deletion marker carrying `visibility`
    pub fn delete(
        &self,
        node: &Node,
        key: &str,
        visibility: StalenessMap,
        at: Timestamp,
    ) -> Result<(), SimError> {
        let mut data = self.data.lock();
        let exists = visible(&data, node, key, at).is_some_and(|v| !v.is_null());
        if !exists {
            return Err(SimError::delete(key));
        }
        let tombstone = Version::tombstone().stamped(node, at, visibility);
        data.entry(key.to_string()).or_default().prepend(tombstone);
        Ok(())
    }

    /// Drop every key and its history
    pub fn clear(&self) {
        self.data.lock().clear();
    }

    /// Number of keys with at least one version
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    pub fn version_count(&self, key: &str) -> usize {
        self.data.lock().get(key).map_or(0, VersionSet::len)
    }

    pub fn keys(&self) -> Vec<String> {
        self.data.lock().keys().cloned().collect()
    }
}

fn visible<'a>(
    data: &'a BTreeMap<String, VersionSet>,
    node: &Node,
    key: &str,
    at: Timestamp,
) -> Option<&'a Version> {
    data.get(key).and_then(|versions| versions.visible(node, at))
}
