use super::{Node, Version};
use crate::time::Timestamp;
use std::collections::VecDeque;

/// History of one key, newest version at index 0
///
/// Writes only ever prepend; older versions stay in place so that a read at
/// any timestamp can walk back to whatever its node saw at that moment.
#[derive(Debug, Clone, Default)]
pub struct VersionSet {
    versions: VecDeque<Version>,
}

impl VersionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&mut self, version: Version) {
        debug_assert!(
            version.written_by().is_some(),
            "Precondition: only stamped versions enter a version set"
        );
        self.versions.push_front(version);
    }

    /// First version, newest to oldest, that `node` observes at `at`
    pub fn visible(&self, node: &Node, at: Timestamp) -> Option<&Version> {
        self.versions.iter().find(|v| v.is_visible_to(node, at))
    }

    pub fn newest(&self) -> Option<&Version> {
        self.versions.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
