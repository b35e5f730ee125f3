//! MongoDB-like replication anomalies.
//!
//! Writes become visible to the receiving node at once and to every other
//! node after the one-way delay from the receiver. The client of a write
//! waits for
//!
//! ```text
//! client_server_delay + max(replication_delay, journaling_delay)
//! ```
//!
//! where the replication delay is the time until the k-th fastest replica
//! (or, for tagged concerns, the k-th fastest replica of every tag) has
//! acknowledged, and the journaling delay is the time until the next journal
//! commit tick.

use super::config::AnomalyConfig;
use super::delays::DelayGraph;
use super::{AnomalyGenerator, ClientDelayGenerator, StalenessGenerator};
use crate::error::{ErrorKind, SimError};
use crate::model::{Node, StalenessMap, WriteConcern};
use crate::protocol::{ClientRequest, ServerResponse};
use crate::time::{TimeHandler, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub struct MongoDbAnomalies {
    delays: DelayGraph,
    journal_commit_interval_ms: u64,
    tag_sets: BTreeMap<String, BTreeMap<String, u32>>,
    secondaries_read_only: bool,
    time: Arc<dyn TimeHandler>,
    /// Journal ticks are counted from here
    started_at: Timestamp,
}

impl MongoDbAnomalies {
    pub fn new(config: &AnomalyConfig, time: Arc<dyn TimeHandler>) -> Self {
        let started_at = time.now();
        MongoDbAnomalies {
            delays: DelayGraph::from_config(config),
            journal_commit_interval_ms: config.journal_commit_interval_ms,
            tag_sets: config.tag_sets.clone(),
            secondaries_read_only: config.secondaries_read_only,
            time,
            started_at,
        }
    }

    pub fn delays(&self) -> &DelayGraph {
        &self.delays
    }

    /// The receiver sees its own write at once; every other node after the
    /// one-way delay from the receiver.
    pub fn generate_staleness_map(&self, received_by: &Node, nodes: &[Node]) -> StalenessMap {
        let mut map = StalenessMap::new();
        for node in nodes {
            map.insert(node, self.delays.delay(received_by, node));
        }
        debug_assert_eq!(map.delay_for(received_by), Some(0), "own write must be visible at once");
        map
    }

    /// Delay the client of a write should observe
    pub fn calculate_delay(
        &self,
        client: Option<&str>,
        received_by: &Node,
        concern: &WriteConcern,
        nodes: &[Node],
    ) -> Result<u64, SimError> {
        let client_server = self.delays.client_delay(client, received_by);
        let replication = self.replication_delay(received_by, concern, nodes)?;
        let journaling = self.journaling_delay(concern);
        Ok(client_server.saturating_add(replication.max(journaling)))
    }

    /// Time until the write concern's acknowledgments are in
    pub fn replication_delay(
        &self,
        received_by: &Node,
        concern: &WriteConcern,
        nodes: &[Node],
    ) -> Result<u64, SimError> {
        let delay = match &concern.tag_set {
            Some(name) => self.tagged_delay(name, received_by, nodes)?,
            None => self.untagged_delay(concern.ack_count, received_by, nodes),
        };

        match delay {
            Some(d) if concern.timeout_ms > 0 => Ok(d.min(concern.timeout_ms)),
            Some(d) => Ok(d),
            None if concern.timeout_ms > 0 => {
                warn!(
                    node = %received_by,
                    timeout_ms = concern.timeout_ms,
                    "write concern cannot be satisfied, reporting timeout"
                );
                Ok(concern.timeout_ms)
            }
            None => Err(SimError::database(format!(
                "write concern cannot be satisfied by {} node(s)",
                nodes.len()
            ))),
        }
    }

    /// Time until the next journal commit tick. The commit interval is cut
    /// into thirds and a journaled write waits for the next third.
    pub fn journaling_delay(&self, concern: &WriteConcern) -> u64 {
        if !concern.journaling {
            return 0;
        }
        let tick = self.journal_commit_interval_ms / 3;
        if tick == 0 {
            return 0;
        }
        let elapsed = self.time.elapsed(self.started_at).as_millis() as u64;
        tick - (elapsed % tick)
    }

    fn untagged_delay(&self, ack_count: u32, received_by: &Node, nodes: &[Node]) -> Option<u64> {
        if nodes.len() <= 1 || ack_count <= 1 {
            return Some(0);
        }
        let round_trips = nodes
            .iter()
            .filter(|n| *n != received_by)
            .map(|n| self.delays.round_trip(received_by, n))
            .collect();
        // The receiver's own acknowledgment is free
        kth_fastest(round_trips, ack_count - 1)
    }

    fn tagged_delay(&self, name: &str, received_by: &Node, nodes: &[Node]) -> Result<Option<u64>, SimError> {
        let requirements = self.tag_set(name)?;
        let mut slowest = 0u64;
        for (tag, required) in requirements {
            let needed = if received_by.has_tag(tag) {
                required.saturating_sub(1)
            } else {
                *required
            };
            let round_trips = nodes
                .iter()
                .filter(|n| *n != received_by && n.has_tag(tag))
                .map(|n| self.delays.round_trip(received_by, n))
                .collect();
            match kth_fastest(round_trips, needed) {
                Some(delay) => slowest = slowest.max(delay),
                None => return Ok(None),
            }
        }
        Ok(Some(slowest))
    }

    fn tag_set(&self, name: &str) -> Result<&BTreeMap<String, u32>, SimError> {
        self.tag_sets.get(name).ok_or_else(|| {
            SimError::new(ErrorKind::UnknownTagSet, format!("tag set '{}' is not configured", name))
        })
    }
}

/// `k`-th smallest delay (1-based); 0 when nothing is required, `None` when
/// fewer than `k` candidates exist.
fn kth_fastest(mut delays: Vec<u64>, k: u32) -> Option<u64> {
    if k == 0 {
        return Some(0);
    }
    delays.sort_unstable();
    delays.get(k as usize - 1).copied()
}

impl StalenessGenerator for MongoDbAnomalies {
    fn write_visibility(
        &self,
        request: &ClientRequest,
        received_by: &Node,
        nodes: &[Node],
    ) -> Result<StalenessMap, SimError> {
        if self.secondaries_read_only && !received_by.is_primary() {
            return Err(SimError::new(
                ErrorKind::WriteForbidden,
                format!("node '{}' is a read-only secondary", received_by),
            ));
        }
        // Reject unknown tag sets before the write reaches the store
        if let Some(name) = request.write_concern().and_then(|c| c.tag_set.as_deref()) {
            self.tag_set(name)?;
        }
        Ok(self.generate_staleness_map(received_by, nodes))
    }
}

impl ClientDelayGenerator for MongoDbAnomalies {
    fn handle_response(
        &self,
        response: &mut ServerResponse,
        request: &ClientRequest,
        served_by: &Node,
        nodes: &[Node],
    ) -> Result<(), SimError> {
        if response.is_exception() {
            response.wait_timeout_ms = 0;
            return Ok(());
        }
        let client = request.client.as_deref();
        response.wait_timeout_ms = match request.write_concern() {
            Some(concern) => self.calculate_delay(client, served_by, concern, nodes)?,
            None => self.delays.client_delay(client, served_by),
        };
        Ok(())
    }
}

impl AnomalyGenerator for MongoDbAnomalies {
    fn client_latency(&self, client: Option<&str>, node: &Node) -> u64 {
        self.delays.client_delay(client, node)
    }
}
