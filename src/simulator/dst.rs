//! Deterministic Simulation Testing for the query handler
//!
//! Drives a [`QueryHandler`] backed by the MongoDB-like anomaly model with a
//! seeded random workload: writes and reads against random nodes, random
//! per-edge replication delays, random write concerns, and a manual clock
//! that jumps forward between operations.
//!
//! ## Design
//!
//! The harness keeps a **shadow state** next to the real handler. The shadow
//! records every accepted write with its own copy of the per-node delays and
//! recomputes visibility independently. After every operation the handler's
//! answer is compared with the shadow's:
//!
//! - Writes succeed exactly when the shadow says the precondition holds
//! - Reads and scans return exactly the shadow-visible values
//! - Write waits equal the k-th fastest round trip to the replicas
//! - Response ids strictly increase
//!
//! ## Usage
//!
//! ```rust,ignore
//! for seed in 0..100 {
//!     let mut harness = QueryDSTHarness::with_seed(seed);
//!     harness.run(500);
//!     assert!(harness.result().is_success(), "Seed {} failed", seed);
//! }
//! ```

use super::rng::DeterministicRng;
use crate::anomaly::{AnomalyConfig, MongoDbAnomalies};
use crate::error::ErrorKind;
use crate::handler::QueryHandler;
use crate::model::{Columns, Node, WriteConcern};
use crate::protocol::{ClientRequest, ServerResponse};
use crate::time::ManualTimeHandler;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

const TABLE: &str = "usertable";

/// Configuration for query handler DST
#[derive(Debug, Clone)]
pub struct QueryDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    pub num_nodes: usize,
    /// Number of unique keys in the key space
    pub num_keys: usize,
    /// Number of distinct column names
    pub num_fields: usize,
    /// Upper bound for a random one-way node delay
    pub max_delay_ms: u64,
    /// Probability that a node pair gets its own delay instead of the default
    pub custom_edge_probability: f64,
    /// Probability that the clock moves before an operation
    pub tick_probability: f64,
    pub max_tick_ms: u64,
    /// Skew of key selection (higher = hotter hot keys)
    pub key_skew: f64,

    // Operation weights
    pub weight_insert: u64,
    pub weight_update: u64,
    pub weight_delete: u64,
    pub weight_read: u64,
    pub weight_scan: u64,
}

impl Default for QueryDSTConfig {
    fn default() -> Self {
        QueryDSTConfig {
            seed: 0,
            num_nodes: 3,
            num_keys: 30,
            num_fields: 4,
            max_delay_ms: 200,
            custom_edge_probability: 0.5,
            tick_probability: 0.5,
            max_tick_ms: 50,
            key_skew: 1.0,
            weight_insert: 30,
            weight_update: 20,
            weight_delete: 10,
            weight_read: 30,
            weight_scan: 10,
        }
    }
}

impl QueryDSTConfig {
    /// Standard configuration with given seed
    pub fn new(seed: u64) -> Self {
        QueryDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Calm configuration - short delays, the clock usually outruns replication
    pub fn calm(seed: u64) -> Self {
        QueryDSTConfig {
            seed,
            max_delay_ms: 10,
            tick_probability: 0.8,
            max_tick_ms: 100,
            ..Default::default()
        }
    }

    /// Chaos configuration - more nodes, long delays, hot keys
    pub fn chaos(seed: u64) -> Self {
        QueryDSTConfig {
            seed,
            num_nodes: 5,
            num_keys: 15,
            max_delay_ms: 2_000,
            custom_edge_probability: 0.9,
            tick_probability: 0.3,
            max_tick_ms: 20,
            key_skew: 2.0,
            ..Default::default()
        }
    }

    fn total_weight(&self) -> u64 {
        self.weight_insert + self.weight_update + self.weight_delete + self.weight_read + self.weight_scan
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum QueryOp {
    Insert { node: String, key: String },
    Update { node: String, key: String },
    Delete { node: String, key: String },
    Read { node: String, key: String },
    Scan { node: String, key: String, count: usize, ascending: bool },
}

/// Result of a query handler DST run
#[derive(Debug, Clone)]
pub struct QueryDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub writes_accepted: u64,
    pub writes_rejected: u64,
    pub reads: u64,
    pub scans: u64,
    /// Reads that saw something other than the newest write
    pub stale_reads: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<QueryOp>,
}

impl QueryDSTResult {
    pub fn new(seed: u64) -> Self {
        QueryDSTResult {
            seed,
            total_operations: 0,
            writes_accepted: 0,
            writes_rejected: 0,
            reads: 0,
            scans: 0,
            stale_reads: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (writes ok:{} rejected:{}, reads:{} stale:{}, scans:{}), {} violations",
            self.seed,
            self.total_operations,
            self.writes_accepted,
            self.writes_rejected,
            self.reads,
            self.stale_reads,
            self.scans,
            self.invariant_violations.len()
        )
    }
}

// =============================================================================
// Shadow State - Reference Model
// =============================================================================

#[derive(Debug, Clone)]
struct ShadowVersion {
    /// `None` for a deletion
    values: Option<Columns>,
    written_at: u64,
    delays: BTreeMap<String, u64>,
}

/// Every accepted write per key, oldest first
struct ShadowState {
    data: BTreeMap<String, Vec<ShadowVersion>>,
}

impl ShadowState {
    fn new() -> Self {
        ShadowState { data: BTreeMap::new() }
    }

    fn visible(&self, key: &str, node: &str, now: u64) -> Option<&ShadowVersion> {
        self.data.get(key)?.iter().rev().find(|v| {
            v.delays
                .get(node)
                .is_some_and(|delay| v.written_at.saturating_add(*delay) <= now)
        })
    }

    fn visible_values(&self, key: &str, node: &str, now: u64) -> Option<&Columns> {
        self.visible(key, node, now).and_then(|v| v.values.as_ref())
    }

    fn newest(&self, key: &str) -> Option<&ShadowVersion> {
        self.data.get(key)?.last()
    }

    fn push(&mut self, key: &str, version: ShadowVersion) {
        self.data.entry(key.to_string()).or_default().push(version);
    }

    fn scan(&self, start: &str, node: &str, now: u64, count: usize, ascending: bool) -> Vec<(String, Columns)> {
        let keys: Box<dyn Iterator<Item = &String> + '_> = if ascending {
            Box::new(self.data.keys().filter(|k| k.as_str() >= start))
        } else {
            Box::new(self.data.keys().rev().filter(|k| k.as_str() <= start))
        };
        keys.filter_map(|k| self.visible_values(k, node, now).map(|v| (k.clone(), v.clone())))
            .take(count)
            .collect()
    }
}

// =============================================================================
// DST Harness
// =============================================================================

pub struct QueryDSTHarness {
    config: QueryDSTConfig,
    rng: DeterministicRng,
    handler: QueryHandler,
    clock: ManualTimeHandler,
    nodes: Vec<Node>,
    default_delay_ms: u64,
    edges: BTreeMap<(String, String), u64>,
    shadow: ShadowState,
    result: QueryDSTResult,
    last_response_id: u64,
}

impl QueryDSTHarness {
    pub fn new(config: QueryDSTConfig) -> Self {
        let mut rng = DeterministicRng::new(config.seed);
        let nodes: Vec<Node> = (0..config.num_nodes.max(1))
            .map(|i| Node::new(format!("n{}", i)).with_primary(i == 0))
            .collect();

        let default_delay_ms = rng.gen_range(0, config.max_delay_ms + 1);
        let mut anomaly = AnomalyConfig::new(default_delay_ms);
        let mut edges = BTreeMap::new();
        for from in &nodes {
            for to in nodes.iter().filter(|n| *n != from) {
                if rng.gen_bool(config.custom_edge_probability) {
                    let delay = rng.gen_range(0, config.max_delay_ms + 1);
                    anomaly = anomaly.with_custom_delay(from.name(), to.name(), delay);
                    edges.insert((from.name().to_string(), to.name().to_string()), delay);
                }
            }
        }

        let clock = ManualTimeHandler::new(1_000_000);
        let time = Arc::new(clock.clone());
        let anomalies = MongoDbAnomalies::new(&anomaly, time.clone());
        let handler = QueryHandler::new(nodes.clone(), anomalies, time);

        QueryDSTHarness {
            result: QueryDSTResult::new(config.seed),
            config,
            rng,
            handler,
            clock,
            nodes,
            default_delay_ms,
            edges,
            shadow: ShadowState::new(),
            last_response_id: 0,
        }
    }

    /// Create with just a seed (uses default config)
    pub fn with_seed(seed: u64) -> Self {
        Self::new(QueryDSTConfig::new(seed))
    }

    // =========================================================================
    // Reference computations
    // =========================================================================

    fn delay(&self, from: &str, to: &str) -> u64 {
        if from == to {
            return 0;
        }
        self.edges
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(self.default_delay_ms)
    }

    fn delays_from(&self, receiver: &str) -> BTreeMap<String, u64> {
        self.nodes
            .iter()
            .map(|n| (n.name().to_string(), self.delay(receiver, n.name())))
            .collect()
    }

    fn expected_wait(&self, receiver: &str, ack_count: u32) -> u64 {
        if ack_count <= 1 || self.nodes.len() <= 1 {
            return 0;
        }
        let mut round_trips: Vec<u64> = self
            .nodes
            .iter()
            .filter(|n| n.name() != receiver)
            .map(|n| self.delay(receiver, n.name()) + self.delay(n.name(), receiver))
            .collect();
        round_trips.sort_unstable();
        round_trips[ack_count as usize - 2]
    }

    // =========================================================================
    // Workload generation
    // =========================================================================

    fn random_key(&mut self) -> String {
        let idx = self.rng.skewed_index(self.config.num_keys, self.config.key_skew);
        format!("user{:04}", idx)
    }

    fn random_node(&mut self) -> String {
        let idx = self.rng.index(self.nodes.len());
        self.nodes[idx].name().to_string()
    }

    fn random_columns(&mut self, max_columns: usize) -> Columns {
        let n = 1 + self.rng.index(max_columns.max(1));
        (0..n)
            .map(|_| {
                let field = format!("field{}", self.rng.index(self.config.num_fields));
                (field, json!(self.rng.gen_range(0, 1_000)))
            })
            .collect()
    }

    fn random_concern(&mut self) -> WriteConcern {
        let ack_count = self.rng.gen_range(1, self.nodes.len() as u64 + 1) as u32;
        WriteConcern::acknowledged(ack_count)
    }

    // =========================================================================
    // Operation Runners
    // =========================================================================

    fn run_single_op(&mut self) {
        if self.rng.gen_bool(self.config.tick_probability) {
            let step = self.rng.gen_range(1, self.config.max_tick_ms + 1);
            self.clock.advance_ms(step);
        }

        let choice = self.rng.gen_range(0, self.config.total_weight());
        let mut threshold = self.config.weight_insert;
        if choice < threshold {
            return self.run_write(WriteKind::Insert);
        }
        threshold += self.config.weight_update;
        if choice < threshold {
            return self.run_write(WriteKind::Update);
        }
        threshold += self.config.weight_delete;
        if choice < threshold {
            return self.run_write(WriteKind::Delete);
        }
        threshold += self.config.weight_read;
        if choice < threshold {
            return self.run_read();
        }
        self.run_scan()
    }

    fn run_write(&mut self, kind: WriteKind) {
        let node = self.random_node();
        let key = self.random_key();
        let concern = self.random_concern();
        let ack_count = concern.ack_count;
        let now = self.clock.current_ms();

        let (request, op, values) = match kind {
            WriteKind::Insert => {
                let values = self.random_columns(3);
                let request = ClientRequest::insert(TABLE, key.clone(), values.clone());
                let op = QueryOp::Insert { node: node.clone(), key: key.clone() };
                (request, op, Some(values))
            }
            WriteKind::Update => {
                let values = self.random_columns(2);
                let request = ClientRequest::update(TABLE, key.clone(), values.clone());
                let op = QueryOp::Update { node: node.clone(), key: key.clone() };
                (request, op, Some(values))
            }
            WriteKind::Delete => {
                let request = ClientRequest::delete(TABLE, key.clone());
                let op = QueryOp::Delete { node: node.clone(), key: key.clone() };
                (request, op, None)
            }
        };
        self.result.last_op = Some(op);

        let current = self.shadow.visible_values(&key, &node, now).cloned();
        let (accept, rejection) = match kind {
            WriteKind::Insert => (current.is_none(), ErrorKind::Insert),
            WriteKind::Update => (current.is_some(), ErrorKind::Update),
            WriteKind::Delete => (current.is_some(), ErrorKind::Delete),
        };

        let response = self.send(request.via(node.clone()).with_write_concern(concern));

        if !accept {
            self.result.writes_rejected += 1;
            match response.error() {
                Some(err) if err.kind == rejection => {}
                _ => self.violation(&format!("expected {} rejection, got {:?}", rejection, response.body)),
            }
            return;
        }

        if let Some(err) = response.error() {
            let msg = format!("write should have been accepted, got {}", err);
            self.violation(&msg);
            return;
        }
        self.result.writes_accepted += 1;

        let expected_wait = self.expected_wait(&node, ack_count);
        if response.wait_timeout_ms != expected_wait {
            let msg = format!(
                "ack_count {} on {}: expected wait {}, got {}",
                ack_count, node, expected_wait, response.wait_timeout_ms
            );
            self.violation(&msg);
        }

        let stored = match (kind, values) {
            (WriteKind::Update, Some(update)) => {
                let mut merged = current.unwrap_or_default();
                merged.extend(update);
                Some(merged)
            }
            (_, values) => values,
        };
        let delays = self.delays_from(&node);
        self.shadow.push(
            &key,
            ShadowVersion {
                values: stored,
                written_at: now,
                delays,
            },
        );
    }

    fn run_read(&mut self) {
        let node = self.random_node();
        let key = self.random_key();
        let now = self.clock.current_ms();
        self.result.last_op = Some(QueryOp::Read { node: node.clone(), key: key.clone() });
        self.result.reads += 1;

        let response = self.send(ClientRequest::read(TABLE, key.clone()).via(node.clone()));
        if response.wait_timeout_ms != 0 {
            self.violation(&format!("read waited {}ms", response.wait_timeout_ms));
        }

        let expected = self.shadow.visible_values(&key, &node, now).cloned();
        let newest = self.shadow.newest(&key).and_then(|v| v.values.clone());
        if expected != newest {
            self.result.stale_reads += 1;
        }

        match (response.version(), expected) {
            (Some(version), None) if version.is_null() => {}
            (Some(version), Some(values)) if !version.is_null() && *version.values() == values => {}
            (got, want) => self.violation(&format!("read of {} on {}: expected {:?}, got {:?}", key, node, want, got)),
        }
    }

    fn run_scan(&mut self) {
        let node = self.random_node();
        let key = self.random_key();
        let count = 1 + self.rng.index(5);
        let ascending = self.rng.gen_bool(0.5);
        let now = self.clock.current_ms();
        self.result.last_op = Some(QueryOp::Scan {
            node: node.clone(),
            key: key.clone(),
            count,
            ascending,
        });
        self.result.scans += 1;

        let mut request = ClientRequest::scan(TABLE, key.clone(), count).via(node.clone());
        if !ascending {
            request = request.descending();
        }
        let response = self.send(request);

        let expected = self.shadow.scan(&key, &node, now, count, ascending);
        let got: Option<Vec<(String, Columns)>> = response.records().map(|records| {
            records
                .iter()
                .map(|r| (r.key.clone(), r.version.values().clone()))
                .collect()
        });
        if got.as_ref() != Some(&expected) {
            self.violation(&format!("scan from {} on {}: expected {:?}, got {:?}", key, node, expected, got));
        }
    }

    fn send(&mut self, request: ClientRequest) -> ServerResponse {
        let response = self.handler.process_query(request);
        if response.response_id <= self.last_response_id {
            let msg = format!(
                "response id {} not above previous {}",
                response.response_id, self.last_response_id
            );
            self.violation(&msg);
        }
        self.last_response_id = response.response_id;
        response
    }

    fn violation(&mut self, msg: &str) {
        self.result.invariant_violations.push(format!(
            "Op #{}: {:?} - {}",
            self.result.total_operations, self.result.last_op, msg
        ));
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Run specified number of operations, stopping at the first violation
    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.result.total_operations += 1;
            self.run_single_op();
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &QueryDSTResult {
        &self.result
    }

    pub fn handler(&self) -> &QueryHandler {
        &self.handler
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// Run a batch of DST runs with consecutive seeds
pub fn run_query_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> QueryDSTConfig,
) -> Vec<QueryDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = QueryDSTHarness::new(config_fn(seed));
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_query_batch(results: &[QueryDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let stale: u64 = results.iter().map(|r| r.stale_reads).sum();

    let mut summary = format!(
        "Query DST Summary\n\
         =================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {} ({} stale reads)\n",
        total, passed, failed, total_ops, stale
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  {}\n", result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
