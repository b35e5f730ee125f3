//! Request routing across independent backends ("shards").
//!
//! - A named destination node goes to the shard that owns the node
//! - Point reads and writes go where the table's strategy says (shard 0
//!   for tables without a strategy)
//! - Scans are broadcast to every shard; the answers are merged by key and
//!   cut to the requested count
//!
//! Every response leaving the router is restamped from the router's own id
//! sequence, so a client sees one increasing run of response ids no matter
//! which shards answered.
//!
//! Each shard serializes its own requests. Nothing is transactional across
//! shards: a scatter/gather scan sees each shard at its own moment.

use super::strategy::ShardingStrategy;
use crate::error::SimError;
use crate::handler::{BackendHandle, IdGenerator, QueryService};
use crate::model::Record;
use crate::protocol::{ClientRequest, RequestKind, ResponseBody, ServerResponse};
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, info};

pub struct ShardingRouter {
    shards: Vec<BackendHandle>,
    strategies: HashMap<String, Box<dyn ShardingStrategy>>,
    ids: IdGenerator,
}

impl ShardingRouter {
    pub fn new(shards: Vec<BackendHandle>) -> Self {
        info!(shards = shards.len(), "sharding router created");
        ShardingRouter {
            shards,
            strategies: HashMap::new(),
            ids: IdGenerator::new(),
        }
    }

    pub fn with_strategy<S>(mut self, table: impl Into<String>, strategy: S) -> Self
    where
        S: ShardingStrategy + 'static,
    {
        self.strategies.insert(table.into(), Box::new(strategy));
        self
    }

    pub fn with_boxed_strategy(mut self, table: impl Into<String>, strategy: Box<dyn ShardingStrategy>) -> Self {
        self.strategies.insert(table.into(), strategy);
        self
    }

    pub fn shards(&self) -> &[BackendHandle] {
        &self.shards
    }

    /// Shard a point request would go to
    pub fn route(&self, request: &ClientRequest) -> Option<usize> {
        if self.shards.is_empty() {
            return None;
        }
        if let Some(node) = &request.destination_node {
            return self.shards.iter().position(|s| s.owns_node(node));
        }
        let idx = self
            .strategies
            .get(&request.table)
            .map_or(0, |strategy| strategy.target_shard(request, self.shards.len()));
        debug_assert!(idx < self.shards.len(), "strategy produced invalid shard index {}", idx);
        Some(idx.min(self.shards.len() - 1))
    }

    pub async fn process_query(&self, request: ClientRequest) -> ServerResponse {
        if request.destination_node.is_none() && !self.shards.is_empty() {
            if let RequestKind::Scan { record_count, ascending, .. } = &request.kind {
                let (record_count, ascending) = (*record_count, *ascending);
                return self.scatter_scan(request, record_count, ascending).await;
            }
        }

        match self.route(&request) {
            Some(idx) => {
                debug!(request_id = request.id, shard = idx, kind = request.kind_name(), "routed");
                let mut response = self.shards[idx].process_query(request).await;
                response.response_id = self.ids.next_id();
                response
            }
            None => self.exception(&request, SimError::no_matching_node()),
        }
    }

    async fn scatter_scan(&self, request: ClientRequest, record_count: usize, ascending: bool) -> ServerResponse {
        let futures: Vec<_> = self
            .shards
            .iter()
            .map(|shard| shard.process_query(request.clone()))
            .collect();
        let responses = futures::future::join_all(futures).await;
        debug!(request_id = request.id, shards = responses.len(), "scan gathered");

        let mut merged: Vec<Record> = Vec::new();
        let mut wait_timeout_ms = 0;
        for response in responses {
            wait_timeout_ms = wait_timeout_ms.max(response.wait_timeout_ms);
            match response.body {
                ResponseBody::Scan(records) => merged.extend(records),
                ResponseBody::Exception(err) => return self.exception(&request, err),
                other => {
                    return self.exception(
                        &request,
                        SimError::database(format!("shard answered a scan with {:?}", other)),
                    )
                }
            }
        }

        if ascending {
            merged.sort_by(|a, b| a.key.cmp(&b.key));
        } else {
            merged.sort_by(|a, b| b.key.cmp(&a.key));
        }
        merged.truncate(record_count);

        let mut response = ServerResponse::new(
            request.id,
            self.ids.next_id(),
            request.sent_by_client_at,
            ResponseBody::Scan(merged),
        );
        response.wait_timeout_ms = wait_timeout_ms;
        response
    }

    fn exception(&self, request: &ClientRequest, err: SimError) -> ServerResponse {
        ServerResponse::new(
            request.id,
            self.ids.next_id(),
            request.sent_by_client_at,
            ResponseBody::Exception(err),
        )
    }
}

impl QueryService for ShardingRouter {
    fn process(&self, request: ClientRequest) -> impl Future<Output = ServerResponse> + Send {
        self.process_query(request)
    }
}
