//! Request dispatch for one simulated cluster.
//!
//! A [`QueryHandler`] owns the backend context (store, anomaly model, node
//! set, clock, id generator) and turns each request into a response:
//!
//! ```text
//! received -> routed -> validated -> anomaly computed -> store applied -> responded
//!                  \-> rejected ------------------------------------------/
//! ```
//!
//! Failures never escape `process_query`; they come back as exception
//! responses. `process_query` takes `&mut self`, so one handler serves one
//! request at a time.

use super::ids::IdGenerator;
use crate::anomaly::AnomalyGenerator;
use crate::error::SimError;
use crate::model::{find_node, primary_node, Columns, Node, ReadPreference, Version};
use crate::protocol::{ClientRequest, RequestKind, ResponseBody, ServerResponse};
use crate::store::Store;
use crate::time::TimeHandler;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QueryHandler {
    store: Store,
    anomalies: Box<dyn AnomalyGenerator>,
    nodes: Vec<Node>,
    time: Arc<dyn TimeHandler>,
    ids: Arc<IdGenerator>,
}

impl QueryHandler {
    pub fn new<A>(nodes: Vec<Node>, anomalies: A, time: Arc<dyn TimeHandler>) -> Self
    where
        A: AnomalyGenerator + 'static,
    {
        QueryHandler::with_boxed(nodes, Box::new(anomalies), time)
    }

    pub fn with_boxed(nodes: Vec<Node>, anomalies: Box<dyn AnomalyGenerator>, time: Arc<dyn TimeHandler>) -> Self {
        QueryHandler {
            store: Store::new(),
            anomalies,
            nodes,
            time,
            ids: Arc::new(IdGenerator::new()),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn time(&self) -> &Arc<dyn TimeHandler> {
        &self.time
    }

    /// Response id sequence of this backend
    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Serve one request. Always returns a response; failures are carried
    /// as exception responses with no client wait.
    pub fn process_query(&mut self, mut request: ClientRequest) -> ServerResponse {
        request.received_at = self.time.now();
        let response_id = self.ids.next_id();

        match self.dispatch(&request, response_id) {
            Ok(response) => {
                debug!(
                    request_id = request.id,
                    response_id,
                    kind = request.kind_name(),
                    wait_ms = response.wait_timeout_ms,
                    "request served"
                );
                response
            }
            Err(err) => {
                warn!(
                    request_id = request.id,
                    kind = request.kind_name(),
                    error = %err,
                    "request failed"
                );
                ServerResponse::new(
                    request.id,
                    response_id,
                    request.sent_by_client_at,
                    ResponseBody::Exception(err),
                )
            }
        }
    }

    fn dispatch(&self, request: &ClientRequest, response_id: u64) -> Result<ServerResponse, SimError> {
        let node = self.resolve_node(request)?;
        let at = request.received_at;

        let body = match &request.kind {
            RequestKind::Insert { key, values, .. } => {
                let key = require_key(key)?;
                check_values(values)?;
                let visibility = self.anomalies.write_visibility(request, &node, &self.nodes)?;
                let version = Version::new(values.clone()).stamped(&node, at, visibility);
                self.store.insert(&node, key, version)?;
                ResponseBody::Insert
            }
            RequestKind::Update { key, values, .. } => {
                let key = require_key(key)?;
                check_values(values)?;
                let visibility = self.anomalies.write_visibility(request, &node, &self.nodes)?;
                let version = Version::new(values.clone()).stamped(&node, at, visibility);
                self.store.update(&node, key, version)?;
                ResponseBody::Update
            }
            RequestKind::Delete { key, .. } => {
                let key = require_key(key)?;
                let visibility = self.anomalies.write_visibility(request, &node, &self.nodes)?;
                self.store.delete(&node, key, visibility, at)?;
                ResponseBody::Delete
            }
            RequestKind::Read { key, fields, .. } => {
                let key = require_key(key)?;
                check_fields(fields.as_ref())?;
                let version = self.store.get(&node, key, fields.as_ref(), at);
                // TigerStyle: a missing record is the NULL sentinel, never an unstamped version
                debug_assert!(
                    version.is_null() || version.written_by().is_some(),
                    "Invariant violated: store returned an unstamped version for '{}'",
                    key
                );
                ResponseBody::Read(version)
            }
            RequestKind::Scan {
                key,
                record_count,
                ascending,
                fields,
                ..
            } => {
                let key = require_key(key)?;
                if *record_count < 1 {
                    return Err(SimError::database("scan record count must be at least 1"));
                }
                check_fields(fields.as_ref())?;
                let records = self
                    .store
                    .get_range(&node, key, *record_count, *ascending, fields.as_ref(), at);
                ResponseBody::Scan(records)
            }
        };

        let mut response = ServerResponse::new(request.id, response_id, request.sent_by_client_at, body);
        self.anomalies
            .handle_response(&mut response, request, &node, &self.nodes)?;
        Ok(response)
    }

    /// Destination node if named, otherwise the node the read preference
    /// points at (the primary for writes)
    fn resolve_node(&self, request: &ClientRequest) -> Result<Node, SimError> {
        if let Some(name) = &request.destination_node {
            return find_node(&self.nodes, name)
                .cloned()
                .ok_or_else(SimError::no_matching_node);
        }

        let first_secondary = || {
            self.nodes
                .iter()
                .filter(|n| !n.is_primary())
                .min_by(|a, b| a.name().cmp(b.name()))
        };

        let node = match request.read_preference().unwrap_or_default() {
            ReadPreference::Primary | ReadPreference::PrimaryPreferred => primary_node(&self.nodes),
            ReadPreference::Secondary => first_secondary(),
            ReadPreference::SecondaryPreferred => first_secondary().or_else(|| primary_node(&self.nodes)),
            ReadPreference::Nearest => self.nodes.iter().min_by_key(|n| {
                (
                    self.anomalies.client_latency(request.client.as_deref(), n),
                    !n.is_primary(),
                    n.name().to_string(),
                )
            }),
        };
        node.cloned().ok_or_else(SimError::no_matching_node)
    }
}

fn require_key(key: &Option<String>) -> Result<&str, SimError> {
    key.as_deref().ok_or_else(SimError::no_key)
}

fn check_values(values: &Columns) -> Result<(), SimError> {
    if values.is_empty() {
        return Err(SimError::no_value());
    }
    if values.keys().any(String::is_empty) {
        return Err(SimError::no_column("write names an empty column"));
    }
    Ok(())
}

fn check_fields(fields: Option<&BTreeSet<String>>) -> Result<(), SimError> {
    match fields {
        Some(set) if set.is_empty() => Err(SimError::no_column("empty field set")),
        Some(set) if set.iter().any(String::is_empty) => Err(SimError::no_column("field set names an empty column")),
        _ => Ok(()),
    }
}
