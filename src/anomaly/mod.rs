//! Anomaly models.
//!
//! An anomaly model answers two questions for the query handler:
//!
//! - **Staleness**: after how many milliseconds each node observes a write
//!   ([`StalenessGenerator`], called once per write, before the store)
//! - **Client delay**: how long the client should believe the request took
//!   ([`ClientDelayGenerator`], called once per request, after the store)
//!
//! [`AnomalyGenerator`] is the seam the handler holds. [`MongoDbAnomalies`]
//! implements both halves itself; [`ComposedAnomalies`] pairs any two
//! independent halves.

pub mod config;
pub mod constant;
pub mod delays;
pub mod mongodb;

pub use config::{AnomalyConfig, ClientDelayEdge, DelayEdge};
pub use constant::ConstantStaleness;
pub use delays::DelayGraph;
pub use mongodb::MongoDbAnomalies;

use crate::error::SimError;
use crate::model::{Node, StalenessMap};
use crate::protocol::{ClientRequest, ServerResponse};

pub trait StalenessGenerator: Send + Sync {
    /// Visibility delays for a write received by `received_by`
    fn write_visibility(
        &self,
        request: &ClientRequest,
        received_by: &Node,
        nodes: &[Node],
    ) -> Result<StalenessMap, SimError>;
}

pub trait ClientDelayGenerator: Send + Sync {
    /// Set `response.wait_timeout_ms` for a request served by `served_by`
    fn handle_response(
        &self,
        response: &mut ServerResponse,
        request: &ClientRequest,
        served_by: &Node,
        nodes: &[Node],
    ) -> Result<(), SimError>;
}

pub trait AnomalyGenerator: StalenessGenerator + ClientDelayGenerator {
    /// Latency between a client and a node, used to pick the nearest node
    fn client_latency(&self, _client: Option<&str>, _node: &Node) -> u64 {
        0
    }
}

/// Reports no client-perceived delay at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClientDelay;

impl ClientDelayGenerator for NoClientDelay {
    fn handle_response(
        &self,
        response: &mut ServerResponse,
        _request: &ClientRequest,
        _served_by: &Node,
        _nodes: &[Node],
    ) -> Result<(), SimError> {
        response.wait_timeout_ms = 0;
        Ok(())
    }
}

/// A staleness half and a client delay half from different models
pub struct ComposedAnomalies<S, C> {
    staleness: S,
    client_delay: C,
}

impl<S, C> ComposedAnomalies<S, C>
where
    S: StalenessGenerator,
    C: ClientDelayGenerator,
{
    pub fn new(staleness: S, client_delay: C) -> Self {
        ComposedAnomalies {
            staleness,
            client_delay,
        }
    }
}

impl<S: StalenessGenerator, C: ClientDelayGenerator> StalenessGenerator for ComposedAnomalies<S, C> {
    fn write_visibility(
        &self,
        request: &ClientRequest,
        received_by: &Node,
        nodes: &[Node],
    ) -> Result<StalenessMap, SimError> {
        self.staleness.write_visibility(request, received_by, nodes)
    }
}

impl<S: StalenessGenerator, C: ClientDelayGenerator> ClientDelayGenerator for ComposedAnomalies<S, C> {
    fn handle_response(
        &self,
        response: &mut ServerResponse,
        request: &ClientRequest,
        served_by: &Node,
        nodes: &[Node],
    ) -> Result<(), SimError> {
        self.client_delay.handle_response(response, request, served_by, nodes)
    }
}

impl<S: StalenessGenerator, C: ClientDelayGenerator> AnomalyGenerator for ComposedAnomalies<S, C> {}
