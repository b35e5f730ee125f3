//! Single serializing worker per backend.
//!
//! The actor owns its [`QueryHandler`] outright and drains requests from an
//! unbounded channel in arrival order, so every backend sees one total order
//! of requests without locks around the handler. Handles are cheap to clone
//! and may be used from any number of connection tasks.

use super::{IdGenerator, QueryHandler, QueryService};
use crate::error::{ErrorKind, SimError};
use crate::protocol::{ClientRequest, ResponseBody, ServerResponse};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

#[derive(Debug)]
pub enum BackendMessage {
    Query {
        request: ClientRequest,
        response_tx: oneshot::Sender<ServerResponse>,
    },
    Clear {
        response_tx: oneshot::Sender<()>,
    },
}

pub struct BackendActor {
    handler: QueryHandler,
    rx: mpsc::UnboundedReceiver<BackendMessage>,
    backend_id: usize,
}

impl BackendActor {
    fn new(handler: QueryHandler, rx: mpsc::UnboundedReceiver<BackendMessage>, backend_id: usize) -> Self {
        BackendActor { handler, rx, backend_id }
    }

    async fn run(mut self) {
        info!(backend = self.backend_id, nodes = self.handler.nodes().len(), "backend started");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                BackendMessage::Query { request, response_tx } => {
                    let response = self.handler.process_query(request);
                    let _ = response_tx.send(response);
                }
                BackendMessage::Clear { response_tx } => {
                    self.handler.clear();
                    let _ = response_tx.send(());
                }
            }
        }
        info!(backend = self.backend_id, "backend stopped");
    }
}

#[derive(Clone)]
pub struct BackendHandle {
    tx: mpsc::UnboundedSender<BackendMessage>,
    backend_id: usize,
    node_names: Arc<[String]>,
    ids: Arc<IdGenerator>,
}

impl BackendHandle {
    /// Spawn the actor for `handler` on the current tokio runtime
    pub fn spawn(handler: QueryHandler, backend_id: usize) -> Self {
        let node_names: Arc<[String]> = handler
            .nodes()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        let ids = handler.ids().clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = BackendActor::new(handler, rx, backend_id);
        tokio::spawn(actor.run());
        BackendHandle {
            tx,
            backend_id,
            node_names,
            ids,
        }
    }

    pub fn backend_id(&self) -> usize {
        self.backend_id
    }

    pub fn node_names(&self) -> &[String] {
        &self.node_names
    }

    pub fn owns_node(&self, name: &str) -> bool {
        self.node_names.iter().any(|n| n == name)
    }

    pub async fn process_query(&self, request: ClientRequest) -> ServerResponse {
        let request_id = request.id;
        let sent_at = request.sent_by_client_at;
        let (response_tx, response_rx) = oneshot::channel();
        let msg = BackendMessage::Query { request, response_tx };

        if self.tx.send(msg).is_err() {
            warn!(backend = self.backend_id, "backend channel closed");
            return self.unavailable(request_id, sent_at);
        }

        response_rx.await.unwrap_or_else(|_| {
            warn!(backend = self.backend_id, "backend dropped response");
            self.unavailable(request_id, sent_at)
        })
    }

    pub async fn clear(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.tx.send(BackendMessage::Clear { response_tx }).is_err() {
            return;
        }
        let _ = response_rx.await;
    }

    fn unavailable(&self, request_id: u64, sent_at: crate::time::Timestamp) -> ServerResponse {
        ServerResponse::new(
            request_id,
            self.ids.next_id(),
            sent_at,
            ResponseBody::Exception(SimError::new(
                ErrorKind::ShardUnavailable,
                format!("backend {} unavailable", self.backend_id),
            )),
        )
    }
}

impl QueryService for BackendHandle {
    fn process(&self, request: ClientRequest) -> impl Future<Output = ServerResponse> + Send {
        self.process_query(request)
    }
}
