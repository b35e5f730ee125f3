//! Client stub in front of a [`QueryService`].
//!
//! The stub stamps each request (id, send time, client alias), hands it to
//! the service, then holds the result for the response's `wait_timeout_ms`
//! before returning it. The wait happens on the caller's task, after the
//! service has already moved on to other requests.

use crate::error::SimError;
use crate::handler::{IdGenerator, QueryService};
use crate::model::{Columns, Record, Version, WriteConcern};
use crate::protocol::{ClientRequest, ResponseBody, ServerResponse};
use crate::time::TimeHandler;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct SimClient<S> {
    service: S,
    name: Option<String>,
    ids: IdGenerator,
    time: Arc<dyn TimeHandler>,
    wait: bool,
}

impl<S: QueryService> SimClient<S> {
    pub fn new(service: S, time: Arc<dyn TimeHandler>) -> Self {
        SimClient {
            service,
            name: None,
            ids: IdGenerator::new(),
            time,
            wait: true,
        }
    }

    /// Alias used for client -> node latency lookups
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Return results immediately instead of sleeping for `wait_timeout_ms`.
    /// Useful when time is simulated.
    pub fn without_waiting(mut self) -> Self {
        self.wait = false;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Send a fully built request. Exception responses come back as `Err`
    /// with the original kind and message.
    pub async fn send(&self, mut request: ClientRequest) -> Result<ServerResponse, SimError> {
        request.id = self.ids.next_id();
        request.sent_by_client_at = self.time.now();
        if request.client.is_none() {
            request.client = self.name.clone();
        }
        let request_id = request.id;

        let response = self.service.process(request).await;
        debug_assert_eq!(
            response.client_request_id, request_id,
            "response does not answer request {}",
            request_id
        );

        if response.wait_timeout_ms > 0 {
            debug!(request_id, wait_ms = response.wait_timeout_ms, "holding response");
            if self.wait {
                tokio::time::sleep(Duration::from_millis(response.wait_timeout_ms)).await;
            }
        }

        match response.body {
            ResponseBody::Exception(err) => Err(err),
            _ => Ok(response),
        }
    }

    pub async fn insert(&self, table: &str, key: &str, values: Columns) -> Result<ServerResponse, SimError> {
        self.send(ClientRequest::insert(table, key, values)).await
    }

    pub async fn insert_with(
        &self,
        table: &str,
        key: &str,
        values: Columns,
        concern: WriteConcern,
    ) -> Result<ServerResponse, SimError> {
        self.send(ClientRequest::insert(table, key, values).with_write_concern(concern))
            .await
    }

    pub async fn update(&self, table: &str, key: &str, values: Columns) -> Result<ServerResponse, SimError> {
        self.send(ClientRequest::update(table, key, values)).await
    }

    pub async fn delete(&self, table: &str, key: &str) -> Result<ServerResponse, SimError> {
        self.send(ClientRequest::delete(table, key)).await
    }

    /// Visible version of `key`; the NULL sentinel when nothing is visible
    pub async fn read(&self, table: &str, key: &str) -> Result<Version, SimError> {
        let response = self.send(ClientRequest::read(table, key)).await?;
        match response.body {
            ResponseBody::Read(version) => Ok(version),
            other => Err(unexpected("read", &other)),
        }
    }

    pub async fn scan(&self, table: &str, start_key: &str, record_count: usize) -> Result<Vec<Record>, SimError> {
        self.scan_request(ClientRequest::scan(table, start_key, record_count))
            .await
    }

    /// Run a scan built by the caller (destination node, direction, fields)
    pub async fn scan_request(&self, request: ClientRequest) -> Result<Vec<Record>, SimError> {
        let response = self.send(request).await?;
        match response.body {
            ResponseBody::Scan(records) => Ok(records),
            other => Err(unexpected("scan", &other)),
        }
    }

    pub async fn read_request(&self, request: ClientRequest) -> Result<Version, SimError> {
        let response = self.send(request).await?;
        match response.body {
            ResponseBody::Read(version) => Ok(version),
            other => Err(unexpected("read", &other)),
        }
    }
}

fn unexpected(expected: &str, body: &ResponseBody) -> SimError {
    SimError::database(format!("expected {} response, got {:?}", expected, body))
}
