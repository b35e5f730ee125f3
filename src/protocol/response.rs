use crate::error::SimError;
use crate::model::{Record, Version};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// Payload of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ResponseBody {
    Insert,
    Update,
    Delete,
    /// The visible version, or the NULL sentinel
    Read(Version),
    /// Visible records in scan order
    Scan(Vec<Record>),
    /// Failure, carried as kind + message
    Exception(SimError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub client_request_id: u64,
    pub response_id: u64,
    /// Echo of the request's send time, for round-trip measurement
    pub sent_by_client_at: Timestamp,
    /// Extra time (ms) the client should wait before handing the result on
    pub wait_timeout_ms: u64,
    pub body: ResponseBody,
}

impl ServerResponse {
    pub fn new(client_request_id: u64, response_id: u64, sent_by_client_at: Timestamp, body: ResponseBody) -> Self {
        ServerResponse {
            client_request_id,
            response_id,
            sent_by_client_at,
            wait_timeout_ms: 0,
            body,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.body, ResponseBody::Exception(_))
    }

    pub fn error(&self) -> Option<&SimError> {
        match &self.body {
            ResponseBody::Exception(err) => Some(err),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<&Version> {
        match &self.body {
            ResponseBody::Read(version) => Some(version),
            _ => None,
        }
    }

    pub fn records(&self) -> Option<&[Record]> {
        match &self.body {
            ResponseBody::Scan(records) => Some(records),
            _ => None,
        }
    }

    /// Turn an exception response back into the error it carries
    pub fn into_result(self) -> Result<ResponseBody, SimError> {
        match self.body {
            ResponseBody::Exception(err) => Err(err),
            body => Ok(body),
        }
    }
}
