//! Client requests as the backend receives them.
//!
//! The request kind is a closed tagged union; dispatch is a `match`. Only the
//! JSON decoding entry point can meet a kind it does not know, and it reports
//! that as [`ErrorKind::UnknownMessageType`](crate::error::ErrorKind).

use crate::error::{ErrorKind, SimError};
use crate::model::{Columns, ReadPreference, WriteConcern};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const KNOWN_KINDS: [&str; 5] = ["insert", "update", "delete", "read", "scan"];

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    Insert {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        values: Columns,
        #[serde(default)]
        write_concern: WriteConcern,
    },
    Update {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        values: Columns,
        #[serde(default)]
        write_concern: WriteConcern,
    },
    Delete {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        write_concern: WriteConcern,
    },
    Read {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        fields: Option<BTreeSet<String>>,
        #[serde(default)]
        read_preference: ReadPreference,
    },
    Scan {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        record_count: usize,
        #[serde(default = "default_ascending")]
        ascending: bool,
        #[serde(default)]
        fields: Option<BTreeSet<String>>,
        #[serde(default)]
        read_preference: ReadPreference,
    },
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::Insert { .. } => "insert",
            RequestKind::Update { .. } => "update",
            RequestKind::Delete { .. } => "delete",
            RequestKind::Read { .. } => "read",
            RequestKind::Scan { .. } => "scan",
        }
    }
}

/// A decoded request plus the stamps added on arrival
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub table: String,
    /// Alias of the issuing client, used for client latency lookups
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub destination_node: Option<String>,
    #[serde(default)]
    pub sent_by_client_at: Timestamp,
    #[serde(default)]
    pub received_at: Timestamp,
    #[serde(flatten)]
    pub kind: RequestKind,
}

impl ClientRequest {
    pub fn new(table: impl Into<String>, kind: RequestKind) -> Self {
        ClientRequest {
            id: 0,
            table: table.into(),
            client: None,
            destination_node: None,
            sent_by_client_at: Timestamp::ZERO,
            received_at: Timestamp::ZERO,
            kind,
        }
    }

    pub fn insert(table: impl Into<String>, key: impl Into<String>, values: Columns) -> Self {
        ClientRequest::new(
            table,
            RequestKind::Insert {
                key: Some(key.into()),
                values,
                write_concern: WriteConcern::default(),
            },
        )
    }

    pub fn update(table: impl Into<String>, key: impl Into<String>, values: Columns) -> Self {
        ClientRequest::new(
            table,
            RequestKind::Update {
                key: Some(key.into()),
                values,
                write_concern: WriteConcern::default(),
            },
        )
    }

    pub fn delete(table: impl Into<String>, key: impl Into<String>) -> Self {
        ClientRequest::new(
            table,
            RequestKind::Delete {
                key: Some(key.into()),
                write_concern: WriteConcern::default(),
            },
        )
    }

    pub fn read(table: impl Into<String>, key: impl Into<String>) -> Self {
        ClientRequest::new(
            table,
            RequestKind::Read {
                key: Some(key.into()),
                fields: None,
                read_preference: ReadPreference::default(),
            },
        )
    }

    pub fn scan(table: impl Into<String>, start_key: impl Into<String>, record_count: usize) -> Self {
        ClientRequest::new(
            table,
            RequestKind::Scan {
                key: Some(start_key.into()),
                record_count,
                ascending: true,
                fields: None,
                read_preference: ReadPreference::default(),
            },
        )
    }

    /// Decode a request object. An absent or unrecognised `kind` is an
    /// unknown message type; any other shape problem is a database error.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let raw: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| SimError::database(format!("malformed request: {}", e)))?;

        let kind = raw.get("kind").and_then(|k| k.as_str());
        match kind {
            Some(k) if KNOWN_KINDS.contains(&k) => {}
            Some(k) => {
                return Err(SimError::new(
                    ErrorKind::UnknownMessageType,
                    format!("unknown request kind '{}'", k),
                ))
            }
            None => {
                return Err(SimError::new(
                    ErrorKind::UnknownMessageType,
                    "request has no kind",
                ))
            }
        }

        serde_json::from_value(raw).map_err(|e| SimError::database(format!("malformed request: {}", e)))
    }

    pub fn via(mut self, node: impl Into<String>) -> Self {
        self.destination_node = Some(node.into());
        self
    }

    pub fn from_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Replace the write concern; no effect on reads and scans
    pub fn with_write_concern(mut self, concern: WriteConcern) -> Self {
        match &mut self.kind {
            RequestKind::Insert { write_concern, .. }
            | RequestKind::Update { write_concern, .. }
            | RequestKind::Delete { write_concern, .. } => *write_concern = concern,
            RequestKind::Read { .. } | RequestKind::Scan { .. } => {}
        }
        self
    }

    /// Restrict returned columns; no effect on writes
    pub fn with_fields<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let wanted: BTreeSet<String> = columns.into_iter().map(Into::into).collect();
        match &mut self.kind {
            RequestKind::Read { fields, .. } | RequestKind::Scan { fields, .. } => *fields = Some(wanted),
            _ => {}
        }
        self
    }

    /// Set the read preference; no effect on writes
    pub fn with_read_preference(mut self, preference: ReadPreference) -> Self {
        match &mut self.kind {
            RequestKind::Read { read_preference, .. } | RequestKind::Scan { read_preference, .. } => {
                *read_preference = preference
            }
            _ => {}
        }
        self
    }

    /// Scan direction; no effect on other kinds
    pub fn descending(mut self) -> Self {
        if let RequestKind::Scan { ascending, .. } = &mut self.kind {
            *ascending = false;
        }
        self
    }

    pub fn key(&self) -> Option<&str> {
        match &self.kind {
            RequestKind::Insert { key, .. }
            | RequestKind::Update { key, .. }
            | RequestKind::Delete { key, .. }
            | RequestKind::Read { key, .. }
            | RequestKind::Scan { key, .. } => key.as_deref(),
        }
    }

    pub fn write_concern(&self) -> Option<&WriteConcern> {
        match &self.kind {
            RequestKind::Insert { write_concern, .. }
            | RequestKind::Update { write_concern, .. }
            | RequestKind::Delete { write_concern, .. } => Some(write_concern),
            RequestKind::Read { .. } | RequestKind::Scan { .. } => None,
        }
    }

    pub fn read_preference(&self) -> Option<ReadPreference> {
        match &self.kind {
            RequestKind::Read { read_preference, .. } | RequestKind::Scan { read_preference, .. } => {
                Some(*read_preference)
            }
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        self.write_concern().is_some()
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_scan_defaults() {
        let req = ClientRequest::from_json(
            r#"{"id": 7, "table": "usertable", "kind": "scan", "key": "adele", "record_count": 3}"#,
        )
        .unwrap();

        assert_eq!(req.id, 7);
        assert_eq!(req.key(), Some("adele"));
        match req.kind {
            RequestKind::Scan { record_count, ascending, fields, read_preference, .. } => {
                assert_eq!(record_count, 3);
                assert!(ascending);
                assert!(fields.is_none());
                assert_eq!(read_preference, ReadPreference::Primary);
            }
            other => panic!("expected scan, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_insert_with_concern() {
        let req = ClientRequest::from_json(
            r#"{"table": "t", "kind": "insert", "key": "k", "destination_node": "n2",
                "values": {"name": "bob"},
                "write_concern": {"ack_count": 2, "journaling": true}}"#,
        )
        .unwrap();

        assert_eq!(req.destination_node.as_deref(), Some("n2"));
        let concern = req.write_concern().unwrap();
        assert_eq!(concern.ack_count, 2);
        assert!(concern.journaling);
        assert_eq!(concern.tag_set, None);
    }

    #[test]
    fn test_from_json_unknown_kind() {
        let err = ClientRequest::from_json(r#"{"table": "t", "kind": "truncate"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownMessageType);

        let err = ClientRequest::from_json(r#"{"table": "t"}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownMessageType);

        let err = ClientRequest::from_json("not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Database);
    }

    #[test]
    fn test_builders_only_touch_matching_kinds() {
        let read = ClientRequest::read("t", "k")
            .with_write_concern(WriteConcern::acknowledged(3))
            .with_fields(["name"]);
        assert!(read.write_concern().is_none());
        assert!(!read.is_write());

        let insert = ClientRequest::insert("t", "k", Columns::new())
            .with_write_concern(WriteConcern::acknowledged(3))
            .with_read_preference(ReadPreference::Secondary);
        assert_eq!(insert.write_concern().map(|c| c.ack_count), Some(3));
        assert_eq!(insert.read_preference(), None);
    }
}
