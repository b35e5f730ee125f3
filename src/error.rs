//! Error kinds shared by the store, the anomaly models and the handler.
//!
//! A failure crosses the request boundary as a closed [`ErrorKind`] plus a
//! message. Nothing else survives the trip; the client side rebuilds a
//! [`SimError`] of the same kind from those two fields.

use serde::{Deserialize, Serialize};

/// Every failure a request can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Request carried no key
    NoKeyProvided,
    /// A column name (or a requested field set) was empty
    NoColumnProvided,
    /// Insert/update carried no values
    NoValueProvided,
    /// Insert into a key that is already visible to the writing node
    Insert,
    /// Update of a key that is not visible to the writing node
    Update,
    /// Delete of a key that is not visible to the writing node
    Delete,
    /// Request object of a kind the backend does not know
    UnknownMessageType,
    /// Generic backend failure (unresolved node, unsatisfiable concern, ...)
    Database,
    /// Write rejected by a read-only replica
    WriteForbidden,
    /// Write concern named a tag set that is not configured
    UnknownTagSet,
    /// Shard worker is gone
    ShardUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoKeyProvided => "no key provided",
            ErrorKind::NoColumnProvided => "no column provided",
            ErrorKind::NoValueProvided => "no value provided",
            ErrorKind::Insert => "insert failed",
            ErrorKind::Update => "update failed",
            ErrorKind::Delete => "delete failed",
            ErrorKind::UnknownMessageType => "unknown message type",
            ErrorKind::Database => "database error",
            ErrorKind::WriteForbidden => "write forbidden",
            ErrorKind::UnknownTagSet => "unknown tag set",
            ErrorKind::ShardUnavailable => "shard unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error carried through the simulator and back to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SimError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        SimError {
            kind,
            message: message.into(),
        }
    }

    pub fn no_key() -> Self {
        SimError::new(ErrorKind::NoKeyProvided, "request has no key")
    }

    pub fn no_column(message: impl Into<String>) -> Self {
        SimError::new(ErrorKind::NoColumnProvided, message)
    }

    pub fn no_value() -> Self {
        SimError::new(ErrorKind::NoValueProvided, "write has no values")
    }

    pub fn insert(key: &str) -> Self {
        SimError::new(ErrorKind::Insert, format!("key '{}' already exists", key))
    }

    pub fn update(key: &str) -> Self {
        SimError::new(ErrorKind::Update, format!("key '{}' does not exist", key))
    }

    pub fn delete(key: &str) -> Self {
        SimError::new(ErrorKind::Delete, format!("key '{}' does not exist", key))
    }

    pub fn database(message: impl Into<String>) -> Self {
        SimError::new(ErrorKind::Database, message)
    }

    pub fn no_matching_node() -> Self {
        SimError::database("no matching node")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SimError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = SimError::insert("adele");
        assert_eq!(err.to_string(), "insert failed: key 'adele' already exists");
        assert_eq!(err.kind(), ErrorKind::Insert);
    }

    #[test]
    fn test_unresolved_node_is_database_error() {
        let err = SimError::no_matching_node();
        assert_eq!(err.kind, ErrorKind::Database);
        assert_eq!(err.message, "no matching node");
    }
}
