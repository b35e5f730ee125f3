use serde::{Deserialize, Serialize};

/// Acknowledgment policy of a single write
///
/// `tag_set` and `ack_count` are alternative strategies: when a tag set is
/// named, the per-tag counts configured for it replace the flat count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConcern {
    pub ack_count: u32,
    pub tag_set: Option<String>,
    pub journaling: bool,
    /// 0 means no timeout
    pub timeout_ms: u64,
}

impl Default for WriteConcern {
    fn default() -> Self {
        WriteConcern {
            ack_count: 1,
            tag_set: None,
            journaling: false,
            timeout_ms: 0,
        }
    }
}

impl WriteConcern {
    pub fn acknowledged(ack_count: u32) -> Self {
        WriteConcern {
            ack_count,
            ..Default::default()
        }
    }

    pub fn tagged(tag_set: impl Into<String>) -> Self {
        WriteConcern {
            tag_set: Some(tag_set.into()),
            ..Default::default()
        }
    }

    pub fn journaled() -> Self {
        WriteConcern {
            journaling: true,
            ..Default::default()
        }
    }

    pub fn with_journaling(mut self, journaling: bool) -> Self {
        self.journaling = journaling;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Which class of node should serve a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}
