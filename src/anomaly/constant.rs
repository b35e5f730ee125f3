use super::{ComposedAnomalies, NoClientDelay, StalenessGenerator};
use crate::error::SimError;
use crate::model::{Node, StalenessMap};
use crate::protocol::ClientRequest;

/// Fixed staleness: the receiving node sees a write after `own_delay_ms`,
/// every other node after `foreign_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantStaleness {
    pub foreign_delay_ms: u64,
    pub own_delay_ms: u64,
}

impl ConstantStaleness {
    pub fn new(foreign_delay_ms: u64, own_delay_ms: u64) -> Self {
        ConstantStaleness {
            foreign_delay_ms,
            own_delay_ms,
        }
    }

    /// Paired with a model that reports no client delay
    pub fn without_client_delay(self) -> ComposedAnomalies<ConstantStaleness, NoClientDelay> {
        ComposedAnomalies::new(self, NoClientDelay)
    }
}

impl StalenessGenerator for ConstantStaleness {
    fn write_visibility(
        &self,
        _request: &ClientRequest,
        received_by: &Node,
        nodes: &[Node],
    ) -> Result<StalenessMap, SimError> {
        let mut map = StalenessMap::new();
        for node in nodes {
            let delay = if node == received_by {
                self.own_delay_ms
            } else {
                self.foreign_delay_ms
            };
            map.insert(node, delay);
        }
        Ok(map)
    }
}
