mod actor;
mod ids;
mod query_handler;

pub use actor::{BackendActor, BackendHandle, BackendMessage};
pub use ids::IdGenerator;
pub use query_handler::QueryHandler;

use crate::protocol::{ClientRequest, ServerResponse};
use std::future::Future;

/// Anything that answers requests asynchronously: a single backend or a
/// sharding router in front of several.
pub trait QueryService: Send + Sync {
    fn process(&self, request: ClientRequest) -> impl Future<Output = ServerResponse> + Send;
}
