//! Consistency-anomaly simulator.
//!
//! A multi-version key/value backend where every write carries its own
//! per-node visibility time, so reads served by different replicas observe
//! the staleness a replicated database would show. Replication delays and
//! client waits follow a MongoDB-like model of write concerns, tag sets and
//! journal commits.

pub mod anomaly;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod model;
pub mod protocol;
pub mod sharding;
pub mod simulator;
pub mod store;
pub mod time;

pub use anomaly::{AnomalyConfig, AnomalyGenerator, ConstantStaleness, MongoDbAnomalies};
pub use client::SimClient;
pub use config::{ClusterConfig, ConfigError, NodeConfig, SimulatorConfig};
pub use error::{ErrorKind, SimError};
pub use handler::{BackendHandle, QueryHandler, QueryService};
pub use model::{Node, ReadPreference, Version, WriteConcern};
pub use protocol::{ClientRequest, ServerResponse};
pub use sharding::ShardingRouter;
pub use store::Store;
pub use time::{ManualTimeHandler, SystemTimeHandler, TimeHandler};
