pub mod router;
pub mod strategy;

pub use router::ShardingRouter;
pub use strategy::{FirstShardStrategy, HashKeyStrategy, KeyRangeStrategy, ShardingStrategy, StrategyConfig};
