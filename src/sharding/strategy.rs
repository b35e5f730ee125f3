use crate::protocol::ClientRequest;
use ahash::RandomState;
use serde::{Deserialize, Serialize};

// Fixed seeds keep the key -> shard mapping stable across runs and processes
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Maps a request to one of `shard_count` shards
pub trait ShardingStrategy: Send + Sync {
    /// Index in `0..shard_count`; `shard_count` is never zero
    fn target_shard(&self, request: &ClientRequest, shard_count: usize) -> usize;
}

/// Everything goes to shard 0
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstShardStrategy;

impl ShardingStrategy for FirstShardStrategy {
    fn target_shard(&self, _request: &ClientRequest, _shard_count: usize) -> usize {
        0
    }
}

/// Hash of the key, modulo the shard count
#[derive(Clone)]
pub struct HashKeyStrategy {
    hasher: RandomState,
}

impl Default for HashKeyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl HashKeyStrategy {
    pub fn new() -> Self {
        let (k0, k1, k2, k3) = HASH_SEEDS;
        HashKeyStrategy {
            hasher: RandomState::with_seeds(k0, k1, k2, k3),
        }
    }

    pub fn shard_for_key(&self, key: &str, shard_count: usize) -> usize {
        (self.hasher.hash_one(key) as usize) % shard_count
    }
}

impl ShardingStrategy for HashKeyStrategy {
    fn target_shard(&self, request: &ClientRequest, shard_count: usize) -> usize {
        match request.key() {
            Some(key) => self.shard_for_key(key, shard_count),
            None => 0,
        }
    }
}

/// Contiguous key ranges: shard `i` holds keys below `boundaries[i]`, the
/// last shard holds everything from the last boundary up.
#[derive(Debug, Clone, Default)]
pub struct KeyRangeStrategy {
    boundaries: Vec<String>,
}

impl KeyRangeStrategy {
    pub fn new(mut boundaries: Vec<String>) -> Self {
        boundaries.sort();
        boundaries.dedup();
        KeyRangeStrategy { boundaries }
    }
}

impl ShardingStrategy for KeyRangeStrategy {
    fn target_shard(&self, request: &ClientRequest, shard_count: usize) -> usize {
        let Some(key) = request.key() else {
            return 0;
        };
        let idx = self.boundaries.partition_point(|b| b.as_str() <= key);
        idx.min(shard_count - 1)
    }
}

/// Serializable description of a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    First,
    Hash,
    Range { boundaries: Vec<String> },
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn ShardingStrategy> {
        match self {
            StrategyConfig::First => Box::new(FirstShardStrategy),
            StrategyConfig::Hash => Box::new(HashKeyStrategy::new()),
            StrategyConfig::Range { boundaries } => Box::new(KeyRangeStrategy::new(boundaries.clone())),
        }
    }
}
