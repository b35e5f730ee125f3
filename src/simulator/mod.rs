//! Seeded workloads and deterministic simulation testing

pub mod dst;
mod rng;

pub use dst::{run_query_batch, summarize_query_batch, QueryDSTConfig, QueryDSTHarness, QueryDSTResult, QueryOp};
pub use rng::DeterministicRng;
