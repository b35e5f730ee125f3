//! Anomaly simulator demo
//!
//! Builds the configured clusters behind a sharding router and runs a short
//! seeded workload through the client stub, logging what each request saw
//! and how long the client was held.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | ANOMALY_SIM_CONFIG | - | TOML config path (built-in 3-node cluster if unset) |
//! | ANOMALY_SIM_SEED | 42 | Workload seed |
//! | ANOMALY_SIM_OPS | 40 | Number of workload operations |
//! | ANOMALY_SIM_LOG_FORMAT | text | `text` or `json` |
//! | RUST_LOG | info | Log filter |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use anomaly_sim::config::SimulatorConfig;
use anomaly_sim::model::{Columns, ReadPreference, WriteConcern};
use anomaly_sim::protocol::ClientRequest;
use anomaly_sim::simulator::DeterministicRng;
use anomaly_sim::time::{SystemTimeHandler, TimeHandler};
use anomaly_sim::SimClient;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TABLE: &str = "usertable";
const DEFAULT_SEED: u64 = 42;
const DEFAULT_OPS: usize = 40;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ANOMALY_SIM_LOG_FORMAT").is_ok_and(|f| f == "json");
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = match std::env::var("ANOMALY_SIM_CONFIG") {
        Ok(path) => SimulatorConfig::from_file(path)?,
        Err(_) => SimulatorConfig::default(),
    };
    let seed = env_or("ANOMALY_SIM_SEED", DEFAULT_SEED);
    let ops = env_or("ANOMALY_SIM_OPS", DEFAULT_OPS);

    let time: Arc<dyn TimeHandler> = Arc::new(SystemTimeHandler::new());
    let router = config.build_router(time.clone());
    let nodes: Vec<String> = router
        .shards()
        .iter()
        .flat_map(|shard| shard.node_names().iter().cloned())
        .collect();
    let client = SimClient::new(router, time).with_name("demo");

    info!(seed, ops, nodes = nodes.len(), "starting workload");
    let mut rng = DeterministicRng::new(seed);
    let mut written: Vec<String> = Vec::new();
    let mut stale_reads = 0u64;
    let mut total_wait_ms = 0u64;

    for i in 0..ops {
        let roll = rng.gen_range(0, 100);
        if written.is_empty() || roll < 35 {
            let key = format!("user{:04}", i);
            let values = Columns::from([("field0".to_string(), json!(rng.gen_range(0, 1_000)))]);
            let acks = rng.gen_range(1, 4) as u32;
            let concern = WriteConcern::acknowledged(acks).with_journaling(rng.gen_bool(0.3));
            match client.send(ClientRequest::insert(TABLE, key.clone(), values).with_write_concern(concern)).await {
                Ok(response) => {
                    total_wait_ms += response.wait_timeout_ms;
                    info!(key = %key, acks, wait_ms = response.wait_timeout_ms, "insert");
                    written.push(key);
                }
                Err(err) => warn!(key = %key, error = %err, "insert failed"),
            }
        } else if roll < 55 {
            let Some(key) = rng.pick(&written).cloned() else { continue };
            let values = Columns::from([("field1".to_string(), json!(rng.gen_range(0, 1_000)))]);
            match client.update(TABLE, &key, values).await {
                Ok(response) => {
                    total_wait_ms += response.wait_timeout_ms;
                    info!(key = %key, wait_ms = response.wait_timeout_ms, "update");
                }
                Err(err) => warn!(key = %key, error = %err, "update failed"),
            }
        } else if roll < 90 {
            let Some(key) = rng.pick(&written).cloned() else { continue };
            let request = match rng.pick(&nodes) {
                Some(node) if rng.gen_bool(0.7) => ClientRequest::read(TABLE, key.clone()).via(node.clone()),
                _ => ClientRequest::read(TABLE, key.clone()).with_read_preference(ReadPreference::Nearest),
            };
            let node = request.destination_node.clone().unwrap_or_else(|| "nearest".to_string());
            match client.read_request(request).await {
                Ok(version) if version.is_null() => {
                    stale_reads += 1;
                    info!(key = %key, node = %node, "read saw nothing yet");
                }
                Ok(version) => info!(key = %key, node = %node, values = ?version.values(), "read"),
                Err(err) => warn!(key = %key, error = %err, "read failed"),
            }
        } else {
            let Some(key) = rng.pick(&written).cloned() else { continue };
            let count = rng.gen_range(1, 6) as usize;
            match client.scan(TABLE, &key, count).await {
                Ok(records) => info!(from = %key, count, returned = records.len(), "scan"),
                Err(err) => warn!(from = %key, error = %err, "scan failed"),
            }
        }
    }

    info!(
        ops,
        keys = written.len(),
        stale_reads,
        total_wait_ms,
        "workload finished"
    );
    Ok(())
}
