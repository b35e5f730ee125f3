//! Hot path benchmarks.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Point reads and range scans walk version histories under the store
//! mutex, so their cost grows with history depth; the full request path
//! adds node resolution and the anomaly model on top.

use anomaly_sim::anomaly::{AnomalyConfig, MongoDbAnomalies};
use anomaly_sim::model::{Columns, Node, StalenessMap, Version};
use anomaly_sim::protocol::ClientRequest;
use anomaly_sim::sharding::{HashKeyStrategy, ShardingStrategy};
use anomaly_sim::store::Store;
use anomaly_sim::time::{ManualTimeHandler, Timestamp};
use anomaly_sim::{QueryHandler, WriteConcern};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;

fn nodes() -> Vec<Node> {
    vec![Node::primary("A"), Node::new("B"), Node::new("C")]
}

fn columns(i: u64) -> Columns {
    (0..4)
        .map(|f| (format!("field{}", f), json!(i * 10 + f)))
        .collect()
}

/// Store with `keys` keys, each carrying `depth` versions 10ms apart
fn populated_store(keys: u64, depth: u64) -> Store {
    let store = Store::new();
    let nodes = nodes();
    let writer = &nodes[0];
    for k in 0..keys {
        let key = format!("user{:06}", k);
        for d in 0..depth {
            let visibility = nodes
                .iter()
                .fold(StalenessMap::new(), |map, n| map.with(n, if n == writer { 0 } else { 500 }));
            let at = Timestamp(d * 10);
            let version = Version::new(columns(d)).stamped(writer, at, visibility);
            if d == 0 {
                let _ = store.insert(writer, &key, version);
            } else {
                let _ = store.update(writer, &key, version);
            }
        }
    }
    store
}

/// Benchmark Store::get across history depths
fn bench_store_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_get");
    group.throughput(Throughput::Elements(1));
    let nodes = nodes();

    for depth in [1, 16, 128] {
        let store = populated_store(1_000, depth);
        let now = Timestamp(depth * 10);

        group.bench_function(format!("own_node_depth_{}", depth), |b| {
            b.iter(|| store.get(black_box(&nodes[0]), black_box("user000500"), None, now))
        });

        // Foreign nodes skip the newest versions before finding a visible one
        group.bench_function(format!("stale_node_depth_{}", depth), |b| {
            b.iter(|| store.get(black_box(&nodes[1]), black_box("user000500"), None, now))
        });
    }

    group.bench_function("miss", |b| {
        let store = populated_store(1_000, 1);
        b.iter(|| store.get(black_box(&nodes[0]), black_box("nobody"), None, Timestamp::ZERO))
    });

    group.finish();
}

/// Benchmark Store::get_range for various scan lengths
fn bench_store_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_scan");
    let store = populated_store(10_000, 4);
    let nodes = nodes();
    let now = Timestamp(1_000);

    for count in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("ascending_{}", count), |b| {
            b.iter(|| store.get_range(&nodes[1], black_box("user005000"), count, true, None, now))
        });
        group.bench_function(format!("descending_{}", count), |b| {
            b.iter(|| store.get_range(&nodes[1], black_box("user005000"), count, false, None, now))
        });
    }

    group.finish();
}

/// Benchmark the full request path through QueryHandler
fn bench_process_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_query");
    group.throughput(Throughput::Elements(1));

    let clock = ManualTimeHandler::new(0);
    let time = Arc::new(clock.clone());
    let config = AnomalyConfig::new(20).with_symmetric_delay("A", "C", 45);
    let mut handler = QueryHandler::new(nodes(), MongoDbAnomalies::new(&config, time.clone()), time);
    for k in 0..1_000u64 {
        handler.process_query(ClientRequest::insert("usertable", format!("user{:06}", k), columns(k)));
    }
    clock.advance_ms(100);

    group.bench_function("read", |b| {
        b.iter(|| handler.process_query(black_box(ClientRequest::read("usertable", "user000500").via("B"))))
    });

    let mut next = 0u64;
    group.bench_function("update_majority", |b| {
        b.iter(|| {
            next += 1;
            let request = ClientRequest::update("usertable", "user000500", columns(next))
                .with_write_concern(WriteConcern::acknowledged(2));
            handler.process_query(black_box(request))
        })
    });

    group.finish();
}

/// Benchmark key hashing for shard selection
fn bench_shard_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard_hash");
    group.throughput(Throughput::Elements(1));
    let strategy = HashKeyStrategy::new();
    let request = ClientRequest::read("usertable", "user000500");

    group.bench_function("target_shard", |b| {
        b.iter(|| strategy.target_shard(black_box(&request), 8))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_store_get,
    bench_store_scan,
    bench_process_query,
    bench_shard_hash,
);
criterion_main!(benches);
