//! Sharding router tests
//!
//! Independent backends behind one router: destination-node routing,
//! per-table strategies, and clusters built from a TOML file.

use anomaly_sim::anomaly::ConstantStaleness;
use anomaly_sim::model::{Columns, Node};
use anomaly_sim::protocol::ClientRequest;
use anomaly_sim::sharding::HashKeyStrategy;
use anomaly_sim::time::ManualTimeHandler;
use anomaly_sim::{BackendHandle, ErrorKind, QueryHandler, ShardingRouter, SimClient, SimulatorConfig};
use serde_json::json;
use std::sync::Arc;

fn values(n: u64) -> Columns {
    Columns::from([("field0".to_string(), json!(n))])
}

fn two_shards(clock: &ManualTimeHandler) -> Vec<BackendHandle> {
    [["s0a", "s0b"], ["s1a", "s1b"]]
        .iter()
        .enumerate()
        .map(|(id, names)| {
            let handler = QueryHandler::new(
                vec![Node::primary(names[0]), Node::new(names[1])],
                ConstantStaleness::new(0, 0).without_client_delay(),
                Arc::new(clock.clone()),
            );
            BackendHandle::spawn(handler, id)
        })
        .collect()
}

#[tokio::test]
async fn test_destination_node_picks_owning_shard() {
    let clock = ManualTimeHandler::new(0);
    let router = ShardingRouter::new(two_shards(&clock));

    let response = router
        .process_query(ClientRequest::insert("users", "k", values(1)).via("s1b"))
        .await;
    assert!(!response.is_exception());

    let on_shard1 = router.process_query(ClientRequest::read("users", "k").via("s1a")).await;
    assert!(on_shard1.version().is_some_and(|v| !v.is_null()));

    // No strategy for "users": point reads default to shard 0
    let default_shard = router.process_query(ClientRequest::read("users", "k")).await;
    assert!(default_shard.version().is_some_and(|v| v.is_null()));

    let unknown = router.process_query(ClientRequest::read("users", "k").via("nowhere")).await;
    let err = unknown.error().cloned().unwrap();
    assert_eq!(err.kind, ErrorKind::Database);
    assert_eq!(err.message, "no matching node");
}

#[tokio::test]
async fn test_hash_strategy_spreads_and_finds_keys() {
    let clock = ManualTimeHandler::new(0);
    let router = ShardingRouter::new(two_shards(&clock)).with_strategy("users", HashKeyStrategy::new());
    let client = SimClient::new(router, Arc::new(clock.clone())).without_waiting();

    for i in 0..40 {
        client.insert("users", &format!("user{:02}", i), values(i)).await.unwrap();
    }

    let mut per_shard = [0usize; 2];
    for i in 0..40 {
        let key = format!("user{:02}", i);
        let version = client.read("users", &key).await.unwrap();
        assert_eq!(version.get("field0"), Some(&json!(i)));

        for (shard, node) in ["s0a", "s1a"].iter().enumerate() {
            let seen = client
                .read_request(ClientRequest::read("users", key.clone()).via(*node))
                .await
                .unwrap();
            if !seen.is_null() {
                per_shard[shard] += 1;
            }
        }
    }
    assert_eq!(per_shard[0] + per_shard[1], 40, "each key lives on exactly one shard");
    assert!(per_shard[0] > 0 && per_shard[1] > 0);

    let all = client.scan("users", "user00", 100).await.unwrap();
    assert_eq!(all.len(), 40);
    assert!(all.windows(2).all(|w| w[0].key < w[1].key));
}

#[tokio::test]
async fn test_scan_error_from_any_shard_fails_the_scan() {
    let clock = ManualTimeHandler::new(0);
    let router = ShardingRouter::new(two_shards(&clock));
    let response = router
        .process_query(ClientRequest::scan("users", "a", 5).with_fields([""]))
        .await;
    assert_eq!(response.error().map(|e| e.kind), Some(ErrorKind::NoColumnProvided));
}

#[tokio::test]
async fn test_router_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cluster.toml");
    std::fs::write(
        &path,
        r#"
        [[shards]]
        nodes = [{ name = "east1", primary = true }, { name = "east2" }]
        [shards.anomaly]
        default_delay_ms = 40

        [[shards]]
        nodes = [{ name = "west1" }, { name = "west2" }]

        [sharding.orders]
        type = "range"
        boundaries = ["m"]
        "#,
    )
    .unwrap();

    let config = SimulatorConfig::from_file(&path).unwrap();
    let clock = ManualTimeHandler::new(0);
    let router = config.build_router(Arc::new(clock.clone()));
    assert_eq!(router.shards().len(), 2);
    assert!(router.shards()[1].owns_node("west2"));

    let client = SimClient::new(router, Arc::new(clock.clone())).without_waiting();
    let write = client
        .insert_with("orders", "apple", values(1), anomaly_sim::WriteConcern::acknowledged(2))
        .await
        .unwrap();
    assert_eq!(write.wait_timeout_ms, 80);

    client.insert("orders", "zebra", values(2)).await.unwrap();
    let on_west = client
        .read_request(ClientRequest::read("orders", "zebra").via("west1"))
        .await
        .unwrap();
    assert!(!on_west.is_null(), "west1 is the implicit primary of shard 1");
}

#[tokio::test]
async fn test_response_ids_increase_across_shards() {
    let clock = ManualTimeHandler::new(0);
    let router = ShardingRouter::new(two_shards(&clock));

    let requests = [
        ClientRequest::insert("users", "a", values(1)).via("s0a"),
        ClientRequest::insert("users", "b", values(2)).via("s1a"),
        ClientRequest::scan("users", "a", 10),
        ClientRequest::read("users", "a").via("s0b"),
        ClientRequest::read("users", "b").via("nowhere"),
        ClientRequest::update("users", "b", values(3)).via("s1b"),
    ];

    let mut ids = Vec::new();
    for request in requests {
        ids.push(router.process_query(request).await.response_id);
    }
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "response ids not increasing: {:?}", ids);
}
