//! Per-node staleness tests
//!
//! Writes become visible on the receiving node at once and on every other
//! node only after the write's visibility delay. These tests drive the query
//! handler with a manual clock so every instant is exact.

use anomaly_sim::anomaly::ConstantStaleness;
use anomaly_sim::model::{Columns, Node, StalenessMap, Version};
use anomaly_sim::protocol::ClientRequest;
use anomaly_sim::store::Store;
use anomaly_sim::time::{ManualTimeHandler, Timestamp};
use anomaly_sim::{ErrorKind, QueryHandler, ServerResponse};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

fn cluster(foreign_delay_ms: u64) -> (QueryHandler, ManualTimeHandler) {
    let clock = ManualTimeHandler::new(10_000);
    let handler = QueryHandler::new(
        vec![Node::primary("A"), Node::new("B"), Node::new("C")],
        ConstantStaleness::new(foreign_delay_ms, 0).without_client_delay(),
        Arc::new(clock.clone()),
    );
    (handler, clock)
}

fn person(name: &str, age: u64) -> Columns {
    Columns::from([("name".to_string(), json!(name)), ("age".to_string(), json!(age))])
}

fn read(handler: &mut QueryHandler, key: &str, node: &str) -> Version {
    let response = handler.process_query(ClientRequest::read("users", key).via(node));
    response.version().cloned().unwrap_or_else(|| panic!("not a read response: {:?}", response))
}

fn kind(response: &ServerResponse) -> Option<ErrorKind> {
    response.error().map(|e| e.kind)
}

#[test]
fn test_foreign_nodes_see_write_after_delay() {
    let (mut handler, clock) = cluster(500);
    let response = handler.process_query(ClientRequest::insert("users", "adele", person("Adele", 34)).via("A"));
    assert!(!response.is_exception());

    clock.advance_ms(50);
    assert_eq!(read(&mut handler, "adele", "A").get("name"), Some(&json!("Adele")));
    assert!(read(&mut handler, "adele", "B").is_null());
    assert!(read(&mut handler, "adele", "C").is_null());

    clock.advance_ms(399);
    assert!(read(&mut handler, "adele", "B").is_null(), "still invisible at +449ms");

    clock.advance_ms(51);
    assert!(!read(&mut handler, "adele", "B").is_null(), "visible at +500ms");
    assert!(!read(&mut handler, "adele", "C").is_null());
}

#[test]
fn test_visibility_is_monotonic_until_superseded() {
    let (mut handler, clock) = cluster(100);
    handler.process_query(ClientRequest::insert("users", "bob", person("Bob", 20)).via("A"));
    clock.advance_ms(100);

    for _ in 0..10 {
        assert_eq!(read(&mut handler, "bob", "B").get("age"), Some(&json!(20)));
        clock.advance_ms(37);
    }

    // A newer version hides nothing until it becomes visible itself
    handler.process_query(ClientRequest::update("users", "bob", Columns::from([("age".to_string(), json!(21))])).via("A"));
    assert_eq!(read(&mut handler, "bob", "B").get("age"), Some(&json!(20)));
    assert_eq!(read(&mut handler, "bob", "A").get("age"), Some(&json!(21)));
    clock.advance_ms(100);
    let latest = read(&mut handler, "bob", "B");
    assert_eq!(latest.get("age"), Some(&json!(21)));
    assert_eq!(latest.get("name"), Some(&json!("Bob")), "update keeps untouched columns");
}

#[test]
fn test_repeated_reads_are_identical() {
    let (mut handler, clock) = cluster(30);
    handler.process_query(ClientRequest::insert("users", "john", person("John", 41)).via("C"));
    clock.advance_ms(15);

    for node in ["A", "B", "C"] {
        let first = read(&mut handler, "john", node);
        let second = read(&mut handler, "john", node);
        assert_eq!(first, second);
        assert_eq!(first.is_null(), second.is_null());
    }
}

#[test]
fn test_preconditions_follow_what_the_node_sees() {
    let (mut handler, clock) = cluster(500);
    handler.process_query(ClientRequest::insert("users", "mike", person("Mike", 50)).via("A"));

    let dup = handler.process_query(ClientRequest::insert("users", "mike", person("Mike", 50)).via("A"));
    assert_eq!(kind(&dup), Some(ErrorKind::Insert));

    // B does not see mike yet: update/delete fail, a second insert succeeds
    let update = handler.process_query(ClientRequest::update("users", "mike", person("Mike", 51)).via("B"));
    assert_eq!(kind(&update), Some(ErrorKind::Update));
    let delete = handler.process_query(ClientRequest::delete("users", "mike").via("B"));
    assert_eq!(kind(&delete), Some(ErrorKind::Delete));
    let insert = handler.process_query(ClientRequest::insert("users", "mike", person("Michael", 50)).via("B"));
    assert!(!insert.is_exception());

    clock.advance_ms(500);
    let delete = handler.process_query(ClientRequest::delete("users", "mike").via("A"));
    assert!(!delete.is_exception());
    assert!(read(&mut handler, "mike", "A").is_null());
    assert_eq!(read(&mut handler, "mike", "C").get("name"), Some(&json!("Michael")));

    let missing = handler.process_query(ClientRequest::delete("users", "nobody"));
    assert_eq!(kind(&missing), Some(ErrorKind::Delete));
}

#[test]
fn test_missing_key_and_values() {
    let (mut handler, _) = cluster(0);
    let no_key = ClientRequest::from_json(r#"{"kind":"read","table":"users"}"#).unwrap();
    assert_eq!(kind(&handler.process_query(no_key)), Some(ErrorKind::NoKeyProvided));

    let no_values = handler.process_query(ClientRequest::insert("users", "k", Columns::new()));
    assert_eq!(kind(&no_values), Some(ErrorKind::NoValueProvided));

    let no_fields = handler.process_query(ClientRequest::read("users", "k").with_fields(Vec::<String>::new()));
    assert_eq!(kind(&no_fields), Some(ErrorKind::NoColumnProvided));

    let unknown = ClientRequest::from_json(r#"{"kind":"upsert","table":"users","key":"k"}"#).unwrap_err();
    assert_eq!(unknown.kind, ErrorKind::UnknownMessageType);
}

#[test]
fn test_projection_is_an_independent_copy() {
    let store = Store::new();
    let writer = Node::primary("A");
    let visibility = StalenessMap::new().with(&writer, 0);
    let version = Version::new(person("Adele", 34)).stamped(&writer, Timestamp(5), visibility);
    store.insert(&writer, "adele", version).unwrap();

    let name_only = BTreeSet::from(["name".to_string()]);
    let mut projected = store.get(&writer, "adele", Some(&name_only), Timestamp(5));
    assert_eq!(projected.values().len(), 1);
    assert_eq!(projected.get("name"), Some(&json!("Adele")));
    assert_eq!(projected.written_by(), Some(&writer));

    projected.set("name", json!("Changed"));
    let original = store.get(&writer, "adele", None, Timestamp(5));
    assert_eq!(original.get("name"), Some(&json!("Adele")));
    assert_eq!(original.get("age"), Some(&json!(34)));
}
