//! Endpoint behavior: status codes, error bodies and pokes.

use replisync_core::RetryConfig;
use replisync_protocol::{ErrorKind, ErrorResponse, Mutation, PullRequest, PushRequest};
use replisync_server::{counter_mutators, RequestKind, ServerConfig, ServerError, SyncServer};
use replisync_storage::{InMemoryStore, InjectedFault, StorePool};
use serde_json::json;
use std::sync::Arc;

fn server_with(config: ServerConfig) -> (InMemoryStore, SyncServer) {
    let store = InMemoryStore::new();
    let pool = Arc::new(StorePool::from_store(Arc::new(store.clone())));
    let server = SyncServer::new(config, pool, counter_mutators().unwrap());
    (store, server)
}

fn push_body(mutations: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "spaceID": "p1",
        "clientGroupID": "g1",
        "mutations": mutations
    }))
    .unwrap()
}

fn error_body(body: &[u8]) -> ErrorResponse {
    serde_json::from_slice(body).unwrap()
}

#[test]
fn counter_mutators_end_to_end() {
    let (_store, server) = server_with(ServerConfig::default());
    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([
            {"clientID": "c1", "id": 1, "name": "increment", "args": {"by": 5}},
            {"clientID": "c1", "id": 2, "name": "decrement", "args": {}},
            {"clientID": "c2", "id": 1, "name": "increment"}
        ])),
    );
    assert_eq!(reply.status, 200);

    let pulled = server
        .handle_pull(&PullRequest::new("p1", "g1", None))
        .unwrap();
    assert_eq!(pulled.cookie, 1);
    assert_eq!(
        serde_json::to_value(&pulled.patch).unwrap(),
        json!([{"op": "put", "key": "counter", "value": 5}])
    );

    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([{"clientID": "c1", "id": 3, "name": "set", "args": {"value": 42}}])),
    );
    assert_eq!(reply.status, 200);
    let pulled = server
        .handle_pull(&PullRequest::new("p1", "g1", Some(1)))
        .unwrap();
    assert_eq!(pulled.cookie, 2);
    assert_eq!(
        serde_json::to_value(&pulled.patch).unwrap(),
        json!([{"op": "put", "key": "counter", "value": 42}])
    );
}

#[test]
fn mutation_gap_is_400() {
    let (_store, server) = server_with(ServerConfig::default());
    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([{"clientID": "c1", "id": 2, "name": "increment"}])),
    );
    assert_eq!(reply.status, 400);
    assert_eq!(error_body(&reply.body).error, ErrorKind::MutationGap);
}

#[test]
fn mutator_failure_is_400_and_rolls_back() {
    let (_store, server) = server_with(ServerConfig::default());
    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([
            {"clientID": "c1", "id": 1, "name": "increment"},
            {"clientID": "c1", "id": 2, "name": "set", "args": {"value": "lots"}}
        ])),
    );
    assert_eq!(reply.status, 400);
    assert_eq!(error_body(&reply.body).error, ErrorKind::MutatorFailed);

    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([{"clientID": "c1", "id": 1, "name": "frobnicate"}])),
    );
    assert_eq!(reply.status, 400);
    assert_eq!(error_body(&reply.body).error, ErrorKind::MutatorFailed);

    let err = server
        .handle_pull(&PullRequest::new("p1", "g1", None))
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn oversized_and_malformed_batches_are_invalid() {
    let config = ServerConfig::default().with_max_push_batch(2);
    let (_store, server) = server_with(config);
    let mutations = (1..=3)
        .map(|id| Mutation::new("c1", id, "increment", json!({})))
        .collect();
    let err = server
        .handle_push(&PushRequest::new("p1", "g1", mutations))
        .unwrap_err();
    assert!(matches!(err, ServerError::InvalidRequest(_)));

    let err = server
        .handle_push(&PushRequest::new("", "g1", vec![]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let err = server
        .handle_push(&PushRequest::new(
            "p1",
            "g1",
            vec![Mutation::new("c1", 0, "increment", json!({}))],
        ))
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[test]
fn unhealthy_store_is_503_without_detail() {
    let (store, server) = server_with(ServerConfig::default());
    server.initialize().unwrap();
    store.set_available(false);

    let reply = server.handle_json(
        RequestKind::Pull,
        br#"{"spaceID":"p1","clientGroupID":"g1","cookie":null}"#,
    );
    assert_eq!(reply.status, 503);
    let body = error_body(&reply.body);
    assert_eq!(body.error, ErrorKind::StoreUnavailable);
    assert_eq!(body.message, "store unavailable");

    store.set_available(true);
    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([{"clientID": "c1", "id": 1, "name": "increment"}])),
    );
    assert_eq!(reply.status, 200);
}

#[test]
fn exhausted_retries_are_409() {
    let config = ServerConfig::default()
        .with_retry(RetryConfig::immediate(2))
        .with_health_check(false);
    let (store, server) = server_with(config);
    server.initialize().unwrap();
    store.fail_next_commits(InjectedFault::SerializationFailure, 2);

    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([{"clientID": "c1", "id": 1, "name": "increment"}])),
    );
    assert_eq!(reply.status, 409);
    let body = error_body(&reply.body);
    assert_eq!(body.error, ErrorKind::TransactionExhausted);
    assert!(body.error.is_transient());
}

#[test]
fn connection_lost_mid_commit_is_503() {
    let config = ServerConfig::default().with_health_check(false);
    let (store, server) = server_with(config);
    server.initialize().unwrap();
    store.fail_next_commits(InjectedFault::ConnectionLost, 1);

    let reply = server.handle_json(
        RequestKind::Push,
        &push_body(json!([{"clientID": "c1", "id": 1, "name": "increment"}])),
    );
    assert_eq!(reply.status, 503);
    assert!(!String::from_utf8_lossy(&reply.body).contains("injected"));
}

#[tokio::test]
async fn pushes_poke_subscribers() {
    let (_store, server) = server_with(ServerConfig::default());
    let mut pokes = server.subscribe();

    server
        .handle_push(&PushRequest::new(
            "p1",
            "g1",
            vec![Mutation::new("c1", 1, "increment", json!({}))],
        ))
        .unwrap();

    let poke = pokes.recv().await.unwrap();
    assert_eq!(poke.space_id, "p1");
}
