//! End-to-end push/pull tests against the in-memory store.

use replisync_core::{
    BroadcastNotifier, CoreError, GapPolicy, MutatorRegistry, PushOptions, RetryConfig, SyncEngine,
};
use replisync_protocol::{Mutation, PatchOperation, PullRequest, PushRequest};
use replisync_storage::{InMemoryStore, InjectedFault, StorePool};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;

fn registry() -> MutatorRegistry {
    let mut registry = MutatorRegistry::new();
    registry
        .register("increment", |tx, args| {
            let by = args.get("by").and_then(|v| v.as_i64()).unwrap_or(1);
            let n = tx.get("counter")?.and_then(|v| v.as_i64()).unwrap_or(0);
            tx.set("counter", json!(n + by))
        })
        .unwrap();
    registry
        .register("put", |tx, args| {
            let key = args["key"].as_str().unwrap_or_default().to_string();
            tx.set(key, args["value"].clone())
        })
        .unwrap();
    registry
        .register("del", |tx, args| {
            tx.del(args["key"].as_str().unwrap_or_default().to_string())
        })
        .unwrap();
    registry
}

fn engine() -> (InMemoryStore, SyncEngine) {
    let store = InMemoryStore::new();
    let pool = Arc::new(StorePool::from_store(Arc::new(store.clone())));
    let engine = SyncEngine::new(pool, registry()).with_retry(RetryConfig::immediate(10));
    (store, engine)
}

fn inc(client: &str, id: u64) -> Mutation {
    Mutation::new(client, id, "increment", json!({}))
}

#[test]
fn increment_then_pull_from_scratch() {
    let (_store, engine) = engine();
    engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 1)]))
        .unwrap();

    let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
    assert_eq!(pulled.cookie, 1);
    assert_eq!(pulled.patch, vec![PatchOperation::put("counter", json!(1))]);
    assert_eq!(pulled.last_mutation_id_changes.len(), 1);
    assert_eq!(pulled.last_mutation_id_changes["c1"], 1);
}

#[test]
fn unknown_partition_is_not_an_empty_patch() {
    let (_store, engine) = engine();
    let err = engine
        .pull(&PullRequest::new("ghost", "g1", None))
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownPartition(_)));
}

#[test]
fn concurrent_pushes_do_not_lose_updates() {
    let (store, engine) = engine();
    let engine = Arc::new(engine);
    let threads = 2;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let client = format!("c{i}");
                let request = PushRequest::new(
                    "p1",
                    "g1",
                    vec![Mutation::new(client, 1, "increment", json!({"by": i + 2}))],
                );
                barrier.wait();
                engine.push(&request).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
    assert_eq!(pulled.cookie, 2);
    assert_eq!(pulled.patch, vec![PatchOperation::put("counter", json!(5))]);
    assert!(store.commit_count() >= 2);
}

#[test]
fn many_concurrent_clients_converge() {
    let (_store, engine) = engine();
    let engine = Arc::new(engine.with_retry(RetryConfig::immediate(200)));
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for id in 1..=3 {
                    let request = PushRequest::new("p1", "g1", vec![inc(&format!("c{i}"), id)]);
                    engine.push(&request).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
    assert_eq!(pulled.cookie, 24);
    assert_eq!(pulled.patch, vec![PatchOperation::put("counter", json!(24))]);
    assert!(pulled.last_mutation_id_changes.values().all(|&id| id == 3));
}

#[test]
fn overlapping_batches_for_one_client_apply_in_order() {
    for _ in 0..20 {
        let (_store, engine) = engine();
        let engine = Arc::new(engine.with_retry(RetryConfig::immediate(200)));
        let threads = 6;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let last = if i % 2 == 0 { 2 } else { 3 };
                    let mutations = (1..=last).map(|id| inc("c1", id)).collect();
                    let request = PushRequest::new("p1", "g1", mutations);
                    barrier.wait();
                    engine.push(&request).unwrap()
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let applied: usize = outcomes.iter().map(|o| o.applied).sum();
        assert_eq!(applied, 3);
        assert!(outcomes.iter().all(|o| o.version <= 2));

        let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
        assert!(pulled.cookie <= 2);
        assert_eq!(pulled.last_mutation_id_changes["c1"], 3);
        assert_eq!(pulled.patch, vec![PatchOperation::put("counter", json!(3))]);
    }
}

#[test]
fn resubmitted_batch_is_idempotent() {
    let (_store, engine) = engine();
    let batch = PushRequest::new("p1", "g1", vec![inc("c1", 1), inc("c1", 2), inc("c2", 1)]);

    let first = engine.push(&batch).unwrap();
    let second = engine.push(&batch).unwrap();

    assert_eq!(first.version, 1);
    assert_eq!(second.version, 1);
    assert_eq!(second.applied, 0);
    let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
    assert_eq!(pulled.patch, vec![PatchOperation::put("counter", json!(3))]);
}

#[test]
fn conflicts_are_retried_transparently() {
    let (store, engine) = engine();
    engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 1)]))
        .unwrap();
    store.fail_next_commits(InjectedFault::SerializationFailure, 3);

    let outcome = engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 2)]))
        .unwrap();
    assert_eq!(outcome.version, 2);

    let pulled = engine.pull(&PullRequest::new("p1", "g1", Some(1))).unwrap();
    assert_eq!(pulled.patch, vec![PatchOperation::put("counter", json!(2))]);
}

#[test]
fn exhausted_retries_leave_nothing_behind() {
    let (store, engine) = engine();
    let engine = engine.with_retry(RetryConfig::immediate(3));
    engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 1)]))
        .unwrap();
    store.fail_next_commits(InjectedFault::Deadlock, 3);

    let err = engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 2)]))
        .unwrap_err();
    assert!(matches!(err, CoreError::TransactionExhausted { attempts: 3, .. }));

    let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
    assert_eq!(pulled.cookie, 1);
    assert_eq!(pulled.last_mutation_id_changes["c1"], 1);
}

#[test]
fn gap_rejection_applies_nothing() {
    let (_store, engine) = engine();
    let err = engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c2", 1), inc("c1", 2)]))
        .unwrap_err();
    assert!(matches!(err, CoreError::MutationGap { .. }));

    let err = engine
        .pull(&PullRequest::new("p1", "g1", None))
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownPartition(_)));
}

#[test]
fn skip_client_policy_applies_the_rest() {
    let (_store, engine) = engine();
    let engine =
        engine.with_push_options(PushOptions::default().with_gap_policy(GapPolicy::SkipClient));
    let outcome = engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 2), inc("c2", 1)]))
        .unwrap();
    assert_eq!(outcome.applied, 1);

    let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
    assert_eq!(pulled.last_mutation_id_changes.get("c1"), None);
    assert_eq!(pulled.last_mutation_id_changes["c2"], 1);
}

#[test]
fn deletes_show_up_as_tombstones() {
    let (_store, engine) = engine();
    let put = Mutation::new("c1", 1, "put", json!({"key": "todo/1", "value": {"done": false}}));
    engine.push(&PushRequest::new("p1", "g1", vec![put])).unwrap();
    let first = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();

    let del = Mutation::new("c1", 2, "del", json!({"key": "todo/1"}));
    engine.push(&PushRequest::new("p1", "g1", vec![del])).unwrap();

    let second = engine
        .pull(&PullRequest::new("p1", "g1", Some(first.cookie)))
        .unwrap();
    assert_eq!(second.cookie, 2);
    assert_eq!(second.patch, vec![PatchOperation::del("todo/1")]);
}

#[test]
fn store_outage_fails_fast_and_recovers() {
    let (store, engine) = engine();
    engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 1)]))
        .unwrap();

    store.set_available(false);
    let err = engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 2)]))
        .unwrap_err();
    assert!(matches!(err, CoreError::StoreUnavailable(_)));

    store.set_available(true);
    let outcome = engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 2)]))
        .unwrap();
    assert_eq!(outcome.version, 2);
    assert_eq!(engine.pool().generation(), 2);
}

#[tokio::test]
async fn successful_push_pokes_subscribers() {
    let (_store, engine) = engine();
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut pokes = notifier.subscribe();
    let engine = engine.with_notifier(notifier.clone());

    engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 1)]))
        .unwrap();
    assert_eq!(pokes.recv().await.unwrap().space_id, "p1");

    engine
        .push(&PushRequest::new("p1", "g1", vec![inc("c1", 1)]))
        .unwrap();
    assert!(pokes.try_recv().is_err(), "duplicate batch must not poke");
}
