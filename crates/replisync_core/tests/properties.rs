//! Property tests for versioning, idempotence and pull convergence.

use proptest::prelude::*;
use replisync_core::{MutatorRegistry, RetryConfig, SyncEngine};
use replisync_protocol::{Mutation, PatchOperation, PullRequest, PushRequest};
use replisync_storage::{InMemoryStore, StorePool};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Put(String, i64),
    Del(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let key = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from);
    prop_oneof![
        (key.clone(), -3i64..3).prop_map(|(k, v)| Op::Put(k, v)),
        key.prop_map(Op::Del),
    ]
}

fn batches_strategy() -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(prop::collection::vec(op_strategy(), 1..5), 1..8)
}

fn engine() -> SyncEngine {
    let mut registry = MutatorRegistry::new();
    registry
        .register("increment", |tx, _| {
            let n = tx.get("counter")?.and_then(|v| v.as_i64()).unwrap_or(0);
            tx.set("counter", json!(n + 1))
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
    let pool = Arc::new(StorePool::from_store(Arc::new(InMemoryStore::new())));
    SyncEngine::new(pool, registry).with_retry(RetryConfig::immediate(3))
}

fn to_mutation(op: &Op, id: u64) -> Mutation {
    match op {
        Op::Put(key, value) => Mutation::new("c1", id, "put", json!({"key": key, "value": value})),
        Op::Del(key) => Mutation::new("c1", id, "del", json!({"key": key})),
    }
}

fn apply_patch(replica: &mut BTreeMap<String, Value>, patch: &[PatchOperation]) {
    for op in patch {
        match op {
            PatchOperation::Put { key, value } => {
                replica.insert(key.clone(), value.clone());
            }
            PatchOperation::Del { key } => {
                replica.remove(key);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn version_counts_changing_batches(sizes in prop::collection::vec(1usize..4, 1..10)) {
        let engine = engine();
        let mut next_id = 1;
        for size in &sizes {
            let mutations = (0..*size)
                .map(|i| Mutation::new("c1", next_id + i as u64, "increment", json!({})))
                .collect();
            next_id += *size as u64;
            engine.push(&PushRequest::new("p1", "g1", mutations)).unwrap();
        }

        let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
        prop_assert_eq!(pulled.cookie, sizes.len() as u64);
        let total: usize = sizes.iter().sum();
        prop_assert_eq!(pulled.last_mutation_id_changes["c1"], total as u64);
        prop_assert_eq!(pulled.patch, vec![PatchOperation::put("counter", json!(total))]);
    }

    #[test]
    fn resubmitting_batches_is_a_noop(batches in batches_strategy()) {
        let engine = engine();
        let mut next_id = 1;
        let mut requests = Vec::new();
        for batch in &batches {
            let mutations = batch
                .iter()
                .enumerate()
                .map(|(i, op)| to_mutation(op, next_id + i as u64))
                .collect();
            next_id += batch.len() as u64;
            let request = PushRequest::new("p1", "g1", mutations);
            engine.push(&request).unwrap();
            requests.push(request);
        }
        let before = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();

        for request in &requests {
            let outcome = engine.push(request).unwrap();
            prop_assert_eq!(outcome.applied, 0);
        }
        let after = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn incremental_pulls_reconstruct_live_state(batches in batches_strategy()) {
        let engine = engine();
        let mut model: BTreeMap<String, Value> = BTreeMap::new();
        let mut replica: BTreeMap<String, Value> = BTreeMap::new();
        let mut cookie = None;
        let mut next_id = 1;

        for batch in &batches {
            let mutations = batch
                .iter()
                .enumerate()
                .map(|(i, op)| to_mutation(op, next_id + i as u64))
                .collect();
            next_id += batch.len() as u64;
            engine.push(&PushRequest::new("p1", "g1", mutations)).unwrap();
            for op in batch {
                match op {
                    Op::Put(key, value) => {
                        model.insert(key.clone(), json!(value));
                    }
                    Op::Del(key) => {
                        model.remove(key);
                    }
                }
            }

            let pulled = engine.pull(&PullRequest::new("p1", "g1", cookie)).unwrap();
            if let Some(previous) = cookie {
                prop_assert!(pulled.cookie >= previous);
            }
            apply_patch(&mut replica, &pulled.patch);
            cookie = Some(pulled.cookie);

            let again = engine.pull(&PullRequest::new("p1", "g1", cookie)).unwrap();
            prop_assert!(again.patch.is_empty());
            prop_assert_eq!(again.cookie, pulled.cookie);
        }

        prop_assert_eq!(&replica, &model);
        let full = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
        let mut fresh = BTreeMap::new();
        apply_patch(&mut fresh, &full.patch);
        prop_assert_eq!(&fresh, &model);
    }
}
