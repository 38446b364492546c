//! # replisync core
//!
//! Server side of a push/pull sync protocol for offline-first clients.
//!
//! This crate provides:
//! - A transaction retry executor over serializable store transactions
//! - The mutation ledger, partition version store and entry store
//! - A registry of named mutators and the entry view they run against
//! - The push processor and the pull diff engine
//! - Change notification after successful pushes
//!
//! ## Architecture
//!
//! Clients apply mutations speculatively and push them later. The server
//! re-executes each mutation in per-client order, deduplicating by mutation
//! ID, and stamps every changed entry with the partition's new version.
//! Pulls return every entry stamped after the client's cookie.
//!
//! ## Key Invariants
//!
//! - A client's mutations are applied strictly in ID order, each at most once
//! - A push batch bumps the partition version by exactly one, or not at all
//!   if it changed nothing
//! - Deletes are kept as tombstones so pulls can report them
//! - Conflicts are retried; no partial batch is ever visible
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use replisync_core::{MutatorRegistry, SyncEngine};
//! use replisync_protocol::{Mutation, PullRequest, PushRequest};
//! use replisync_storage::{InMemoryStore, StorePool};
//! use serde_json::json;
//!
//! let mut registry = MutatorRegistry::new();
//! registry
//!     .register("increment", |tx, _| {
//!         let n = tx.get("counter")?.and_then(|v| v.as_i64()).unwrap_or(0);
//!         tx.set("counter", json!(n + 1))
//!     })
//!     .unwrap();
//!
//! let pool = Arc::new(StorePool::from_store(Arc::new(InMemoryStore::new())));
//! let engine = SyncEngine::new(pool, registry);
//!
//! let push = PushRequest::new("p1", "g1", vec![Mutation::new("c1", 1, "increment", json!({}))]);
//! engine.push(&push).unwrap();
//!
//! let pulled = engine.pull(&PullRequest::new("p1", "g1", None)).unwrap();
//! assert_eq!(pulled.cookie, 1);
//! assert_eq!(pulled.last_mutation_id_changes["c1"], 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod engine;
mod entries;
mod error;
mod ledger;
mod mutator;
mod notify;
mod pull;
mod push;
mod retry;
mod space;
mod transact;

pub use config::{GapPolicy, PushOptions, RetryConfig};
pub use engine::SyncEngine;
pub use error::{CoreError, CoreResult};
pub use mutator::{MutatorFn, MutatorRegistry, WriteTransaction};
pub use notify::{BroadcastNotifier, ChangeNotifier, NoopNotifier, Poke};
pub use pull::compute_pull;
pub use push::{process_push, PushOutcome};
pub use retry::{retry, Attempt, RetryError, Sleeper, ThreadSleeper};
pub use transact::{transact, transact_with};
