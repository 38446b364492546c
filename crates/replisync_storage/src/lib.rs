//! # replisync storage
//!
//! The authoritative relational store behind the replisync server.
//!
//! This crate provides:
//! - Row types for the space, client and entry relations
//! - The [`Store`] / [`StoreTransaction`] capability traits
//! - [`InMemoryStore`], a serializable in-memory implementation
//! - [`StorePool`], the lazily initialised, reinitialisable store handle
//! - [`SchemaBootstrap`], forward-only schema migrations
//!
//! ## Design Principles
//!
//! - The store is the single source of truth; nothing above it caches rows
//! - Every transaction is serializable; conflicts are reported, not hidden
//! - Tombstones are a variant of [`EntryState`], not a flag
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use replisync_storage::{InMemoryStore, StorePool, TxMode};
//!
//! let pool = StorePool::from_store(Arc::new(InMemoryStore::new()));
//! let store = pool.acquire().unwrap();
//! let mut tx = store.begin(TxMode::ReadOnly).unwrap();
//! assert!(tx.get_space("p1").unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod memory;
mod pool;
mod rows;
mod schema;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryStore, InjectedFault};
pub use pool::{SharedStoreConnector, StoreConnector, StorePool};
pub use rows::{now_millis, ClientRow, EntryRow, EntryState, SpaceRow};
pub use schema::{BootstrapReport, Migration, MigrationFn, SchemaBootstrap};
pub use store::{Store, StoreTransaction, TxMode};
