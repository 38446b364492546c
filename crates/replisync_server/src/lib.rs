//! # replisync server
//!
//! Request boundary for the replisync sync protocol.
//!
//! This crate provides:
//! - Push and pull handlers with request validation and batch limits
//! - A store health pre-flight that fails fast when the store is down
//! - Error categorisation into client-visible kinds and HTTP status codes
//! - JSON and CBOR frame dispatch
//! - Demo counter mutators
//!
//! # Protocol
//!
//! Clients push batches of mutations and pull diffs keyed by a cookie:
//! 1. Client pushes its pending mutations
//! 2. Server applies the ones it has not seen, in per-client order
//! 3. Subscribers are poked for the changed partition
//! 4. Client pulls everything that changed since its cookie
//!
//! Raw store errors never reach clients; they see one of a fixed set of
//! [`replisync_protocol::ErrorKind`] values.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod mutators;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use mutators::{counter_mutators, COUNTER_KEY};
pub use server::{JsonReply, RequestKind, SyncServer};
