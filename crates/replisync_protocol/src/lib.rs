//! # replisync protocol
//!
//! Wire types for the push/pull synchronization protocol.
//!
//! This crate provides:
//! - [`PushRequest`] / [`PushResponse`] for shipping client mutation logs
//! - [`PullRequest`] / [`PullResponse`] for cookie-based incremental diffs
//! - [`PatchOperation`] for the entry changes inside a pull response
//! - [`ErrorResponse`] with the fixed set of failure categories
//! - JSON and CBOR codecs, plus type-coded [`SyncMessage`] frames
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## JSON shape
//!
//! ```json
//! {"cookie": 1, "lastMutationIDChanges": {"c1": 1},
//!  "patch": [{"op": "put", "key": "counter", "value": 1}]}
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod codec;
mod error;
mod messages;
mod patch;

pub use codec::{from_cbor, from_json, to_cbor, to_json};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    Cookie, ErrorKind, ErrorResponse, Mutation, PullRequest, PullResponse, PushRequest,
    PushResponse, SyncMessage,
};
pub use patch::PatchOperation;
