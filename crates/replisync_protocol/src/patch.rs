//! Patch operations carried by pull responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single change a client applies to its local cache.
///
/// Serialized with an `op` tag: `{"op":"put","key":..,"value":..}` or
/// `{"op":"del","key":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// The key now holds `value`.
    Put {
        /// Entry key.
        key: String,
        /// New value.
        value: Value,
    },
    /// The key was deleted.
    Del {
        /// Entry key.
        key: String,
    },
}

impl PatchOperation {
    /// Creates a put operation.
    pub fn put(key: impl Into<String>, value: Value) -> Self {
        PatchOperation::Put {
            key: key.into(),
            value,
        }
    }

    /// Creates a delete operation.
    pub fn del(key: impl Into<String>) -> Self {
        PatchOperation::Del { key: key.into() }
    }

    /// Returns the key this operation affects.
    pub fn key(&self) -> &str {
        match self {
            PatchOperation::Put { key, .. } | PatchOperation::Del { key } => key,
        }
    }
}
