//! Protocol messages for push and pull.

use crate::codec::{from_cbor, to_cbor};
use crate::error::{ProtocolError, ProtocolResult};
use crate::patch::PatchOperation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A partition version watermark.
pub type Cookie = u64;

/// A client-issued state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Issuing client.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Per-client, strictly increasing mutation ID.
    pub id: u64,
    /// Name of the mutator to run.
    pub name: String,
    /// Mutator arguments.
    #[serde(default)]
    pub args: Value,
}

impl Mutation {
    /// Creates a mutation.
    pub fn new(
        client_id: impl Into<String>,
        id: u64,
        name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            id,
            name: name.into(),
            args,
        }
    }
}

/// Push request from a client group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Target partition.
    #[serde(rename = "spaceID")]
    pub space_id: String,
    /// Client group the mutations come from.
    #[serde(rename = "clientGroupID")]
    pub client_group_id: String,
    /// Mutations in submission order.
    pub mutations: Vec<Mutation>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(
        space_id: impl Into<String>,
        client_group_id: impl Into<String>,
        mutations: Vec<Mutation>,
    ) -> Self {
        Self {
            space_id: space_id.into(),
            client_group_id: client_group_id.into(),
            mutations,
        }
    }
}

/// Push response. Success carries no payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {}

/// Pull request from a client group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Partition to diff.
    #[serde(rename = "spaceID")]
    pub space_id: String,
    /// Requesting client group.
    #[serde(rename = "clientGroupID")]
    pub client_group_id: String,
    /// Last cookie the client saw; `None` means the beginning of time.
    pub cookie: Option<Cookie>,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(
        space_id: impl Into<String>,
        client_group_id: impl Into<String>,
        cookie: Option<Cookie>,
    ) -> Self {
        Self {
            space_id: space_id.into(),
            client_group_id: client_group_id.into(),
            cookie,
        }
    }
}

/// Pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// New cookie: the partition version the diff was computed at.
    pub cookie: Cookie,
    /// Last applied mutation ID for every client in the group.
    #[serde(rename = "lastMutationIDChanges")]
    pub last_mutation_id_changes: BTreeMap<String, u64>,
    /// Entry changes since the request cookie.
    pub patch: Vec<PatchOperation>,
}

/// Failure categories visible to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The retry budget was spent on conflicts. Safe to retry later.
    TransactionExhausted,
    /// A mutation ID skipped ahead of the client's last applied ID.
    MutationGap,
    /// The partition has never been written.
    UnknownPartition,
    /// The store is unreachable.
    StoreUnavailable,
    /// An application mutator failed.
    MutatorFailed,
    /// The request was malformed or exceeded limits.
    InvalidRequest,
    /// Any other server failure.
    Internal,
}

impl ErrorKind {
    /// Returns true if the client may simply retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransactionExhausted | ErrorKind::StoreUnavailable | ErrorKind::Internal
        )
    }
}

/// Error body returned for any failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Failure category.
    pub error: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorResponse {
    /// Creates an error response.
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

/// A protocol message with its type code.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// Push request.
    PushRequest(PushRequest),
    /// Push response.
    PushResponse(PushResponse),
    /// Pull request.
    PullRequest(PullRequest),
    /// Pull response.
    PullResponse(PullResponse),
    /// Error response.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::PushRequest(_) => 1,
            SyncMessage::PushResponse(_) => 2,
            SyncMessage::PullRequest(_) => 3,
            SyncMessage::PullResponse(_) => 4,
            SyncMessage::Error(_) => 5,
        }
    }

    /// Encodes as a frame: one type-code byte followed by the CBOR body.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let body = match self {
            SyncMessage::PushRequest(m) => to_cbor(m)?,
            SyncMessage::PushResponse(m) => to_cbor(m)?,
            SyncMessage::PullRequest(m) => to_cbor(m)?,
            SyncMessage::PullResponse(m) => to_cbor(m)?,
            SyncMessage::Error(m) => to_cbor(m)?,
        };
        let mut frame = Vec::with_capacity(body.len() + 1);
        frame.push(self.type_code());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decodes a frame produced by [`encode`](Self::encode).
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        let (&code, body) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
        match code {
            1 => Ok(SyncMessage::PushRequest(from_cbor(body)?)),
            2 => Ok(SyncMessage::PushResponse(from_cbor(body)?)),
            3 => Ok(SyncMessage::PullRequest(from_cbor(body)?)),
            4 => Ok(SyncMessage::PullResponse(from_cbor(body)?)),
            5 => Ok(SyncMessage::Error(from_cbor(body)?)),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_request_wire_names() {
        let req: PushRequest = serde_json::from_value(json!({
            "spaceID": "p1",
            "clientGroupID": "g1",
            "mutations": [{"clientID": "c1", "id": 1, "name": "increment", "args": {}}]
        }))
        .unwrap();

        assert_eq!(req.space_id, "p1");
        assert_eq!(req.client_group_id, "g1");
        assert_eq!(req.mutations[0], Mutation::new("c1", 1, "increment", json!({})));
    }

    #[test]
    fn mutation_args_default_to_null() {
        let m: Mutation =
            serde_json::from_value(json!({"clientID": "c1", "id": 2, "name": "increment"}))
                .unwrap();
        assert_eq!(m.args, Value::Null);
    }

    #[test]
    fn pull_request_null_cookie() {
        let req: PullRequest =
            serde_json::from_value(json!({"spaceID": "p1", "clientGroupID": "g1", "cookie": null}))
                .unwrap();
        assert_eq!(req.cookie, None);
    }

    #[test]
    fn pull_response_wire_shape() {
        let resp = PullResponse {
            cookie: 1,
            last_mutation_id_changes: BTreeMap::from([("c1".to_string(), 1)]),
            patch: vec![PatchOperation::put("counter", json!(1))],
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({
                "cookie": 1,
                "lastMutationIDChanges": {"c1": 1},
                "patch": [{"op": "put", "key": "counter", "value": 1}]
            })
        );
    }

    #[test]
    fn push_response_is_empty_object() {
        assert_eq!(serde_json::to_string(&PushResponse::default()).unwrap(), "{}");
    }

    #[test]
    fn error_kind_wire_names() {
        let resp = ErrorResponse::new(ErrorKind::UnknownPartition, "unknown space ghost");
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"error": "unknown_partition", "message": "unknown space ghost"})
        );
        assert!(!ErrorKind::UnknownPartition.is_transient());
        assert!(ErrorKind::TransactionExhausted.is_transient());
    }

    #[test]
    fn frame_carries_type_code() {
        let msg = SyncMessage::PullResponse(PullResponse {
            cookie: 4,
            last_mutation_id_changes: BTreeMap::new(),
            patch: vec![PatchOperation::del("gone"), PatchOperation::put("k", json!({"a": [1, 2]}))],
        });
        let frame = msg.encode().unwrap();
        assert_eq!(frame[0], 4);
        assert_eq!(SyncMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn frame_errors() {
        assert!(matches!(
            SyncMessage::decode(&[]).unwrap_err(),
            ProtocolError::EmptyFrame
        ));
        assert!(matches!(
            SyncMessage::decode(&[99, 0]).unwrap_err(),
            ProtocolError::UnknownMessageType(99)
        ));
    }

    #[test]
    fn sync_message_type_codes() {
        assert_eq!(SyncMessage::PushResponse(PushResponse::default()).type_code(), 2);
        assert_eq!(
            SyncMessage::PullRequest(PullRequest::new("p", "g", None)).type_code(),
            3
        );
        assert_eq!(
            SyncMessage::Error(ErrorResponse::new(ErrorKind::Internal, "x")).type_code(),
            5
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_never_panics(frame in prop::collection::vec(any::<u8>(), 0..64)) {
                let _ = SyncMessage::decode(&frame);
            }

            #[test]
            fn unknown_codes_are_rejected(
                code in 6u8..,
                body in prop::collection::vec(any::<u8>(), 0..16),
            ) {
                let mut frame = vec![code];
                frame.extend(body);
                prop_assert!(matches!(
                    SyncMessage::decode(&frame),
                    Err(ProtocolError::UnknownMessageType(c)) if c == code
                ));
            }
        }
    }
}
