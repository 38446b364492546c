//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::mutators::counter_mutators;
use replisync_core::{BroadcastNotifier, MutatorRegistry, Poke, SyncEngine};
use replisync_protocol::{
    from_json, to_json, PullRequest, PullResponse, PushRequest, PushResponse, SyncMessage,
};
use replisync_storage::{InMemoryStore, StorePool};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Body sent when even the error response cannot be serialized.
const FALLBACK_ERROR_BODY: &[u8] = br#"{"error":"internal","message":"internal error"}"#;

/// Endpoint addressed by a JSON request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Push endpoint.
    Push,
    /// Pull endpoint.
    Pull,
}

impl FromStr for RequestKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(RequestKind::Push),
            "pull" => Ok(RequestKind::Pull),
            other => Err(ServerError::InvalidRequest(format!("unknown endpoint: {other}"))),
        }
    }
}

/// A serialized response with its HTTP status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonReply {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

/// The sync server.
///
/// Wraps a [`SyncEngine`] with request validation, a store health
/// pre-flight and error categorisation. Pokes for changed partitions are
/// available through [`subscribe`](Self::subscribe).
///
/// # Example
///
/// ```
/// use replisync_protocol::{Mutation, PullRequest, PushRequest};
/// use replisync_server::{ServerConfig, SyncServer};
/// use serde_json::json;
///
/// let server = SyncServer::in_memory(ServerConfig::default()).unwrap();
/// let push = PushRequest::new("p1", "g1", vec![Mutation::new("c1", 1, "increment", json!({}))]);
/// server.handle_push(&push).unwrap();
///
/// let pulled = server.handle_pull(&PullRequest::new("p1", "g1", None)).unwrap();
/// assert_eq!(pulled.cookie, 1);
/// ```
#[derive(Debug)]
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    notifier: Arc<BroadcastNotifier>,
}

impl SyncServer {
    /// Creates a server over `pool` with the given mutators.
    pub fn new(config: ServerConfig, pool: Arc<StorePool>, registry: MutatorRegistry) -> Self {
        let notifier = Arc::new(BroadcastNotifier::new(config.poke_capacity));
        let engine = SyncEngine::new(pool, registry)
            .with_retry(config.retry.clone())
            .with_push_options(config.push_options())
            .with_notifier(notifier.clone());
        let context = Arc::new(HandlerContext::new(config, engine));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            notifier,
        }
    }

    /// Creates a server over a fresh in-memory store with the counter mutators.
    pub fn in_memory(config: ServerConfig) -> ServerResult<Self> {
        let pool = Arc::new(StorePool::from_store(Arc::new(InMemoryStore::new())));
        Ok(Self::new(config, pool, counter_mutators()?))
    }

    /// Connects to the store and runs the schema bootstrap eagerly.
    pub fn initialize(&self) -> ServerResult<()> {
        self.context
            .engine
            .pool()
            .initialize()
            .map_err(|e| ServerError::Core(e.into()))?;
        info!("Sync server ready");
        Ok(())
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Subscribes to partition-changed pokes.
    pub fn subscribe(&self) -> broadcast::Receiver<Poke> {
        self.notifier.subscribe()
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: &PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(request).map(|_| PushResponse::default())
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(request)
    }

    /// Handles a sync message (dispatches to appropriate handler).
    ///
    /// Failures come back as [`SyncMessage::Error`].
    pub fn handle_message(&self, message: SyncMessage) -> SyncMessage {
        let result = match message {
            SyncMessage::PushRequest(req) => self.handle_push(&req).map(SyncMessage::PushResponse),
            SyncMessage::PullRequest(req) => self.handle_pull(&req).map(SyncMessage::PullResponse),
            other => Err(ServerError::UnexpectedMessage(other.type_code())),
        };
        result.unwrap_or_else(|err| SyncMessage::Error(report(&err).to_response()))
    }

    /// Handles a CBOR frame and returns the encoded response frame.
    pub fn handle_frame(&self, frame: &[u8]) -> ServerResult<Vec<u8>> {
        let response = match SyncMessage::decode(frame) {
            Ok(message) => self.handle_message(message),
            Err(err) => SyncMessage::Error(report(&err.into()).to_response()),
        };
        Ok(response.encode()?)
    }

    /// Handles a JSON request body for `kind`.
    pub fn handle_json(&self, kind: RequestKind, body: &[u8]) -> JsonReply {
        let result = match kind {
            RequestKind::Push => from_json::<PushRequest>(body)
                .map_err(ServerError::from)
                .and_then(|req| self.handle_push(&req))
                .and_then(|resp| encode(&resp)),
            RequestKind::Pull => from_json::<PullRequest>(body)
                .map_err(ServerError::from)
                .and_then(|req| self.handle_pull(&req))
                .and_then(|resp| encode(&resp)),
        };

        match result {
            Ok(body) => JsonReply { status: 200, body },
            Err(err) => {
                let status = report(&err).status_code();
                let body = to_json(&err.to_response()).unwrap_or_else(|e| {
                    error!(error = %e, "Failed to encode error response");
                    FALLBACK_ERROR_BODY.to_vec()
                });
                JsonReply { status, body }
            }
        }
    }
}

fn encode<T: Serialize>(value: &T) -> ServerResult<Vec<u8>> {
    to_json(value).map_err(|e| ServerError::Internal(e.to_string()))
}

fn report(err: &ServerError) -> &ServerError {
    if err.is_server_error() {
        error!(error = %err, status = err.status_code(), "Request failed");
    } else {
        warn!(error = %err, status = err.status_code(), "Request rejected");
    }
    err
}
