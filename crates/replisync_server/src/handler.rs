//! Request handlers for push and pull.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use replisync_core::{CoreError, PushOutcome, SyncEngine};
use replisync_protocol::{PullRequest, PullResponse, PushRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared state for request handling.
#[derive(Debug)]
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Sync engine (shared across all handlers).
    pub engine: SyncEngine,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, engine: SyncEngine) -> Self {
        Self { config, engine }
    }
}

/// Handler for sync requests.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: &PushRequest) -> ServerResult<PushOutcome> {
        self.validate_push(request)?;
        self.preflight()?;
        Ok(self.context.engine.push(request)?)
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        require_id("spaceID", &request.space_id)?;
        require_id("clientGroupID", &request.client_group_id)?;
        self.preflight()?;
        Ok(self.context.engine.pull(request)?)
    }

    fn validate_push(&self, request: &PushRequest) -> ServerResult<()> {
        require_id("spaceID", &request.space_id)?;
        require_id("clientGroupID", &request.client_group_id)?;

        let max = self.context.config.max_push_batch;
        if request.mutations.len() > max {
            return Err(ServerError::InvalidRequest(format!(
                "too many mutations: {} > {}",
                request.mutations.len(),
                max
            )));
        }

        for mutation in &request.mutations {
            require_id("clientID", &mutation.client_id)?;
            require_id("name", &mutation.name)?;
            if mutation.id == 0 {
                return Err(ServerError::InvalidRequest(format!(
                    "mutation IDs start at 1 (client {})",
                    mutation.client_id
                )));
            }
        }
        Ok(())
    }

    fn preflight(&self) -> ServerResult<()> {
        if !self.context.config.health_check {
            return Ok(());
        }
        if self.context.engine.pool().is_healthy() {
            Ok(())
        } else {
            warn!("Rejecting request, store health check failed");
            Err(CoreError::StoreUnavailable("health check failed".into()).into())
        }
    }
}

fn require_id(field: &str, value: &str) -> ServerResult<()> {
    if value.trim().is_empty() {
        debug!(field, "Rejecting request with empty identifier");
        return Err(ServerError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}
