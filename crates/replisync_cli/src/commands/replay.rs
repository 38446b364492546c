//! Replay command implementation.
//!
//! Runs a script of push and pull requests against a fresh in-memory
//! server and reports every response with its status code.
//!
//! A script is a JSON array of steps:
//!
//! ```json
//! [
//!   {"endpoint": "push", "body": {"spaceID": "p1", "clientGroupID": "g1", "mutations": []}},
//!   {"endpoint": "pull", "body": {"spaceID": "p1", "clientGroupID": "g1", "cookie": null}}
//! ]
//! ```

use replisync_core::{GapPolicy, RetryConfig};
use replisync_server::{RequestKind, ServerConfig, SyncServer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading or running a script.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The script file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Script path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The script is not a valid list of steps.
    #[error("invalid script: {0}")]
    Script(#[from] serde_json::Error),

    /// Unsupported output format.
    #[error("unknown format {0:?}, expected text or json")]
    Format(String),

    /// The in-memory server could not be built.
    #[error("server setup failed: {0}")]
    Server(#[from] replisync_server::ServerError),
}

/// One scripted request.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Endpoint to call.
    pub endpoint: Endpoint,
    /// JSON request body.
    pub body: Value,
}

/// Script endpoint name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Push endpoint.
    Push,
    /// Pull endpoint.
    Pull,
}

impl From<Endpoint> for RequestKind {
    fn from(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::Push => RequestKind::Push,
            Endpoint::Pull => RequestKind::Pull,
        }
    }
}

/// Result of one replayed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// 1-based step number.
    pub step: usize,
    /// Endpoint called.
    pub endpoint: Endpoint,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub response: Value,
}

/// Server options for a replay.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Handling of mutation ID gaps.
    pub gap_policy: GapPolicy,
    /// Maximum transaction attempts.
    pub max_attempts: u32,
    /// Maximum mutations per push.
    pub max_push_batch: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        let config = ServerConfig::default();
        Self {
            gap_policy: config.gap_policy,
            max_attempts: config.retry.max_attempts,
            max_push_batch: config.max_push_batch,
        }
    }
}

impl ReplayOptions {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::new()
            .with_gap_policy(self.gap_policy)
            .with_retry(RetryConfig::new(self.max_attempts))
            .with_max_push_batch(self.max_push_batch)
    }
}

/// Loads a script from `path`.
pub fn load(path: &Path) -> Result<Vec<Step>, ReplayError> {
    let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Replays `steps` against a fresh in-memory server.
pub fn replay(steps: &[Step], options: &ReplayOptions) -> Result<Vec<StepResult>, ReplayError> {
    let server = SyncServer::in_memory(options.server_config())?;
    server.initialize()?;

    let mut results = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let body = serde_json::to_vec(&step.body)?;
        let reply = server.handle_json(step.endpoint.into(), &body);
        let response = serde_json::from_slice(&reply.body)?;
        debug!(step = index + 1, endpoint = ?step.endpoint, status = reply.status, "Replayed step");
        results.push(StepResult {
            step: index + 1,
            endpoint: step.endpoint,
            status: reply.status,
            response,
        });
    }
    Ok(results)
}

/// Runs the replay command.
pub fn run(path: &Path, format: &str, options: &ReplayOptions) -> Result<(), ReplayError> {
    if format != "text" && format != "json" {
        return Err(ReplayError::Format(format.to_string()));
    }

    let steps = load(path)?;
    info!(steps = steps.len(), script = %path.display(), "Replaying script");
    let results = replay(&steps, options)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            println!("{}", render_text(result));
        }
        let failed = results.iter().filter(|r| r.status != 200).count();
        println!("{} steps, {} failed", results.len(), failed);
    }
    Ok(())
}

fn render_text(result: &StepResult) -> String {
    let endpoint = match result.endpoint {
        Endpoint::Push => "push",
        Endpoint::Pull => "pull",
    };
    format!(
        "[{}] {} {} {}",
        result.step, endpoint, result.status, result.response
    )
}
