//! Sync engine facade.

use crate::config::{PushOptions, RetryConfig};
use crate::error::CoreResult;
use crate::mutator::MutatorRegistry;
use crate::notify::{ChangeNotifier, NoopNotifier};
use crate::pull::compute_pull;
use crate::push::{process_push, PushOutcome};
use crate::retry::{Sleeper, ThreadSleeper};
use crate::transact::transact_with;
use replisync_protocol::{PullRequest, PullResponse, PushRequest};
use replisync_storage::{StorePool, TxMode};
use std::sync::Arc;
use tracing::{debug, info};

/// Push and pull over a shared store.
///
/// The engine holds no partition state of its own; every call reads the
/// store inside a fresh transaction, so any number of engines (or server
/// instances) can share one store.
pub struct SyncEngine {
    pool: Arc<StorePool>,
    registry: Arc<MutatorRegistry>,
    notifier: Arc<dyn ChangeNotifier>,
    retry: RetryConfig,
    push_options: PushOptions,
    sleeper: Arc<dyn Sleeper + Send + Sync>,
}

impl SyncEngine {
    /// Creates an engine with default retry and push options and no notifier.
    pub fn new(pool: Arc<StorePool>, registry: MutatorRegistry) -> Self {
        Self {
            pool,
            registry: Arc::new(registry),
            notifier: Arc::new(NoopNotifier),
            retry: RetryConfig::default(),
            push_options: PushOptions::default(),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Sets the change notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the push options.
    pub fn with_push_options(mut self, options: PushOptions) -> Self {
        self.push_options = options;
        self
    }

    /// Sets the sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper + Send + Sync>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns the store pool.
    pub fn pool(&self) -> &Arc<StorePool> {
        &self.pool
    }

    /// Returns the mutator registry.
    pub fn registry(&self) -> &MutatorRegistry {
        &self.registry
    }

    /// Applies a push batch in one retried transaction.
    ///
    /// Pokes the notifier after commit if any mutation ran.
    pub fn push(&self, request: &PushRequest) -> CoreResult<PushOutcome> {
        debug!(
            space_id = %request.space_id,
            client_group_id = %request.client_group_id,
            mutations = request.mutations.len(),
            "Processing push"
        );
        let outcome = transact_with(
            &self.pool,
            &self.retry,
            self.sleeper.as_ref(),
            TxMode::ReadWrite,
            |tx| process_push(tx, &self.registry, &self.push_options, request),
        )?;

        if outcome.applied > 0 {
            info!(
                space_id = %outcome.space_id,
                version = outcome.version,
                applied = outcome.applied,
                "Push committed"
            );
            self.notifier.notify(&outcome.space_id);
        }
        Ok(outcome)
    }

    /// Computes a pull response from a consistent snapshot.
    pub fn pull(&self, request: &PullRequest) -> CoreResult<PullResponse> {
        transact_with(
            &self.pool,
            &self.retry,
            self.sleeper.as_ref(),
            TxMode::ReadOnly,
            |tx| compute_pull(tx, request),
        )
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("pool", &self.pool)
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("push_options", &self.push_options)
            .finish()
    }
}
