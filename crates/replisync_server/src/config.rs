//! Server configuration.

use replisync_core::{GapPolicy, PushOptions, RetryConfig};

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of mutations accepted in one push.
    pub max_push_batch: usize,
    /// Retry behavior for store transactions.
    pub retry: RetryConfig,
    /// Handling of mutation ID gaps.
    pub gap_policy: GapPolicy,
    /// Whether to probe the store before every request.
    pub health_check: bool,
    /// Pokes buffered per subscriber before old ones are dropped.
    pub poke_capacity: usize,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_push_batch: 100,
            retry: RetryConfig::default(),
            gap_policy: GapPolicy::default(),
            health_check: true,
            poke_capacity: 64,
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the gap policy.
    pub fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// Enables or disables the pre-flight store probe.
    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Sets the per-subscriber poke buffer.
    pub fn with_poke_capacity(mut self, capacity: usize) -> Self {
        self.poke_capacity = capacity;
        self
    }

    /// Push options derived from this configuration.
    pub fn push_options(&self) -> PushOptions {
        PushOptions::default().with_gap_policy(self.gap_policy)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
