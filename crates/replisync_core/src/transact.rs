//! Transaction retry executor.

use crate::config::RetryConfig;
use crate::error::{CoreError, CoreResult};
use crate::retry::{retry, Attempt, RetryError, Sleeper, ThreadSleeper};
use replisync_storage::{StorePool, StoreTransaction, TxMode};
use tracing::{debug, error, warn};

/// Runs `body` inside a serializable transaction, retrying on conflicts.
///
/// Each attempt begins a fresh transaction, runs `body` and commits. Any
/// error rolls the attempt back. Serialization failures and deadlocks rerun
/// `body` from scratch; other errors propagate after a single rollback.
///
/// # Errors
///
/// - [`CoreError::TransactionExhausted`] when every attempt conflicted
/// - [`CoreError::StoreUnavailable`] when the store cannot be reached; the
///   pool is invalidated so the next request reconnects
/// - Whatever `body` returned otherwise
pub fn transact<R, F>(
    pool: &StorePool,
    config: &RetryConfig,
    mode: TxMode,
    body: F,
) -> CoreResult<R>
where
    F: FnMut(&mut dyn StoreTransaction) -> CoreResult<R>,
{
    transact_with(pool, config, &ThreadSleeper, mode, body)
}

/// Like [`transact`], with an explicit sleeper between attempts.
pub fn transact_with<R, F>(
    pool: &StorePool,
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mode: TxMode,
    mut body: F,
) -> CoreResult<R>
where
    F: FnMut(&mut dyn StoreTransaction) -> CoreResult<R>,
{
    let result = retry(config, sleeper, |attempt| {
        let outcome = run_once(pool, mode, &mut body);
        if let Err(err) = &outcome {
            debug!(attempt, error = %err, "Transaction attempt failed");
        }
        Attempt::classify(outcome, CoreError::is_retryable)
    });

    match result {
        Ok(value) => Ok(value),
        Err(RetryError::Exhausted { attempts, last }) => {
            error!(attempts, error = %last, "Transaction retry budget exhausted");
            Err(CoreError::TransactionExhausted {
                attempts,
                last: last.to_string(),
            })
        }
        Err(RetryError::Fatal(err)) if err.is_connection_failure() => {
            warn!(error = %err, "Store connection failed, invalidating pool");
            pool.invalidate();
            Err(CoreError::StoreUnavailable(err.to_string()))
        }
        Err(RetryError::Fatal(err)) => Err(err),
    }
}

fn run_once<R, F>(pool: &StorePool, mode: TxMode, body: &mut F) -> CoreResult<R>
where
    F: FnMut(&mut dyn StoreTransaction) -> CoreResult<R>,
{
    let store = pool.acquire()?;
    let mut tx = store.begin(mode)?;
    match body(tx.as_mut()) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
