//! Process-wide store handle with lazy initialisation.

use crate::error::{StorageError, StorageResult};
use crate::schema::{BootstrapReport, SchemaBootstrap};
use crate::store::{Store, TxMode};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Attempts allowed for the bootstrap transaction before giving up.
const BOOTSTRAP_ATTEMPTS: u32 = 10;

/// Opens connections to the authoritative store.
pub trait StoreConnector: Send + Sync {
    /// Connects to the store.
    ///
    /// # Errors
    ///
    /// Returns a connection-class error if the store is unreachable.
    fn connect(&self) -> StorageResult<Arc<dyn Store>>;
}

impl<F> StoreConnector for F
where
    F: Fn() -> StorageResult<Arc<dyn Store>> + Send + Sync,
{
    fn connect(&self) -> StorageResult<Arc<dyn Store>> {
        self()
    }
}

/// Connector that always hands out the same store instance.
pub struct SharedStoreConnector {
    store: Arc<dyn Store>,
}

impl SharedStoreConnector {
    /// Wraps an existing store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl StoreConnector for SharedStoreConnector {
    fn connect(&self) -> StorageResult<Arc<dyn Store>> {
        self.store.ping()?;
        Ok(Arc::clone(&self.store))
    }
}

/// Lazily-initialised, reinitialisable handle to the store.
///
/// The first [`acquire`](Self::acquire) connects and runs the schema
/// bootstrap; later calls reuse the connected store. When a request sees
/// a connection-class failure it calls [`invalidate`](Self::invalidate),
/// and the next `acquire` reconnects. In-flight work holding an older
/// handle is not interrupted.
pub struct StorePool {
    connector: Box<dyn StoreConnector>,
    bootstrap: SchemaBootstrap,
    current: Mutex<Option<Arc<dyn Store>>>,
    generation: AtomicU64,
}

impl StorePool {
    /// Creates a pool over `connector` with the default schema bootstrap.
    pub fn new(connector: impl StoreConnector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            bootstrap: SchemaBootstrap::new(),
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Creates a pool that always connects to `store`.
    pub fn from_store(store: Arc<dyn Store>) -> Self {
        Self::new(SharedStoreConnector::new(store))
    }

    /// Replaces the schema bootstrap.
    pub fn with_bootstrap(mut self, bootstrap: SchemaBootstrap) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Returns the connected store, connecting and bootstrapping if needed.
    ///
    /// # Errors
    ///
    /// Returns the connect or bootstrap failure. A failed initialisation
    /// leaves the pool empty so the next call tries again.
    pub fn acquire(&self) -> StorageResult<Arc<dyn Store>> {
        let mut current = self.current.lock();
        if let Some(store) = current.as_ref() {
            return Ok(Arc::clone(store));
        }

        info!("Initializing store pool");
        let store = self.connector.connect().map_err(|err| {
            error!(error = %err, "Failed to connect to store");
            err
        })?;
        let report = self.run_bootstrap(store.as_ref())?;
        info!(
            schema_version = report.to_version,
            applied = report.applied.len(),
            "Store pool initialized"
        );

        *current = Some(Arc::clone(&store));
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(store)
    }

    /// Connects eagerly. Equivalent to calling `acquire` and dropping the handle.
    pub fn initialize(&self) -> StorageResult<()> {
        self.acquire().map(|_| ())
    }

    /// Drops the current store so the next `acquire` reconnects.
    pub fn invalidate(&self) {
        if self.current.lock().take().is_some() {
            warn!("Store pool invalidated, will reconnect on next use");
        }
    }

    /// Number of successful (re)initialisations so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Probes the store, reconnecting if the pool is empty.
    ///
    /// A failed probe invalidates the pool.
    pub fn is_healthy(&self) -> bool {
        match self.acquire().and_then(|store| store.ping()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "Store health check failed");
                if err.is_connection_failure() {
                    self.invalidate();
                }
                false
            }
        }
    }

    fn run_bootstrap(&self, store: &dyn Store) -> StorageResult<BootstrapReport> {
        let mut last = StorageError::SerializationFailure;
        for attempt in 1..=BOOTSTRAP_ATTEMPTS {
            let mut tx = store.begin(TxMode::ReadWrite)?;
            let result = self.bootstrap.run(tx.as_mut());
            let outcome = match result {
                Ok(report) => tx.commit().map(|()| report),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        warn!(error = %rollback_err, "Rollback after failed bootstrap failed");
                    }
                    Err(err)
                }
            };
            match outcome {
                Ok(report) => return Ok(report),
                Err(err) if err.is_retryable() => {
                    warn!(attempt, error = %err, "Retrying schema bootstrap");
                    last = err;
                }
                Err(err) => {
                    error!(error = %err, "Schema bootstrap failed");
                    return Err(err);
                }
            }
        }
        Err(last)
    }
}

impl std::fmt::Debug for StorePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePool")
            .field("connected", &self.current.lock().is_some())
            .field("generation", &self.generation())
            .finish()
    }
}
