//! Schema bootstrap and migrations.
//!
//! Migrations are forward-only and run in order inside a single
//! transaction. The schema version marker records how many have been
//! applied, so running the bootstrap against an up-to-date store is a
//! no-op.

use crate::error::{StorageError, StorageResult};
use crate::store::StoreTransaction;
use tracing::{debug, info};

/// A migration step.
pub type MigrationFn = fn(&mut dyn StoreTransaction) -> StorageResult<()>;

/// A single numbered migration.
#[derive(Clone)]
pub struct Migration {
    /// Version reached after this migration (1-based, sequential).
    pub version: u32,
    /// Human-readable name.
    pub name: &'static str,
    /// The migration body.
    pub apply: MigrationFn,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish()
    }
}

/// Outcome of a bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Schema version found before the run.
    pub from_version: u32,
    /// Schema version after the run.
    pub to_version: u32,
    /// Names of the migrations applied, in order.
    pub applied: Vec<&'static str>,
}

fn create_sync_relations(tx: &mut dyn StoreTransaction) -> StorageResult<()> {
    tx.create_sync_relations()
}

/// Applies the registered migrations to a store.
#[derive(Debug, Clone)]
pub struct SchemaBootstrap {
    migrations: Vec<Migration>,
}

impl SchemaBootstrap {
    /// Creates a bootstrap with the sync relations migration.
    pub fn new() -> Self {
        Self {
            migrations: vec![Migration {
                version: 1,
                name: "create_sync_relations",
                apply: create_sync_relations,
            }],
        }
    }

    /// Appends a migration. Versions must stay sequential.
    pub fn with_migration(mut self, name: &'static str, apply: MigrationFn) -> Self {
        let version = self.latest_version() + 1;
        self.migrations.push(Migration {
            version,
            name,
            apply,
        });
        self
    }

    /// Returns the version reached once every migration has run.
    pub fn latest_version(&self) -> u32 {
        self.migrations.len() as u32
    }

    /// Returns the registered migrations.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Runs every pending migration inside `tx`.
    ///
    /// The caller owns the transaction and must commit it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnexpectedSchemaVersion`] when the store
    /// reports a version beyond the known migrations, and
    /// [`StorageError::Migration`] when a step fails for a reason other
    /// than a conflict or a lost connection.
    pub fn run(&self, tx: &mut dyn StoreTransaction) -> StorageResult<BootstrapReport> {
        let from_version = tx.schema_version()?;
        let known = self.latest_version();
        if from_version > known {
            return Err(StorageError::UnexpectedSchemaVersion {
                found: from_version,
                known,
            });
        }

        let mut applied = Vec::new();
        for migration in &self.migrations[from_version as usize..] {
            debug!(version = migration.version, name = migration.name, "Applying migration");
            (migration.apply)(tx).map_err(|err| {
                if err.is_retryable() || err.is_connection_failure() {
                    err
                } else {
                    StorageError::Migration {
                        version: migration.version,
                        message: err.to_string(),
                    }
                }
            })?;
            applied.push(migration.name);
        }

        if !applied.is_empty() {
            tx.set_schema_version(known)?;
            info!(from = from_version, to = known, "Schema migrated");
        }

        Ok(BootstrapReport {
            from_version,
            to_version: known,
            applied,
        })
    }
}

impl Default for SchemaBootstrap {
    fn default() -> Self {
        Self::new()
    }
}
