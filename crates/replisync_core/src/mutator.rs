//! Mutator registry and the transactional entry view handed to mutators.

use crate::entries;
use crate::error::{CoreError, CoreResult};
use replisync_storage::StoreTransaction;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A server-side mutation function.
///
/// Mutators must be deterministic functions of the transaction state and
/// their arguments: a retried batch reruns them from scratch.
pub type MutatorFn =
    Arc<dyn Fn(&mut WriteTransaction<'_>, &Value) -> CoreResult<()> + Send + Sync>;

/// Mapping from mutation name to mutator.
#[derive(Default, Clone)]
pub struct MutatorRegistry {
    mutators: HashMap<String, MutatorFn>,
}

impl MutatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mutator` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMutatorName`] for an empty name or one
    /// that is already registered.
    pub fn register<F>(&mut self, name: impl Into<String>, mutator: F) -> CoreResult<()>
    where
        F: Fn(&mut WriteTransaction<'_>, &Value) -> CoreResult<()> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() || self.mutators.contains_key(&name) {
            return Err(CoreError::InvalidMutatorName(name));
        }
        self.mutators.insert(name, Arc::new(mutator));
        Ok(())
    }

    /// Looks up a mutator.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownMutator`] if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> CoreResult<&MutatorFn> {
        self.mutators
            .get(name)
            .ok_or_else(|| CoreError::UnknownMutator(name.to_string()))
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.mutators.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.mutators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered mutators.
    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    /// Returns true if no mutators are registered.
    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

impl std::fmt::Debug for MutatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutatorRegistry")
            .field("mutators", &self.names())
            .finish()
    }
}

/// Pending writes of a push batch: `Some` is a put, `None` a delete.
pub(crate) type Overlay = BTreeMap<String, Option<Value>>;

/// Key/value view over one partition, valid for one push batch.
///
/// Reads see the batch's own earlier writes. Writes are buffered and reach
/// the store when the batch finishes, stamped with the new partition version.
pub struct WriteTransaction<'a> {
    tx: &'a mut dyn StoreTransaction,
    space_id: &'a str,
    overlay: &'a mut Overlay,
}

impl<'a> WriteTransaction<'a> {
    pub(crate) fn new(
        tx: &'a mut dyn StoreTransaction,
        space_id: &'a str,
        overlay: &'a mut Overlay,
    ) -> Self {
        Self {
            tx,
            space_id,
            overlay,
        }
    }

    /// Partition this view is scoped to.
    pub fn space_id(&self) -> &str {
        self.space_id
    }

    /// Reads a key.
    pub fn get(&mut self, key: &str) -> CoreResult<Option<Value>> {
        if let Some(pending) = self.overlay.get(key) {
            return Ok(pending.clone());
        }
        entries::get_value(&mut *self.tx, self.space_id, key)
    }

    /// Returns true if the key holds a live value.
    pub fn has(&mut self, key: &str) -> CoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Writes a key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> CoreResult<()> {
        self.overlay.insert(key.into(), Some(value));
        Ok(())
    }

    /// Deletes a key, leaving a tombstone if it was live.
    pub fn del(&mut self, key: impl Into<String>) -> CoreResult<()> {
        self.overlay.insert(key.into(), None);
        Ok(())
    }

    /// Live entries whose key starts with `prefix`, ordered by key.
    pub fn scan(&mut self, prefix: &str) -> CoreResult<Vec<(String, Value)>> {
        let mut merged: BTreeMap<String, Value> =
            entries::scan_values(&mut *self.tx, self.space_id, prefix)?
                .into_iter()
                .collect();
        for (key, pending) in self.overlay.iter().filter(|(k, _)| k.starts_with(prefix)) {
            match pending {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }
}
