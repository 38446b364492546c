//! In-memory serializable store.

use crate::error::{StorageError, StorageResult};
use crate::rows::{ClientRow, EntryRow, SpaceRow};
use crate::store::{Store, StoreTransaction, TxMode};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SPACE_RELATION: &str = "replisync_space";
const CLIENT_RELATION: &str = "replisync_client";
const ENTRY_RELATION: &str = "replisync_entry";

/// A failure to inject into upcoming commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// Commit fails with [`StorageError::SerializationFailure`].
    SerializationFailure,
    /// Commit fails with [`StorageError::Deadlock`].
    Deadlock,
    /// Commit fails with [`StorageError::ConnectionLost`].
    ConnectionLost,
}

impl InjectedFault {
    fn into_error(self) -> StorageError {
        match self {
            InjectedFault::SerializationFailure => StorageError::SerializationFailure,
            InjectedFault::Deadlock => StorageError::Deadlock,
            InjectedFault::ConnectionLost => {
                StorageError::ConnectionLost("injected connection failure".into())
            }
        }
    }
}

/// Committed contents of the store.
#[derive(Debug, Clone, Default)]
struct Tables {
    relations: bool,
    schema_version: u32,
    spaces: BTreeMap<String, SpaceRow>,
    clients: BTreeMap<String, ClientRow>,
    entries: BTreeMap<(String, String), EntryRow>,
}

/// A single row observed or written by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Schema,
    Space(String),
    Client(String),
    Entry(String, String),
}

/// A range read whose result a later commit could change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Predicate {
    SpaceEntries(String),
    ClientGroup(String),
}

/// A row written by a committed transaction.
#[derive(Debug, Clone)]
enum WrittenRow {
    Schema,
    Space(String),
    /// Client rows carry every group they belonged to before or after the write.
    Client { id: String, groups: Vec<String> },
    Entry(String, String),
}

impl WrittenRow {
    fn touches(&self, key: &RowKey) -> bool {
        match (self, key) {
            (WrittenRow::Schema, RowKey::Schema) => true,
            (WrittenRow::Space(a), RowKey::Space(b)) => a == b,
            (WrittenRow::Client { id, .. }, RowKey::Client(b)) => id == b,
            (WrittenRow::Entry(s, k), RowKey::Entry(s2, k2)) => s == s2 && k == k2,
            _ => false,
        }
    }

    fn matches(&self, predicate: &Predicate) -> bool {
        match (self, predicate) {
            (WrittenRow::Entry(s, _), Predicate::SpaceEntries(space)) => s == space,
            (WrittenRow::Client { groups, .. }, Predicate::ClientGroup(group)) => {
                groups.iter().any(|g| g == group)
            }
            // Creating the relations changes every scan result.
            (WrittenRow::Schema, _) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
struct CommitRecord {
    seq: u64,
    rows: Vec<WrittenRow>,
}

#[derive(Debug, Default)]
struct State {
    tables: Arc<Tables>,
    seq: u64,
    log: VecDeque<CommitRecord>,
    active: BTreeMap<u64, u64>,
    next_txid: u64,
    faults: VecDeque<InjectedFault>,
    commits: u64,
    conflicts: u64,
}

impl State {
    /// Drops commit records no active transaction can conflict with.
    fn prune(&mut self) {
        match self.active.values().min().copied() {
            Some(oldest) => {
                while self.log.front().is_some_and(|r| r.seq <= oldest) {
                    self.log.pop_front();
                }
            }
            None => self.log.clear(),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    available: AtomicBool,
}

/// An in-memory store with serializable transactions.
///
/// Transactions read from a snapshot taken at `begin` and buffer their
/// writes. At commit, a read-write transaction is validated against every
/// transaction that committed after it began: if any of them wrote a row
/// this transaction read or writes, or a row matching one of its range
/// scans, the commit fails with [`StorageError::SerializationFailure`].
/// Read-only transactions always observe a consistent committed prefix and
/// never fail validation.
///
/// Suitable for tests and single-process deployments. The store also
/// supports fault injection so retry and availability handling can be
/// exercised deterministically.
///
/// # Example
///
/// ```rust
/// use replisync_storage::{InMemoryStore, Store, TxMode, SpaceRow};
///
/// let store = InMemoryStore::new();
/// let mut tx = store.begin(TxMode::ReadWrite).unwrap();
/// tx.create_sync_relations().unwrap();
/// tx.put_space(SpaceRow::new("p1")).unwrap();
/// tx.commit().unwrap();
///
/// let mut tx = store.begin(TxMode::ReadOnly).unwrap();
/// assert_eq!(tx.get_space("p1").unwrap().unwrap().version, 0);
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates an empty, un-bootstrapped store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    next_txid: 1,
                    ..State::default()
                }),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Makes the next `times` commits fail with `fault`.
    pub fn fail_next_commits(&self, fault: InjectedFault, times: usize) {
        let mut state = self.shared.state.lock();
        for _ in 0..times {
            state.faults.push_back(fault);
        }
    }

    /// Simulates the store going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Returns whether the store currently accepts connections.
    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::SeqCst)
    }

    /// Number of successful commits that wrote at least one row.
    pub fn commit_count(&self) -> u64 {
        self.shared.state.lock().commits
    }

    /// Number of commits rejected by conflict validation.
    pub fn conflict_count(&self) -> u64 {
        self.shared.state.lock().conflicts
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for InMemoryStore {
    fn begin(&self, mode: TxMode) -> StorageResult<Box<dyn StoreTransaction>> {
        if !self.is_available() {
            return Err(StorageError::Unavailable("in-memory store is offline".into()));
        }

        let mut state = self.shared.state.lock();
        let txid = state.next_txid;
        state.next_txid += 1;
        let start_seq = state.seq;
        state.active.insert(txid, start_seq);

        Ok(Box::new(MemTransaction {
            shared: Arc::clone(&self.shared),
            txid,
            mode,
            start_seq,
            snapshot: Arc::clone(&state.tables),
            writes: PendingWrites::default(),
            reads: HashSet::new(),
            scans: HashSet::new(),
            closed: false,
        }))
    }

    fn ping(&self) -> StorageResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StorageError::Unavailable("in-memory store is offline".into()))
        }
    }
}

#[derive(Debug, Default)]
struct PendingWrites {
    relations: bool,
    schema_version: Option<u32>,
    spaces: BTreeMap<String, SpaceRow>,
    clients: BTreeMap<String, ClientRow>,
    entries: BTreeMap<(String, String), EntryRow>,
}

impl PendingWrites {
    fn is_empty(&self) -> bool {
        !self.relations
            && self.schema_version.is_none()
            && self.spaces.is_empty()
            && self.clients.is_empty()
            && self.entries.is_empty()
    }

    fn keys(&self) -> impl Iterator<Item = RowKey> + '_ {
        let schema = (self.relations || self.schema_version.is_some()).then_some(RowKey::Schema);
        schema
            .into_iter()
            .chain(self.spaces.keys().map(|id| RowKey::Space(id.clone())))
            .chain(self.clients.keys().map(|id| RowKey::Client(id.clone())))
            .chain(
                self.entries
                    .keys()
                    .map(|(s, k)| RowKey::Entry(s.clone(), k.clone())),
            )
    }
}

struct MemTransaction {
    shared: Arc<Shared>,
    txid: u64,
    mode: TxMode,
    start_seq: u64,
    snapshot: Arc<Tables>,
    writes: PendingWrites,
    reads: HashSet<RowKey>,
    scans: HashSet<Predicate>,
    closed: bool,
}

impl MemTransaction {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::TransactionClosed);
        }
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionLost(
                "in-memory store went offline".into(),
            ));
        }
        Ok(())
    }

    fn ensure_relation(&self, relation: &'static str) -> StorageResult<()> {
        if self.snapshot.relations || self.writes.relations {
            Ok(())
        } else {
            Err(StorageError::MissingRelation(relation))
        }
    }

    fn ensure_writable(&self, relation: &'static str) -> StorageResult<()> {
        self.ensure_open()?;
        if self.mode == TxMode::ReadOnly {
            return Err(StorageError::ReadOnlyTransaction);
        }
        self.ensure_relation(relation)
    }

    fn conflicts_with(&self, row: &WrittenRow) -> bool {
        self.reads.iter().any(|key| row.touches(key))
            || self.scans.iter().any(|predicate| row.matches(predicate))
            || self.writes.keys().any(|key| row.touches(&key))
    }

    /// Merges snapshot rows of one partition with this transaction's writes.
    fn merged_entries(&self, space_id: &str) -> BTreeMap<String, EntryRow> {
        let start = (space_id.to_string(), String::new());
        let mut merged: BTreeMap<String, EntryRow> = self
            .snapshot
            .entries
            .range(start.clone()..)
            .take_while(|((space, _), _)| space == space_id)
            .map(|((_, key), row)| (key.clone(), row.clone()))
            .collect();
        for ((_, key), row) in self
            .writes
            .entries
            .range(start..)
            .take_while(|((space, _), _)| space == space_id)
        {
            merged.insert(key.clone(), row.clone());
        }
        merged
    }

    fn written_rows(&self) -> Vec<WrittenRow> {
        let mut rows = Vec::new();
        if self.writes.relations || self.writes.schema_version.is_some() {
            rows.push(WrittenRow::Schema);
        }
        rows.extend(self.writes.spaces.keys().cloned().map(WrittenRow::Space));
        for (id, row) in &self.writes.clients {
            let mut groups = vec![row.client_group_id.clone()];
            if let Some(previous) = self.snapshot.clients.get(id) {
                if previous.client_group_id != row.client_group_id {
                    groups.push(previous.client_group_id.clone());
                }
            }
            rows.push(WrittenRow::Client {
                id: id.clone(),
                groups,
            });
        }
        rows.extend(
            self.writes
                .entries
                .keys()
                .map(|(s, k)| WrittenRow::Entry(s.clone(), k.clone())),
        );
        rows
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.shared.state.lock();
            state.active.remove(&self.txid);
            state.prune();
        }
    }
}

impl StoreTransaction for MemTransaction {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn get_space(&mut self, space_id: &str) -> StorageResult<Option<SpaceRow>> {
        self.ensure_open()?;
        self.ensure_relation(SPACE_RELATION)?;
        self.reads.insert(RowKey::Space(space_id.to_string()));
        Ok(self
            .writes
            .spaces
            .get(space_id)
            .or_else(|| self.snapshot.spaces.get(space_id))
            .cloned())
    }

    fn put_space(&mut self, row: SpaceRow) -> StorageResult<()> {
        self.ensure_writable(SPACE_RELATION)?;
        self.writes.spaces.insert(row.id.clone(), row);
        Ok(())
    }

    fn get_client(&mut self, client_id: &str) -> StorageResult<Option<ClientRow>> {
        self.ensure_open()?;
        self.ensure_relation(CLIENT_RELATION)?;
        self.reads.insert(RowKey::Client(client_id.to_string()));
        Ok(self
            .writes
            .clients
            .get(client_id)
            .or_else(|| self.snapshot.clients.get(client_id))
            .cloned())
    }

    fn put_client(&mut self, row: ClientRow) -> StorageResult<()> {
        self.ensure_writable(CLIENT_RELATION)?;
        self.writes.clients.insert(row.id.clone(), row);
        Ok(())
    }

    fn clients_in_group(&mut self, client_group_id: &str) -> StorageResult<Vec<ClientRow>> {
        self.ensure_open()?;
        self.ensure_relation(CLIENT_RELATION)?;
        self.scans
            .insert(Predicate::ClientGroup(client_group_id.to_string()));

        let mut merged: BTreeMap<&str, &ClientRow> = self
            .snapshot
            .clients
            .values()
            .filter(|row| !self.writes.clients.contains_key(&row.id))
            .filter(|row| row.client_group_id == client_group_id)
            .map(|row| (row.id.as_str(), row))
            .collect();
        for row in self.writes.clients.values() {
            if row.client_group_id == client_group_id {
                merged.insert(row.id.as_str(), row);
            }
        }
        Ok(merged.into_values().cloned().collect())
    }

    fn get_entry(&mut self, space_id: &str, key: &str) -> StorageResult<Option<EntryRow>> {
        self.ensure_open()?;
        self.ensure_relation(ENTRY_RELATION)?;
        let id = (space_id.to_string(), key.to_string());
        let row = self
            .writes
            .entries
            .get(&id)
            .or_else(|| self.snapshot.entries.get(&id))
            .cloned();
        self.reads.insert(RowKey::Entry(id.0, id.1));
        Ok(row)
    }

    fn put_entry(&mut self, row: EntryRow) -> StorageResult<()> {
        self.ensure_writable(ENTRY_RELATION)?;
        self.writes
            .entries
            .insert((row.space_id.clone(), row.key.clone()), row);
        Ok(())
    }

    fn entries_since(&mut self, space_id: &str, since: u64) -> StorageResult<Vec<EntryRow>> {
        self.ensure_open()?;
        self.ensure_relation(ENTRY_RELATION)?;
        self.scans
            .insert(Predicate::SpaceEntries(space_id.to_string()));
        Ok(self
            .merged_entries(space_id)
            .into_values()
            .filter(|row| row.version > since)
            .collect())
    }

    fn live_entries(&mut self, space_id: &str, prefix: &str) -> StorageResult<Vec<EntryRow>> {
        self.ensure_open()?;
        self.ensure_relation(ENTRY_RELATION)?;
        self.scans
            .insert(Predicate::SpaceEntries(space_id.to_string()));
        Ok(self
            .merged_entries(space_id)
            .into_values()
            .filter(|row| !row.state.is_deleted() && row.key.starts_with(prefix))
            .collect())
    }

    fn schema_version(&mut self) -> StorageResult<u32> {
        self.ensure_open()?;
        self.reads.insert(RowKey::Schema);
        Ok(self
            .writes
            .schema_version
            .unwrap_or(self.snapshot.schema_version))
    }

    fn set_schema_version(&mut self, version: u32) -> StorageResult<()> {
        self.ensure_open()?;
        if self.mode == TxMode::ReadOnly {
            return Err(StorageError::ReadOnlyTransaction);
        }
        self.writes.schema_version = Some(version);
        Ok(())
    }

    fn create_sync_relations(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.mode == TxMode::ReadOnly {
            return Err(StorageError::ReadOnlyTransaction);
        }
        if !self.snapshot.relations {
            self.writes.relations = true;
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.ensure_open()?;
        self.closed = true;

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        state.active.remove(&self.txid);

        if let Some(fault) = state.faults.pop_front() {
            state.prune();
            return Err(fault.into_error());
        }

        if self.writes.is_empty() {
            state.prune();
            return Ok(());
        }

        let conflict = state
            .log
            .iter()
            .filter(|record| record.seq > self.start_seq)
            .any(|record| record.rows.iter().any(|row| self.conflicts_with(row)));
        if conflict {
            state.conflicts += 1;
            state.prune();
            return Err(StorageError::SerializationFailure);
        }

        let rows = self.written_rows();
        let writes = std::mem::take(&mut self.writes);
        let tables = Arc::make_mut(&mut state.tables);
        if writes.relations {
            tables.relations = true;
        }
        if let Some(version) = writes.schema_version {
            tables.schema_version = version;
        }
        tables.spaces.extend(writes.spaces);
        tables.clients.extend(writes.clients);
        tables.entries.extend(writes.entries);

        state.seq += 1;
        state.commits += 1;
        let seq = state.seq;
        state.log.push_back(CommitRecord { seq, rows });
        state.prune();
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::TransactionClosed);
        }
        self.release();
        Ok(())
    }
}

impl Drop for MemTransaction {
    fn drop(&mut self) {
        self.release();
    }
}
