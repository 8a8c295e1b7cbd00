//! In-process table store.
//!
//! Behaves like an empty DynamoDB Local instance and can be scripted to
//! misbehave: refuse or garble pings, fail listings or specific creates, keep new
//! tables in `CREATING`, or lose a create race to another writer. Call
//! counters let callers assert how many requests were actually issued.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ExistingTable, TableState, TableStore};
use crate::errors::StoreError;
use crate::schema::{KeyDef, TableSpec};

#[derive(Debug)]
struct StoredTable {
    key: KeyDef,
    range: Option<KeyDef>,
    state: TableState,
    /// Describes left before a `Creating` table flips to `Active`.
    pending_polls: u32,
}

#[derive(Debug, Default)]
struct Script {
    /// Remaining pings to reject.
    refuse_pings: Option<u32>,
    refuse_forever: bool,
    ping_faults: VecDeque<StoreError>,
    list_faults: VecDeque<StoreError>,
    create_faults: HashMap<String, VecDeque<StoreError>>,
    /// Tables another writer creates just before our create lands.
    races: HashMap<String, KeyDef>,
    activation_polls: u32,
    create_latency: Option<Duration>,
    describe_latency: Option<Duration>,
}

/// Thread-safe, in-memory [`TableStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, StoredTable>>,
    script: Mutex<Script>,
    ping_calls: AtomicU32,
    describe_calls: AtomicU32,
    create_calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing `Active` table.
    pub fn with_table(self, name: &str, key: KeyDef) -> Self {
        lock(&self.tables).insert(
            name.to_string(),
            StoredTable {
                key,
                range: None,
                state: TableState::Active,
                pending_polls: 0,
            },
        );
        self
    }

    /// Seed an existing `Active` table with a sort key.
    pub fn with_composite_table(self, name: &str, key: KeyDef, range: KeyDef) -> Self {
        lock(&self.tables).insert(
            name.to_string(),
            StoredTable {
                key,
                range: Some(range),
                state: TableState::Active,
                pending_polls: 0,
            },
        );
        self
    }

    /// Answer the next pings with `errors`, in order.
    pub fn failing_pings(self, errors: Vec<StoreError>) -> Self {
        lock(&self.script).ping_faults.extend(errors);
        self
    }

    /// Answer the next table listings with `errors`, in order.
    pub fn failing_lists(self, errors: Vec<StoreError>) -> Self {
        lock(&self.script).list_faults.extend(errors);
        self
    }

    /// Every describe takes `latency` before answering.
    pub fn with_describe_latency(self, latency: Duration) -> Self {
        lock(&self.script).describe_latency = Some(latency);
        self
    }

    /// Reject the first `attempts` pings with a connection error.
    pub fn refusing_pings(self, attempts: u32) -> Self {
        lock(&self.script).refuse_pings = Some(attempts);
        self
    }

    /// Reject every ping.
    pub fn never_ready(self) -> Self {
        lock(&self.script).refuse_forever = true;
        self
    }

    /// Fail the next creates of `table` with `errors`, in order.
    pub fn failing_creates(self, table: &str, errors: Vec<StoreError>) -> Self {
        lock(&self.script)
            .create_faults
            .entry(table.to_string())
            .or_default()
            .extend(errors);
        self
    }

    /// Have another writer create `table` with `key` right before ours.
    pub fn losing_race(self, table: &str, key: KeyDef) -> Self {
        lock(&self.script).races.insert(table.to_string(), key);
        self
    }

    /// New tables stay `Creating` for `polls` describes.
    pub fn activating_after(self, polls: u32) -> Self {
        lock(&self.script).activation_polls = polls;
        self
    }

    /// Every create takes `latency` before answering.
    pub fn with_create_latency(self, latency: Duration) -> Self {
        lock(&self.script).create_latency = Some(latency);
        self
    }

    pub fn ping_calls(&self) -> u32 {
        self.ping_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> u32 {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Create requests received for `table`, including failed ones.
    pub fn create_calls(&self, table: &str) -> u32 {
        lock(&self.create_calls).get(table).copied().unwrap_or(0)
    }

    pub fn total_create_calls(&self) -> u32 {
        lock(&self.create_calls).values().sum()
    }

    /// Highest number of creates observed in flight at once.
    pub fn peak_concurrent_creates(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn table_names(&self) -> Vec<String> {
        lock(&self.tables).keys().cloned().collect()
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = lock(&self.script);
        if let Some(err) = script.ping_faults.pop_front() {
            return Err(err);
        }
        if script.refuse_forever {
            return Err(StoreError::transient("Connection refused"));
        }
        match script.refuse_pings {
            Some(n) if n > 0 => {
                script.refuse_pings = Some(n - 1);
                Err(StoreError::transient("Connection refused"))
            }
            _ => Ok(()),
        }
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let fault = lock(&self.script).list_faults.pop_front();
        match fault {
            Some(err) => Err(err),
            None => Ok(self.table_names()),
        }
    }

    async fn describe_table(&self, name: &str) -> Result<ExistingTable, StoreError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let latency = lock(&self.script).describe_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut tables = lock(&self.tables);
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(name))?;

        if table.state == TableState::Creating {
            if table.pending_polls == 0 {
                table.state = TableState::Active;
            } else {
                table.pending_polls -= 1;
            }
        }
        let mut existing = ExistingTable::new(name, table.key.clone(), table.state.clone());
        existing.range = table.range.clone();
        Ok(existing)
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        *lock(&self.create_calls)
            .entry(spec.name().to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = lock(&self.script).create_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.apply_create(spec);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl MemoryStore {
    fn apply_create(&self, spec: &TableSpec) -> Result<(), StoreError> {
        let (fault, race, activation_polls) = {
            let mut script = lock(&self.script);
            let fault = script
                .create_faults
                .get_mut(spec.name())
                .and_then(VecDeque::pop_front);
            let race = script.races.remove(spec.name());
            (fault, race, script.activation_polls)
        };
        if let Some(err) = fault {
            return Err(err);
        }

        let mut tables = lock(&self.tables);
        if let Some(key) = race {
            tables.insert(
                spec.name().to_string(),
                StoredTable {
                    key,
                    range: None,
                    state: TableState::Active,
                    pending_polls: 0,
                },
            );
        }
        if tables.contains_key(spec.name()) {
            return Err(StoreError::in_use(spec.name()));
        }

        let state = if activation_polls > 0 {
            TableState::Creating
        } else {
            TableState::Active
        };
        tables.insert(
            spec.name().to_string(),
            StoredTable {
                key: spec.key().clone(),
                range: None,
                state,
                pending_polls: activation_polls,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreErrorKind;
    use crate::schema::KeyType;

    fn users() -> TableSpec {
        TableSpec::new("users", "id", KeyType::String, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn create_then_describe() {
        let store = MemoryStore::new();
        store.create_table(&users()).await.unwrap();

        let table = store.describe_table("users").await.unwrap();
        assert_eq!(table.key, KeyDef::new("id", KeyType::String));
        assert_eq!(table.state, TableState::Active);
        assert_eq!(store.list_tables().await.unwrap(), ["users"]);
    }

    #[tokio::test]
    async fn duplicate_create_is_in_use() {
        let store = MemoryStore::new();
        store.create_table(&users()).await.unwrap();
        let err = store.create_table(&users()).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::InUse);
        assert_eq!(store.create_calls("users"), 2);
    }

    #[tokio::test]
    async fn refused_pings_recover() {
        let store = MemoryStore::new().refusing_pings(2);
        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_ok());
        assert_eq!(store.ping_calls(), 3);
    }

    #[tokio::test]
    async fn activation_takes_the_scripted_number_of_polls() {
        let store = MemoryStore::new().activating_after(2);
        store.create_table(&users()).await.unwrap();

        assert_eq!(store.describe_table("users").await.unwrap().state, TableState::Creating);
        assert_eq!(store.describe_table("users").await.unwrap().state, TableState::Creating);
        assert_eq!(store.describe_table("users").await.unwrap().state, TableState::Active);
    }

    #[tokio::test]
    async fn describe_missing_is_not_found() {
        let err = MemoryStore::new().describe_table("ghost").await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::NotFound);
    }
}
