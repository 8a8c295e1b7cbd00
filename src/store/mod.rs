//! The administrative surface of a table store.
//!
//! `TableStore` is the network boundary: everything above it (prober,
//! differ, provisioner, orchestrator) is store-agnostic. `DynamoStore`
//! in [`crate::client`] talks to a real endpoint; `memory::MemoryStore`
//! (feature `testing`) is an in-process stand-in with scripted faults.

#[cfg(any(test, feature = "testing"))]
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::StoreError;
use crate::schema::{KeyDef, TableSpec};

/// Lifecycle state of a table as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Creating,
    Active,
    Updating,
    Deleting,
    Other(String),
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableState::Creating => f.write_str("CREATING"),
            TableState::Active => f.write_str("ACTIVE"),
            TableState::Updating => f.write_str("UPDATING"),
            TableState::Deleting => f.write_str("DELETING"),
            TableState::Other(s) => f.write_str(s),
        }
    }
}

/// A table as it currently exists in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingTable {
    pub name: String,
    /// Partition (HASH) key.
    pub key: KeyDef,
    /// Sort (RANGE) key, if the table has one.
    pub range: Option<KeyDef>,
    pub state: TableState,
}

impl ExistingTable {
    pub fn new(name: impl Into<String>, key: KeyDef, state: TableState) -> Self {
        Self {
            name: name.into(),
            key,
            range: None,
            state,
        }
    }

    /// An `Active` table with the given key, the common case.
    pub fn active(name: impl Into<String>, key: KeyDef) -> Self {
        Self::new(name, key, TableState::Active)
    }

    pub fn with_range(mut self, range: KeyDef) -> Self {
        self.range = Some(range);
        self
    }

    /// True when the table is keyed by `key` alone.
    pub fn has_key_schema(&self, key: &KeyDef) -> bool {
        self.key == *key && self.range.is_none()
    }

    /// Key schema as `id:STRING`, or `id:STRING+sk:NUMBER` with a sort key.
    pub fn key_schema(&self) -> String {
        match &self.range {
            Some(range) => format!("{}+{}", self.key, range),
            None => self.key.to_string(),
        }
    }
}

/// Administrative calls the bootstrap needs. Each call is an independent
/// request/response; implementations must be safe to call concurrently.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Cheapest call that proves the endpoint is serving requests.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Names of every table, across all pages.
    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Current definition of `name`; `StoreErrorKind::NotFound` if absent.
    async fn describe_table(&self, name: &str) -> Result<ExistingTable, StoreError>;

    /// Issue a create for `spec`. Returns once the store accepted the
    /// request, not once the table is usable.
    async fn create_table(&self, spec: &TableSpec) -> Result<(), StoreError>;
}
