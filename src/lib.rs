//! Readiness-gated, idempotent table provisioning for DynamoDB-compatible
//! stores.
//!
//! A run probes the endpoint until it answers, snapshots the tables that
//! already exist, diffs them against a schema document and creates only
//! what is missing. Every outcome lands in a [`Report`].

pub mod backoff;
pub mod client;
pub mod config;
pub mod diff;
pub mod errors;
pub mod orchestrator;
pub mod probe;
pub mod provision;
pub mod report;
pub mod schema;
pub mod store;
pub mod table_operations;

pub use client::{ClientOptions, CredentialSource, DynamoStore};
pub use diff::{Action, ActionKind, diff};
pub use errors::{ConfigError, SchemaError, StoreError, StoreErrorKind};
pub use orchestrator::{Bootstrap, BootstrapConfig};
pub use probe::{ProbeConfig, ProbeResult, probe};
pub use provision::{ProvisionConfig, Provisioner};
pub use report::{ActionReport, Failure, FailureKind, Outcome, Report, ReportFormat, RunStatus};
pub use schema::{Descriptor, KeyDef, KeyType, TableSpec};
pub use store::{ExistingTable, TableState, TableStore};
