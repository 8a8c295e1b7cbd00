//! Desired-vs-existing reconciliation.
//!
//! `diff` turns a descriptor and a snapshot of the store into one action per
//! desired table, in descriptor order. Key schema cannot be changed once a
//! table exists, so a mismatch is surfaced as a `Conflict` for a human to
//! resolve rather than fixed automatically.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::schema::{Descriptor, KeyDef, TableSpec};
use crate::store::ExistingTable;

pub const ALREADY_PROVISIONED: &str = "already provisioned";

/// What to do about one desired table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Create(TableSpec),
    Skip {
        name: String,
        reason: String,
    },
    Conflict {
        name: String,
        expected: KeyDef,
        /// Existing key schema, sort key included.
        actual: String,
    },
}

/// Action discriminant, as shown in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Skip,
    Conflict,
    /// No action was decided because the existing schema could not be read.
    Unresolved,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionKind::Create => "create",
            ActionKind::Skip => "skip",
            ActionKind::Conflict => "conflict",
            ActionKind::Unresolved => "unresolved",
        })
    }
}

impl Action {
    pub fn table(&self) -> &str {
        match self {
            Action::Create(spec) => spec.name(),
            Action::Skip { name, .. } | Action::Conflict { name, .. } => name,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Create(_) => ActionKind::Create,
            Action::Skip { .. } => ActionKind::Skip,
            Action::Conflict { .. } => ActionKind::Conflict,
        }
    }
}

/// Compute the actions that bring `existing` in line with `desired`.
///
/// Tables present in the store but absent from `desired` are ignored.
pub fn diff(desired: &Descriptor, existing: &[ExistingTable]) -> Vec<Action> {
    let by_name: HashMap<&str, &ExistingTable> =
        existing.iter().map(|t| (t.name.as_str(), t)).collect();

    desired
        .tables()
        .iter()
        .map(|spec| match by_name.get(spec.name()) {
            None => Action::Create(spec.clone()),
            Some(current) if current.has_key_schema(spec.key()) => Action::Skip {
                name: spec.name().to_string(),
                reason: ALREADY_PROVISIONED.to_string(),
            },
            Some(current) => Action::Conflict {
                name: spec.name().to_string(),
                expected: spec.key().clone(),
                actual: current.key_schema(),
            },
        })
        .collect()
}
