//! Desired-state schema model.
//!
//! This module provides:
//! - `KeyType`, `KeyDef` - primary key attribute and its scalar type
//! - `TableSpec` - one desired table
//! - `Descriptor` - the ordered, duplicate-free set of desired tables
//! - `parse` - reading a `Descriptor` from JSON or TOML

mod parse;

pub use parse::{SchemaFormat, SchemaSource, load, parse};

use std::fmt;
use std::str::FromStr;

use aws_sdk_dynamodb::types::ScalarAttributeType;
use serde::Serialize;

use crate::errors::{SchemaError, SchemaIssue};

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    String,
    Number,
    Binary,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "STRING",
            KeyType::Number => "NUMBER",
            KeyType::Binary => "BINARY",
        }
    }

    pub fn to_scalar(self) -> ScalarAttributeType {
        match self {
            KeyType::String => ScalarAttributeType::S,
            KeyType::Number => ScalarAttributeType::N,
            KeyType::Binary => ScalarAttributeType::B,
        }
    }

    /// `None` for scalar types this crate does not model.
    pub fn from_scalar(scalar: &ScalarAttributeType) -> Option<Self> {
        match scalar {
            ScalarAttributeType::S => Some(KeyType::String),
            ScalarAttributeType::N => Some(KeyType::Number),
            ScalarAttributeType::B => Some(KeyType::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" | "S" => Ok(KeyType::String),
            "NUMBER" | "N" => Ok(KeyType::Number),
            "BINARY" | "B" => Ok(KeyType::Binary),
            other => Err(format!(
                "unknown key type '{}' (expected STRING, NUMBER or BINARY)",
                other
            )),
        }
    }
}

/// A table's partition key: attribute name plus scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KeyDef {
    pub attribute: String,
    pub key_type: KeyType,
}

impl KeyDef {
    pub fn new(attribute: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            attribute: attribute.into(),
            key_type,
        }
    }
}

impl fmt::Display for KeyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.attribute, self.key_type)
    }
}

/// One desired table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSpec {
    name: String,
    key: KeyDef,
    read_capacity: i64,
    write_capacity: i64,
}

impl TableSpec {
    /// Build a validated spec.
    ///
    /// Fails with every violated invariant: empty name, empty key attribute,
    /// capacities below 1.
    pub fn new(
        name: impl Into<String>,
        key_attribute: impl Into<String>,
        key_type: KeyType,
        read_capacity: i64,
        write_capacity: i64,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let key_attribute = key_attribute.into();
        let label = (!name.trim().is_empty()).then_some(name.as_str());

        let mut issues = Vec::new();
        if label.is_none() {
            issues.push(SchemaIssue::entry(0, None, "missing table name"));
        }
        if key_attribute.trim().is_empty() {
            issues.push(SchemaIssue::entry(0, label, "missing key attribute"));
        }
        for (field, value) in [("read_capacity", read_capacity), ("write_capacity", write_capacity)] {
            if value < 1 {
                issues.push(SchemaIssue::entry(
                    0,
                    label,
                    format!("{} must be a positive integer, got {}", field, value),
                ));
            }
        }
        if !issues.is_empty() {
            return Err(SchemaError::Invalid(issues));
        }

        Ok(Self {
            name,
            key: KeyDef::new(key_attribute, key_type),
            read_capacity,
            write_capacity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &KeyDef {
        &self.key
    }

    pub fn read_capacity(&self) -> i64 {
        self.read_capacity
    }

    pub fn write_capacity(&self) -> i64 {
        self.write_capacity
    }
}

/// Ordered desired-state schema. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    tables: Vec<TableSpec>,
}

impl Descriptor {
    /// Build a descriptor, rejecting duplicate names.
    pub fn new(tables: Vec<TableSpec>) -> Result<Self, SchemaError> {
        let mut issues = Vec::new();
        for (i, spec) in tables.iter().enumerate() {
            if tables[..i].iter().any(|earlier| earlier.name == spec.name) {
                issues.push(SchemaIssue::entry(i, Some(&spec.name), "duplicate table name"));
            }
        }
        if !issues.is_empty() {
            return Err(SchemaError::Invalid(issues));
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
