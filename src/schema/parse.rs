//! Schema document parsing.
//!
//! Accepts JSON (`{"tables": [...]}` or a bare array) and TOML
//! (`[[tables]]`). Both are normalised to a `serde_json::Value` tree and
//! walked by hand so that every structural problem is collected in one pass
//! instead of stopping at the first serde error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use super::{Descriptor, KeyType, TableSpec};
use crate::errors::{SchemaError, SchemaIssue};

/// Capacity used when an entry omits `read_capacity` / `write_capacity`.
const DEFAULT_CAPACITY: i64 = 1;

const KNOWN_FIELDS: &[&str] = &[
    "name",
    "key_attribute",
    "key",
    "key_type",
    "read_capacity",
    "rcu",
    "write_capacity",
    "wcu",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    Json,
    Toml,
}

impl SchemaFormat {
    /// `.toml` files are TOML, everything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => SchemaFormat::Toml,
            _ => SchemaFormat::Json,
        }
    }

    /// Guess the format of inline text.
    pub fn sniff(input: &str) -> Self {
        let trimmed = input.trim_start();
        if trimmed.starts_with("[[") {
            SchemaFormat::Toml
        } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
            SchemaFormat::Json
        } else {
            SchemaFormat::Toml
        }
    }
}

/// Where the schema document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    File(PathBuf),
    Inline(String),
}

/// Read and parse a schema document from a file or inline text.
pub fn load(source: &SchemaSource) -> Result<Descriptor, SchemaError> {
    match source {
        SchemaSource::File(path) => {
            let input = std::fs::read_to_string(path).map_err(|e| SchemaError::Io {
                path: path.clone(),
                source: e,
            })?;
            debug!(path = %path.display(), bytes = input.len(), "loaded schema file");
            parse(&input, SchemaFormat::from_path(path))
        }
        SchemaSource::Inline(text) => parse(text, SchemaFormat::sniff(text)),
    }
}

/// Parse a schema document into a [`Descriptor`].
///
/// # Errors
///
/// Returns `SchemaError::Invalid` listing every problem found: syntax errors,
/// missing names, duplicate names, missing or unknown key types, missing key
/// attributes, non-positive capacities and unknown fields.
pub fn parse(input: &str, format: SchemaFormat) -> Result<Descriptor, SchemaError> {
    let document = to_value(input, format)?;

    let entries = match &document {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("tables") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                return Err(SchemaError::Invalid(vec![SchemaIssue::document(
                    "'tables' must be a list of table definitions",
                )]));
            }
            None => {
                return Err(SchemaError::Invalid(vec![SchemaIssue::document(
                    "missing 'tables' list",
                )]));
            }
        },
        _ => {
            return Err(SchemaError::Invalid(vec![SchemaIssue::document(
                "schema must be a list of tables or an object with a 'tables' list",
            )]));
        }
    };

    let mut issues = Vec::new();
    let mut seen = HashSet::new();
    let mut tables = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let Value::Object(fields) = entry else {
            issues.push(SchemaIssue::entry(index, None, "table definition must be an object"));
            continue;
        };
        if let Some(spec) = parse_entry(index, fields, &mut seen, &mut issues) {
            tables.push(spec);
        }
    }

    if !issues.is_empty() {
        return Err(SchemaError::Invalid(issues));
    }

    Descriptor::new(tables)
}

fn to_value(input: &str, format: SchemaFormat) -> Result<Value, SchemaError> {
    let syntax = |msg: String| SchemaError::Invalid(vec![SchemaIssue::document(msg)]);
    match format {
        SchemaFormat::Json => serde_json::from_str(input)
            .map_err(|e| syntax(format!("malformed JSON: {}", e))),
        SchemaFormat::Toml => {
            let table: toml::Table = toml::from_str(input)
                .map_err(|e| syntax(format!("malformed TOML: {}", e.message())))?;
            serde_json::to_value(table).map_err(|e| syntax(format!("unsupported TOML value: {}", e)))
        }
    }
}

fn parse_entry(
    index: usize,
    fields: &Map<String, Value>,
    seen: &mut HashSet<String>,
    issues: &mut Vec<SchemaIssue>,
) -> Option<TableSpec> {
    let before = issues.len();

    let name = match fields.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) | None => {
            issues.push(SchemaIssue::entry(index, None, "missing table name"));
            None
        }
        Some(other) => {
            issues.push(SchemaIssue::entry(
                index,
                None,
                format!("table name must be a string, got {}", other),
            ));
            None
        }
    };
    let label = name.as_deref();

    if let Some(n) = label {
        if !seen.insert(n.to_string()) {
            issues.push(SchemaIssue::entry(index, label, "duplicate table name"));
        }
    }

    for key in fields.keys() {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            issues.push(SchemaIssue::entry(index, label, format!("unknown field '{}'", key)));
        }
    }

    let key_attribute = match fields.get("key_attribute").or_else(|| fields.get("key")) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) | None => {
            issues.push(SchemaIssue::entry(index, label, "missing key attribute"));
            None
        }
        Some(other) => {
            issues.push(SchemaIssue::entry(
                index,
                label,
                format!("key attribute must be a string, got {}", other),
            ));
            None
        }
    };

    let key_type = match fields.get("key_type") {
        Some(Value::String(s)) => match s.parse::<KeyType>() {
            Ok(kt) => Some(kt),
            Err(msg) => {
                issues.push(SchemaIssue::entry(index, label, msg));
                None
            }
        },
        None => {
            issues.push(SchemaIssue::entry(index, label, "missing key type"));
            None
        }
        Some(other) => {
            issues.push(SchemaIssue::entry(
                index,
                label,
                format!("key type must be a string, got {}", other),
            ));
            None
        }
    };

    let read_capacity = capacity(index, label, fields, "read_capacity", "rcu", issues);
    let write_capacity = capacity(index, label, fields, "write_capacity", "wcu", issues);

    if issues.len() > before {
        return None;
    }

    // Field checks above mirror TableSpec's invariants.
    match TableSpec::new(
        name?,
        key_attribute?,
        key_type?,
        read_capacity?,
        write_capacity?,
    ) {
        Ok(spec) => Some(spec),
        Err(err) => {
            issues.extend(err.issues().iter().cloned().map(|mut issue| {
                issue.index = Some(index);
                issue
            }));
            None
        }
    }
}

fn capacity(
    index: usize,
    label: Option<&str>,
    fields: &Map<String, Value>,
    field: &'static str,
    alias: &'static str,
    issues: &mut Vec<SchemaIssue>,
) -> Option<i64> {
    match fields.get(field).or_else(|| fields.get(alias)) {
        None => Some(DEFAULT_CAPACITY),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) if v >= 1 => Some(v),
            _ => {
                issues.push(SchemaIssue::entry(
                    index,
                    label,
                    format!("{} must be a positive integer, got {}", field, n),
                ));
                None
            }
        },
        Some(other) => {
            issues.push(SchemaIssue::entry(
                index,
                label,
                format!("{} must be a positive integer, got {}", field, other),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS_JSON: &str = r#"{
        "tables": [
            {"name": "users", "key_attribute": "id", "key_type": "STRING", "read_capacity": 1, "write_capacity": 1},
            {"name": "users_email_lookup", "key": "email", "key_type": "S", "rcu": 5, "wcu": 5}
        ]
    }"#;

    #[test]
    fn parses_wrapped_json_in_order() {
        let descriptor = parse(USERS_JSON, SchemaFormat::Json).unwrap();
        let names: Vec<_> = descriptor.tables().iter().map(|t| t.name()).collect();
        assert_eq!(names, ["users", "users_email_lookup"]);

        let lookup = descriptor.get("users_email_lookup").unwrap();
        assert_eq!(lookup.key().attribute, "email");
        assert_eq!(lookup.key().key_type, KeyType::String);
        assert_eq!(lookup.read_capacity(), 5);
        assert_eq!(lookup.write_capacity(), 5);
    }

    #[test]
    fn parses_bare_json_array() {
        let descriptor = parse(
            r#"[{"name": "orders", "key_attribute": "order_id", "key_type": "NUMBER"}]"#,
            SchemaFormat::Json,
        )
        .unwrap();
        let orders = descriptor.get("orders").unwrap();
        assert_eq!(orders.key().key_type, KeyType::Number);
        assert_eq!(orders.read_capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn parses_toml_tables() {
        let input = r#"
            [[tables]]
            name = "users"
            key_attribute = "id"
            key_type = "STRING"
            read_capacity = 1
            write_capacity = 1

            [[tables]]
            name = "blobs"
            key_attribute = "digest"
            key_type = "BINARY"
        "#;
        let descriptor = parse(input, SchemaFormat::Toml).unwrap();
        assert_eq!(descriptor.len(), 2);
        assert_eq!(descriptor.get("blobs").unwrap().key().key_type, KeyType::Binary);
    }

    #[test]
    fn collects_every_problem_in_one_pass() {
        let input = r#"{"tables": [
            {"key_attribute": "id", "key_type": "STRING"},
            {"name": "users", "key_attribute": "id", "key_type": "STRING"},
            {"name": "users", "key_attribute": "id", "key_type": "STRING"},
            {"name": "events", "key_attribute": "id", "key_type": "BOOL", "read_capacity": 0},
            {"name": "audit", "key_type": "S", "write_capacity": -2, "ttl": true}
        ]}"#;
        let err = parse(input, SchemaFormat::Json).unwrap_err();
        let messages: Vec<String> = err.issues().iter().map(|i| i.to_string()).collect();

        assert_eq!(messages.len(), 7, "{messages:#?}");
        assert!(messages.contains(&"tables[0]: missing table name".to_string()));
        assert!(messages.contains(&"tables[2] ('users'): duplicate table name".to_string()));
        assert!(messages.iter().any(|m| m.starts_with("tables[3] ('events'): unknown key type 'BOOL'")));
        assert!(messages.contains(
            &"tables[3] ('events'): read_capacity must be a positive integer, got 0".to_string()
        ));
        assert!(messages.contains(&"tables[4] ('audit'): missing key attribute".to_string()));
        assert!(messages.contains(
            &"tables[4] ('audit'): write_capacity must be a positive integer, got -2".to_string()
        ));
        assert!(messages.contains(&"tables[4] ('audit'): unknown field 'ttl'".to_string()));
    }

    #[test]
    fn unknown_fields_are_reported() {
        let err = parse(
            r#"[{"name": "t", "key_attribute": "id", "key_type": "S", "stream": true}]"#,
            SchemaFormat::Json,
        )
        .unwrap_err();
        assert_eq!(err.issues()[0].message, "unknown field 'stream'");
    }

    #[test]
    fn fractional_and_string_capacities_are_rejected() {
        let err = parse(
            r#"[{"name": "t", "key_attribute": "id", "key_type": "S", "rcu": 1.5, "wcu": "2"}]"#,
            SchemaFormat::Json,
        )
        .unwrap_err();
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn syntax_errors_are_a_single_document_issue() {
        let err = parse("{\"tables\": [", SchemaFormat::Json).unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert!(err.issues()[0].index.is_none());
        assert!(err.issues()[0].message.starts_with("malformed JSON"));

        let err = parse("[[tables]\nname = ", SchemaFormat::Toml).unwrap_err();
        assert!(err.issues()[0].message.starts_with("malformed TOML"));
    }

    #[test]
    fn empty_table_list_is_valid() {
        assert!(parse(r#"{"tables": []}"#, SchemaFormat::Json).unwrap().is_empty());
        assert!(parse("tables = []", SchemaFormat::Toml).unwrap().is_empty());
    }

    #[test]
    fn format_detection() {
        assert_eq!(SchemaFormat::from_path(Path::new("schema.toml")), SchemaFormat::Toml);
        assert_eq!(SchemaFormat::from_path(Path::new("schema.json")), SchemaFormat::Json);
        assert_eq!(SchemaFormat::sniff("  [[tables]]\nname = \"a\""), SchemaFormat::Toml);
        assert_eq!(SchemaFormat::sniff("[{\"name\": \"a\"}]"), SchemaFormat::Json);
        assert_eq!(SchemaFormat::sniff("{\"tables\": []}"), SchemaFormat::Json);
        assert_eq!(SchemaFormat::sniff("tables = []"), SchemaFormat::Toml);
    }

    #[test]
    fn load_reads_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.toml");
        std::fs::write(
            &path,
            "[[tables]]\nname = \"users\"\nkey_attribute = \"id\"\nkey_type = \"S\"\n",
        )
        .unwrap();

        let descriptor = load(&SchemaSource::File(path)).unwrap();
        assert_eq!(descriptor.tables()[0].name(), "users");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load(&SchemaSource::File(PathBuf::from("/nonexistent/schema.json"))).unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }
}
