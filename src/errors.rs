//! Error types for dynoboot.
//!
//! Store errors are classified from AWS SDK errors by typed `SdkError`
//! variant matching and `ProvideErrorMetadata` codes, never by string
//! parsing of debug output. The classification drives retry policy:
//! only `Transient` errors are retried.

use std::fmt;
use std::path::PathBuf;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use serde::Serialize;

/// How a failed store call should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// Throttling, capacity limits, 5xx, transport failures, timeouts.
    Transient,
    /// Validation, access denied, bad credentials. Never retried.
    Permanent,
    /// The named table does not exist.
    NotFound,
    /// The table already exists or is being created by someone else.
    InUse,
    /// The store answered, but not with something we could interpret.
    Malformed,
}

/// A failed call against the table store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Permanent, message)
    }

    pub fn not_found(table: &str) -> Self {
        Self::new(StoreErrorKind::NotFound, format!("Table '{}' not found", table))
    }

    pub fn in_use(table: &str) -> Self {
        Self::new(
            StoreErrorKind::InUse,
            format!("Table '{}' already exists", table),
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Malformed, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Transient
    }

    /// Transient errors plus malformed answers. A garbled reply to a create
    /// may hide a success; retrying then surfaces `InUse`, which callers
    /// resolve by describing the table.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            StoreErrorKind::Transient | StoreErrorKind::Malformed
        )
    }
}

/// One structural problem found in a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    /// Position of the offending entry, `None` for document-level problems.
    pub index: Option<usize>,
    /// Table name, when the entry carried a usable one.
    pub table: Option<String>,
    pub message: String,
}

impl SchemaIssue {
    pub fn document(message: impl Into<String>) -> Self {
        Self {
            index: None,
            table: None,
            message: message.into(),
        }
    }

    pub fn entry(index: usize, table: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            table: table.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index, &self.table) {
            (Some(i), Some(t)) => write!(f, "tables[{}] ('{}'): {}", i, t, self.message),
            (Some(i), None) => write!(f, "tables[{}]: {}", i, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Errors raised while loading the desired schema. Always fatal, and always
/// raised before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("{}", render_invalid(.0))]
    Invalid(Vec<SchemaIssue>),

    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SchemaError {
    pub fn issues(&self) -> &[SchemaIssue] {
        match self {
            SchemaError::Invalid(issues) => issues,
            SchemaError::Io { .. } => &[],
        }
    }
}

fn render_invalid(issues: &[SchemaIssue]) -> String {
    let plural = if issues.len() == 1 { "" } else { "s" };
    let mut out = format!("invalid schema ({} problem{}):", issues.len(), plural);
    for issue in issues {
        out.push_str(&format!("\n  - {}", issue));
    }
    out
}

/// Bad command-line or config-file values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ========== TYPED ERROR MAPPING ==========

/// Map non-service `SdkError` variants (dispatch failures, timeouts, etc.).
///
/// Returns `None` for `ServiceError`, which needs code-based handling.
fn map_outer_sdk_error<E, R>(err: &SdkError<E, R>) -> Option<StoreError>
where
    E: fmt::Debug,
    R: fmt::Debug,
{
    match err {
        SdkError::DispatchFailure(dispatch) => {
            let msg = if dispatch.is_timeout() {
                "Connection timed out to DynamoDB endpoint"
            } else if dispatch.is_io() {
                "Connection failed to DynamoDB endpoint (I/O error)"
            } else {
                "Connection failed to DynamoDB endpoint"
            };
            Some(StoreError::transient(msg))
        }
        SdkError::TimeoutError(_) => Some(StoreError::transient(
            "Request to DynamoDB endpoint timed out",
        )),
        SdkError::ConstructionFailure(err) => {
            let msg = format!("{:?}", err);
            if msg.contains("credentials") || msg.contains("Credentials") {
                Some(StoreError::permanent(
                    "No AWS credentials found. Provide --access-key/--secret-key, \
                    a profile, or the AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY variables.",
                ))
            } else {
                Some(StoreError::permanent(format!(
                    "Failed to build request: {}",
                    msg
                )))
            }
        }
        // Endpoint is up but answered with something unparseable; common
        // while an emulator is still starting.
        SdkError::ResponseError(err) => Some(StoreError::malformed(format!(
            "Invalid response from DynamoDB endpoint: {:?}",
            err
        ))),
        SdkError::ServiceError(_) => None,
        _ => Some(StoreError::transient(format!(
            "Unknown error from DynamoDB endpoint: {:?}",
            err
        ))),
    }
}

/// Classify a DynamoDB service error code.
pub fn classify_code(code: Option<&str>, message: Option<&str>, table: Option<&str>) -> StoreError {
    let detail = |fallback: &str| message.unwrap_or(fallback).to_string();

    match code {
        Some("UnrecognizedClientException") => {
            StoreError::permanent("Invalid AWS credentials. Check your access key and secret.")
        }
        Some("ExpiredTokenException") => {
            StoreError::permanent("AWS credentials have expired. Refresh your session token.")
        }
        Some("AccessDeniedException") => StoreError::permanent(format!(
            "Access denied: {}",
            detail("Check your IAM permissions.")
        )),
        Some("ValidationException") => StoreError::permanent(detail("Validation failed")),
        Some("ProvisionedThroughputExceededException")
        | Some("LimitExceededException")
        | Some("RequestLimitExceeded")
        | Some("ThrottlingException")
        | Some("Throttling") => StoreError::transient(format!(
            "Request rate too high: {}",
            detail("throttled")
        )),
        Some("InternalServerError") | Some("ServiceUnavailable") => {
            StoreError::transient(detail("Service temporarily unavailable"))
        }
        Some("ResourceNotFoundException") => match table {
            Some(t) => StoreError::not_found(t),
            None => StoreError::new(StoreErrorKind::NotFound, "Resource not found"),
        },
        Some("ResourceInUseException") => match table {
            Some(t) => StoreError::in_use(t),
            None => StoreError::new(StoreErrorKind::InUse, "Resource already in use"),
        },
        Some(other) => StoreError::permanent(format!("{}: {}", other, detail("no message"))),
        None => StoreError::malformed(detail("Service error without an error code")),
    }
}

/// Map a DynamoDB `SdkError` to a [`StoreError`].
pub fn map_sdk_error<E, R>(err: SdkError<E, R>, table: Option<&str>) -> StoreError
where
    E: ProvideErrorMetadata + fmt::Debug + fmt::Display,
    R: fmt::Debug,
{
    if let Some(mapped) = map_outer_sdk_error(&err) {
        return mapped;
    }

    if let Some(service_err) = err.as_service_error() {
        let meta = ProvideErrorMetadata::meta(service_err);
        let display = service_err.to_string();
        return classify_code(meta.code(), meta.message().or(Some(display.as_str())), table);
    }

    StoreError::malformed(format!("Unexpected DynamoDB error: {:?}", err))
}
