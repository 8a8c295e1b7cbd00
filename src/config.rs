//! Command-line and config-file settings.
//!
//! Values come from, in priority order: command-line flags, their
//! environment variables, an optional `bootstrap.toml`, built-in defaults.
//! Everything is resolved into a validated [`Settings`] before any network
//! activity.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::client::{ClientOptions, CredentialSource};
use crate::errors::ConfigError;
use crate::orchestrator::BootstrapConfig;
use crate::probe::ProbeConfig;
use crate::provision::ProvisionConfig;
use crate::report::ReportFormat;
use crate::schema::SchemaSource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Wait for a DynamoDB-compatible endpoint, then create the tables a
/// schema document describes. Existing tables are left alone.
#[derive(Debug, Default, Parser)]
#[command(name = "bootstrap", version, about)]
pub struct Cli {
    /// Endpoint URL of the store, e.g. http://dynamodb-local:8000
    #[arg(long, env = "BOOTSTRAP_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Path to the schema document (.json or .toml)
    #[arg(long, env = "BOOTSTRAP_SCHEMA", conflicts_with = "schema_inline")]
    pub schema: Option<PathBuf>,

    /// Schema document given inline (JSON or TOML)
    #[arg(long)]
    pub schema_inline: Option<String>,

    /// Optional TOML file supplying defaults for every other flag
    #[arg(long, env = "BOOTSTRAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Readiness probe attempts before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Initial delay between probe attempts, in milliseconds
    #[arg(long, value_name = "MS")]
    pub interval: Option<u64>,

    /// Timeout for each request, in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// AWS region (defaults to AWS_REGION, then us-east-1)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Named AWS profile to take credentials from
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Maximum table creates in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries per create on throttling or transport errors
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Wait for each created table to become ACTIVE
    #[arg(long)]
    pub wait_active: bool,

    /// Upper bound on waiting for ACTIVE, in milliseconds
    #[arg(long, value_name = "MS")]
    pub active_timeout: Option<u64>,

    /// Report what would be created without creating anything
    #[arg(long)]
    pub dry_run: bool,

    /// Report format on stdout
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Diagnostic log format on stderr
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// `bootstrap.toml` contents. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub endpoint: Option<String>,
    /// Relative paths resolve against the config file's directory.
    pub schema: Option<PathBuf>,
    pub region: Option<String>,
    #[serde(default)]
    pub credentials: FileCredentials,
    #[serde(default)]
    pub probe: FileProbe,
    #[serde(default)]
    pub provision: FileProvision,
    #[serde(default)]
    pub output: FileOutput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileCredentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileProbe {
    pub max_attempts: Option<u32>,
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileProvision {
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub wait_active: Option<bool>,
    pub active_timeout_ms: Option<u64>,
    pub dry_run: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileOutput {
    pub format: Option<ReportFormat>,
    pub log_format: Option<LogFormat>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: FileConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        if let (Some(schema), Some(dir)) = (&config.schema, path.parent()) {
            if schema.is_relative() {
                config.schema = Some(dir.join(schema));
            }
        }
        Ok(config)
    }
}

/// Fully resolved, validated settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint: String,
    pub schema: SchemaSource,
    pub client: ClientOptions,
    pub bootstrap: BootstrapConfig,
    pub format: ReportFormat,
    pub log_format: LogFormat,
}

impl Settings {
    /// Load the config file named by `cli` (if any) and merge.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge flags over file values over defaults, then validate.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let endpoint = cli
            .endpoint
            .or(file.endpoint)
            .or_else(|| std::env::var("AWS_ENDPOINT_URL").ok())
            .ok_or(ConfigError::Missing("--endpoint"))?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "endpoint",
                reason: format!("'{}' is not an http(s) URL", endpoint),
            });
        }

        let schema = match (cli.schema, cli.schema_inline, file.schema) {
            (Some(path), _, _) => SchemaSource::File(path),
            (None, Some(text), _) => SchemaSource::Inline(text),
            (None, None, Some(path)) => SchemaSource::File(path),
            (None, None, None) => return Err(ConfigError::Missing("--schema or --schema-inline")),
        };

        let probe_defaults = ProbeConfig::default();
        let max_attempts = cli
            .max_attempts
            .or(file.probe.max_attempts)
            .unwrap_or(probe_defaults.max_attempts);
        let interval = millis(cli.interval.or(file.probe.interval_ms))
            .unwrap_or(probe_defaults.interval);
        let timeout = millis(cli.timeout.or(file.probe.timeout_ms))
            .unwrap_or(probe_defaults.attempt_timeout);

        positive("max-attempts", u64::from(max_attempts))?;
        positive("interval", interval.as_millis() as u64)?;
        positive("timeout", timeout.as_millis() as u64)?;

        let provision_defaults = ProvisionConfig::default();
        let concurrency = cli
            .concurrency
            .or(file.provision.concurrency)
            .unwrap_or(provision_defaults.concurrency);
        positive("concurrency", concurrency as u64)?;

        let provision = ProvisionConfig {
            concurrency,
            max_retries: cli
                .max_retries
                .or(file.provision.max_retries)
                .unwrap_or(provision_defaults.max_retries),
            retry_base: millis(file.provision.retry_base_ms).unwrap_or(provision_defaults.retry_base),
            call_timeout: timeout,
            wait_active: cli.wait_active || file.provision.wait_active.unwrap_or(false),
            active_timeout: millis(cli.active_timeout.or(file.provision.active_timeout_ms))
                .unwrap_or(provision_defaults.active_timeout),
            active_poll: interval,
            dry_run: cli.dry_run || file.provision.dry_run.unwrap_or(false),
        };

        let credentials = credential_source(
            cli.access_key.or(file.credentials.access_key),
            cli.secret_key.or(file.credentials.secret_key),
            cli.session_token,
            cli.profile.or(file.credentials.profile),
        )?;

        Ok(Settings {
            client: ClientOptions {
                endpoint_url: endpoint.clone(),
                region: cli.region.or(file.region),
                credentials,
                attempt_timeout: timeout,
            },
            endpoint,
            schema,
            bootstrap: BootstrapConfig {
                probe: ProbeConfig {
                    max_attempts,
                    interval,
                    attempt_timeout: timeout,
                    ..probe_defaults
                },
                provision,
            },
            format: cli.format.or(file.output.format).unwrap_or_default(),
            log_format: cli.log_format.or(file.output.log_format).unwrap_or_default(),
        })
    }
}

fn millis(value: Option<u64>) -> Option<Duration> {
    value.map(Duration::from_millis)
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Static keys win over a profile; neither means the default chain.
fn credential_source(
    access_key: Option<String>,
    secret_key: Option<String>,
    session_token: Option<String>,
    profile: Option<String>,
) -> Result<CredentialSource, ConfigError> {
    match (access_key, secret_key) {
        (Some(access_key), Some(secret_key)) => Ok(CredentialSource::Static {
            access_key,
            secret_key,
            session_token,
        }),
        (Some(_), None) | (None, Some(_)) => Err(ConfigError::Invalid {
            field: "credentials",
            reason: "access key and secret key must be given together".to_string(),
        }),
        (None, None) => Ok(profile
            .map(CredentialSource::Profile)
            .unwrap_or_default()),
    }
}
