//! DynamoDB client module.
//!
//! Builds an `aws_sdk_dynamodb::Client` for a specific endpoint and wraps it
//! in [`DynamoStore`], the production [`TableStore`]. Credentials are an
//! opaque provider chosen at construction:
//! - Hardcoded credentials
//! - AWS profiles
//! - Default chain (environment variables, instance profile, etc.)

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::config::retry::RetryConfig;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use tracing::debug;

use crate::errors::StoreError;
use crate::schema::TableSpec;
use crate::store::{ExistingTable, TableStore};
use crate::table_operations;

/// Region used when neither the caller nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// How the client authenticates.
#[derive(Clone, Default)]
pub enum CredentialSource {
    /// Static keys, e.g. the dummy keys DynamoDB Local accepts.
    Static {
        access_key: String,
        secret_key: String,
        session_token: Option<String>,
    },
    /// A named profile from `~/.aws/credentials`.
    Profile(String),
    /// Environment variables, instance profile, etc.
    #[default]
    DefaultChain,
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
            CredentialSource::Profile(name) => f.debug_tuple("Profile").field(name).finish(),
            CredentialSource::DefaultChain => f.write_str("DefaultChain"),
        }
    }
}

/// Everything needed to build a client for one endpoint.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub endpoint_url: String,
    pub region: Option<String>,
    pub credentials: CredentialSource,
    /// Bound on a single request attempt, connect included.
    pub attempt_timeout: Duration,
}

/// Build the AWS SDK DynamoDB client with the given configuration.
///
/// SDK-level retries are disabled: the prober and provisioner own the
/// retry policy, and need every failure reported to them.
pub async fn build_client(options: &ClientOptions) -> Client {
    // Region priority: param > env var > default
    let region_provider = RegionProviderChain::first_try(
        options
            .region
            .clone()
            .map(aws_sdk_dynamodb::config::Region::new),
    )
    .or_default_provider()
    .or_else(DEFAULT_REGION);

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    match &options.credentials {
        CredentialSource::Static {
            access_key,
            secret_key,
            session_token,
        } => {
            let creds = Credentials::new(
                access_key,
                secret_key,
                session_token.clone(),
                None,
                "dynoboot-static",
            );
            config_loader = config_loader.credentials_provider(creds);
        }
        CredentialSource::Profile(profile_name) => {
            let profile_provider = ProfileFileCredentialsProvider::builder()
                .profile_name(profile_name)
                .build();
            config_loader = config_loader.credentials_provider(profile_provider);
        }
        CredentialSource::DefaultChain => {}
    }

    let sdk_config = config_loader.load().await;

    let timeouts = TimeoutConfig::builder()
        .connect_timeout(options.attempt_timeout)
        .operation_attempt_timeout(options.attempt_timeout)
        .build();

    let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
        .endpoint_url(&options.endpoint_url)
        .retry_config(RetryConfig::disabled())
        .timeout_config(timeouts)
        .build();

    debug!(
        endpoint = %options.endpoint_url,
        region = ?sdk_config.region(),
        credentials = ?options.credentials,
        "built DynamoDB client"
    );

    Client::from_conf(dynamo_config)
}

/// [`TableStore`] backed by a DynamoDB (or DynamoDB-compatible) endpoint.
///
/// The SDK client is cheap to clone and holds no per-request state, so one
/// store can serve concurrent creates.
#[derive(Debug, Clone)]
pub struct DynamoStore {
    client: Client,
    endpoint: String,
}

impl DynamoStore {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub async fn connect(options: &ClientOptions) -> Self {
        let client = build_client(options).await;
        Self::new(client, options.endpoint_url.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl TableStore for DynamoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        table_operations::ping(&self.client).await
    }

    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        table_operations::list_all_tables(&self.client).await
    }

    async fn describe_table(&self, name: &str) -> Result<ExistingTable, StoreError> {
        table_operations::describe_table(&self.client, name).await
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        table_operations::create_table(&self.client, spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeyType;

    fn local_options() -> ClientOptions {
        ClientOptions {
            endpoint_url: "http://localhost:8000".to_string(),
            region: Some("local".to_string()),
            credentials: CredentialSource::Static {
                access_key: "dummy".to_string(),
                secret_key: "dummy".to_string(),
                session_token: None,
            },
            attempt_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn debug_redacts_secret_key() {
        let rendered = format!("{:?}", local_options().credentials);
        assert!(rendered.contains("dummy"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(rendered.matches("dummy").count(), 1);
    }

    #[tokio::test]
    async fn builds_client_for_custom_endpoint() {
        let store = DynamoStore::connect(&local_options()).await;
        assert_eq!(store.endpoint(), "http://localhost:8000");
        assert_eq!(
            store.client().config().region().map(|r| r.as_ref()),
            Some("local")
        );
    }

    #[tokio::test]
    async fn create_request_carries_key_and_capacity() {
        let store = DynamoStore::connect(&local_options()).await;
        let spec = TableSpec::new("users_email_lookup", "email", KeyType::String, 5, 5).unwrap();

        let request = table_operations::build_create_table(store.client(), &spec).unwrap();
        let input = request.as_input();

        assert_eq!(input.get_table_name().as_deref(), Some("users_email_lookup"));
        let keys = input.get_key_schema().as_ref().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].attribute_name(), "email");
        let throughput = input.get_provisioned_throughput().as_ref().unwrap();
        assert_eq!(throughput.read_capacity_units(), 5);
        assert_eq!(throughput.write_capacity_units(), 5);
    }
}
