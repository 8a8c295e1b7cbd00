#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use dynoboot::store::memory::MemoryStore;
use dynoboot::{Bootstrap, BootstrapConfig, Descriptor, KeyType, ProbeConfig, ProvisionConfig, TableSpec};

pub const ENDPOINT: &str = "http://dynamodb-local:8000";

/// The two tables the users service needs.
pub fn users_schema() -> Descriptor {
    Descriptor::new(vec![
        TableSpec::new("users", "id", KeyType::String, 1, 1).unwrap(),
        TableSpec::new("users_email_lookup", "email", KeyType::String, 5, 5).unwrap(),
    ])
    .unwrap()
}

pub fn numbered_schema(count: usize) -> Descriptor {
    Descriptor::new(
        (0..count)
            .map(|i| TableSpec::new(format!("table_{:02}", i), "pk", KeyType::String, 1, 1).unwrap())
            .collect(),
    )
    .unwrap()
}

/// Short delays so paused-clock tests stay readable.
pub fn fast_config() -> BootstrapConfig {
    BootstrapConfig {
        probe: ProbeConfig {
            max_attempts: 5,
            interval: Duration::from_millis(100),
            attempt_timeout: Duration::from_millis(500),
            ..ProbeConfig::default()
        },
        provision: ProvisionConfig {
            retry_base: Duration::from_millis(50),
            ..ProvisionConfig::default()
        },
    }
}

pub fn bootstrap(store: &Arc<MemoryStore>, config: BootstrapConfig) -> Bootstrap {
    Bootstrap::new(store.clone(), ENDPOINT, config)
}
