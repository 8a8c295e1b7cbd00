//! Create table operation.

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::operation::create_table::builders::CreateTableFluentBuilder;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ProvisionedThroughput,
};
use tracing::debug;

use crate::errors::{StoreError, map_sdk_error};
use crate::schema::TableSpec;

/// Build a `CreateTable` request for `spec`: a single HASH key with its
/// attribute definition, in provisioned billing mode.
pub fn build_create_table(
    client: &Client,
    spec: &TableSpec,
) -> Result<CreateTableFluentBuilder, StoreError> {
    let invalid = |what: &str, e: aws_sdk_dynamodb::error::BuildError| {
        StoreError::permanent(format!(
            "Invalid {} for table '{}': {}",
            what,
            spec.name(),
            e
        ))
    };

    let key = KeySchemaElement::builder()
        .attribute_name(&spec.key().attribute)
        .key_type(KeyType::Hash)
        .build()
        .map_err(|e| invalid("key schema", e))?;

    let attribute = AttributeDefinition::builder()
        .attribute_name(&spec.key().attribute)
        .attribute_type(spec.key().key_type.to_scalar())
        .build()
        .map_err(|e| invalid("attribute definition", e))?;

    let throughput = ProvisionedThroughput::builder()
        .read_capacity_units(spec.read_capacity())
        .write_capacity_units(spec.write_capacity())
        .build()
        .map_err(|e| invalid("provisioned throughput", e))?;

    Ok(client
        .create_table()
        .table_name(spec.name())
        .key_schema(key)
        .attribute_definitions(attribute)
        .billing_mode(BillingMode::Provisioned)
        .provisioned_throughput(throughput))
}

/// Send a `CreateTable` request for `spec`.
pub async fn create_table(client: &Client, spec: &TableSpec) -> Result<(), StoreError> {
    let request = build_create_table(client, spec)?;

    let output = request
        .send()
        .await
        .map_err(|e| map_sdk_error(e, Some(spec.name())))?;

    debug!(
        table = spec.name(),
        status = output
            .table_description()
            .and_then(|d| d.table_status())
            .map(|s| s.as_str())
            .unwrap_or("unknown"),
        "create table accepted"
    );
    Ok(())
}
