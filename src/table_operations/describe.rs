//! Describe table operation.

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{KeyType as SdkKeyType, TableDescription, TableStatus};

use crate::errors::{StoreError, map_sdk_error};
use crate::schema::{KeyDef, KeyType};
use crate::store::{ExistingTable, TableState};

/// Fetch the current definition of `table`.
pub async fn describe_table(client: &Client, table: &str) -> Result<ExistingTable, StoreError> {
    let output = client
        .describe_table()
        .table_name(table)
        .send()
        .await
        .map_err(|e| map_sdk_error(e, Some(table)))?;

    let description = output.table().ok_or_else(|| {
        StoreError::malformed(format!("DescribeTable for '{}' returned no table", table))
    })?;
    existing_from_description(table, description)
}

/// Extract the key schema and status from a `TableDescription`.
///
/// `requested` is used when the description omits the table name.
pub fn existing_from_description(
    requested: &str,
    description: &TableDescription,
) -> Result<ExistingTable, StoreError> {
    let name = description.table_name().unwrap_or(requested);

    let key = key_element(name, description, SdkKeyType::Hash)?.ok_or_else(|| {
        StoreError::malformed(format!("Table '{}' has no HASH key in its key schema", name))
    })?;
    let range = key_element(name, description, SdkKeyType::Range)?;

    let state = match description.table_status() {
        Some(TableStatus::Active) => TableState::Active,
        Some(TableStatus::Creating) => TableState::Creating,
        Some(TableStatus::Updating) => TableState::Updating,
        Some(TableStatus::Deleting) => TableState::Deleting,
        Some(other) => TableState::Other(other.as_str().to_string()),
        // DynamoDB Local omits status on some versions; a described table is usable.
        None => TableState::Active,
    };

    let mut existing = ExistingTable::new(name, key, state);
    existing.range = range;
    Ok(existing)
}

/// The key element of `role`, with its type taken from the attribute
/// definitions.
fn key_element(
    name: &str,
    description: &TableDescription,
    role: SdkKeyType,
) -> Result<Option<KeyDef>, StoreError> {
    let Some(element) = description.key_schema().iter().find(|k| *k.key_type() == role) else {
        return Ok(None);
    };
    let attribute = element.attribute_name();

    let definition = description
        .attribute_definitions()
        .iter()
        .find(|d| d.attribute_name() == attribute)
        .ok_or_else(|| {
            StoreError::malformed(format!(
                "Table '{}' has no attribute definition for key '{}'",
                name, attribute
            ))
        })?;
    let key_type = KeyType::from_scalar(definition.attribute_type()).ok_or_else(|| {
        StoreError::malformed(format!(
            "Table '{}' key '{}' has unsupported type {}",
            name,
            attribute,
            definition.attribute_type().as_str()
        ))
    })?;
    Ok(Some(KeyDef::new(attribute, key_type)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::{AttributeDefinition, KeySchemaElement, ScalarAttributeType};

    use crate::diff::{Action, diff};
    use crate::schema::{Descriptor, TableSpec};

    fn description(attr: &str, scalar: ScalarAttributeType, status: Option<TableStatus>) -> TableDescription {
        TableDescription::builder()
            .table_name("users")
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(attr)
                    .key_type(SdkKeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(attr)
                    .attribute_type(scalar)
                    .build()
                    .unwrap(),
            )
            .set_table_status(status)
            .build()
    }

    #[test]
    fn extracts_hash_key_and_status() {
        let desc = description("id", ScalarAttributeType::N, Some(TableStatus::Creating));
        let table = existing_from_description("users", &desc).unwrap();
        assert_eq!(table.name, "users");
        assert_eq!(table.key, KeyDef::new("id", KeyType::Number));
        assert_eq!(table.state, TableState::Creating);
    }

    #[test]
    fn missing_status_counts_as_active() {
        let desc = description("id", ScalarAttributeType::S, None);
        let table = existing_from_description("users", &desc).unwrap();
        assert_eq!(table.state, TableState::Active);
    }

    #[test]
    fn composite_key_table_conflicts_with_hash_only_spec() {
        let desc = TableDescription::builder()
            .table_name("users")
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("id")
                    .key_type(SdkKeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("sk")
                    .key_type(SdkKeyType::Range)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("id")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("sk")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .table_status(TableStatus::Active)
            .build();

        let table = existing_from_description("users", &desc).unwrap();
        assert_eq!(table.range, Some(KeyDef::new("sk", KeyType::String)));
        assert_eq!(table.key_schema(), "id:STRING+sk:STRING");

        let desired = Descriptor::new(vec![
            TableSpec::new("users", "id", KeyType::String, 1, 1).unwrap(),
        ])
        .unwrap();
        match &diff(&desired, &[table])[0] {
            Action::Conflict { actual, .. } => assert_eq!(actual, "id:STRING+sk:STRING"),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn missing_key_schema_is_malformed() {
        let desc = TableDescription::builder().table_name("users").build();
        let err = existing_from_description("users", &desc).unwrap_err();
        assert_eq!(err.kind, crate::errors::StoreErrorKind::Malformed);
    }
}
