use std::path::PathBuf;

use dynoboot::schema::{self, SchemaSource};
use dynoboot::{KeyDef, KeyType, SchemaError};

fn shipped(name: &str) -> SchemaSource {
    SchemaSource::File(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas").join(name))
}

#[test]
fn shipped_schemas_agree() {
    let from_toml = schema::load(&shipped("users.toml")).unwrap();
    let from_json = schema::load(&shipped("users.json")).unwrap();
    assert_eq!(from_toml, from_json);

    let users = from_toml.get("users").unwrap();
    assert_eq!(users.key(), &KeyDef::new("id", KeyType::String));
    assert_eq!(users.read_capacity(), 1);
    let lookup = from_toml.get("users_email_lookup").unwrap();
    assert_eq!(lookup.key(), &KeyDef::new("email", KeyType::String));
    assert_eq!(lookup.write_capacity(), 5);
}

#[test]
fn inline_schema_reports_every_problem() {
    let source = SchemaSource::Inline(
        r#"[{"name": "users", "key_type": "UUID", "read_capacity": 0}, {"key_attribute": "id", "key_type": "S"}]"#
            .to_string(),
    );
    match schema::load(&source) {
        Err(SchemaError::Invalid(issues)) => assert!(issues.len() >= 4, "{:?}", issues),
        other => panic!("expected invalid schema, got {:?}", other),
    }
}
