mod common;

use std::fs;

use common::{environment, put_objects};
use imeta::driver::Expectation;
use serde_json::Value;

fn schema() -> Value {
    serde_json::from_str(include_str!("../schemas/catalog-v0.schema.json"))
        .expect("schema must be valid json")
}

fn validate(instance: &Value) -> Result<(), String> {
    let validator = jsonschema::validator_for(&schema()).expect("schema should compile");
    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|error| format!("{error} at {}", error.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}

fn read_catalog(path: &std::path::Path) -> Value {
    let text = fs::read_to_string(path).expect("catalog file should exist");
    serde_json::from_str(&text).expect("catalog should parse as json")
}

#[test]
fn schema_file_is_valid_and_compiles() {
    let _ = jsonschema::validator_for(&schema()).expect("schema should compile");
}

#[test]
fn provisioned_catalog_validates() {
    let env = environment();
    let catalog = read_catalog(env.admin.catalog_path());
    validate(&catalog).expect("fresh catalog should validate");
    assert_eq!(catalog["version"], "imeta-catalog.v0");
    assert_eq!(catalog["users"]["alice"]["kind"], "rodsuser");
    assert_eq!(catalog["users"]["rods"]["kind"], "rodsadmin");
}

#[test]
fn catalog_with_avus_and_acls_validates() {
    let env = environment();
    put_objects(&env.user0, "file_", 2);
    let object = format!("{}/file_0", env.user0.home_collection());
    env.user0
        .assert_icommand(
            ["icat", "chmod", "read", env.user1.username(), object.as_str()],
            Expectation::success(),
        )
        .unwrap();
    env.user0
        .assert_icommand("imeta addw -d file_% a v u", Expectation::success())
        .unwrap();
    env.admin
        .assert_icommand(
            format!("imeta set -u {} a v", env.user1.username()),
            Expectation::success(),
        )
        .unwrap();

    let catalog = read_catalog(env.admin.catalog_path());
    validate(&catalog).expect("populated catalog should validate");
    assert_eq!(catalog["data_objects"][&object]["acl"]["bobby"], "read");
    assert_eq!(catalog["data_objects"][&object]["avus"][0]["units"], "u");
    assert_eq!(catalog["users"]["bobby"]["avus"][0]["units"], "");
}

#[test]
fn schema_rejects_foreign_version() {
    let env = environment();
    let mut catalog = read_catalog(env.admin.catalog_path());
    catalog["version"] = Value::from("imeta-catalog.v9");
    assert!(validate(&catalog).is_err());
}

#[test]
fn refused_command_leaves_catalog_bytes_unchanged() {
    let env = environment();
    let before = fs::read(env.admin.catalog_path()).unwrap();
    env.user0
        .assert_icommand(
            format!("imeta add -u {} a v", env.user1.username()),
            Expectation::stderr_singleline("CAT_INSUFFICIENT_PRIVILEGE_LEVEL"),
        )
        .unwrap();
    let after = fs::read(env.admin.catalog_path()).unwrap();
    assert_eq!(before, after);
}
