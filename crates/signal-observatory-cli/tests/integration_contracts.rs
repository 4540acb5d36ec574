use std::fs;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use serde_json::Value;

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn read_json(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse {}: {err}", path.display()))
}

fn schema_errors(schema_path: &Path, value: &Value) -> Vec<String> {
    let schema = read_json(schema_path);
    let compiled = JSONSchema::compile(&schema)
        .unwrap_or_else(|err| panic!("failed to compile {}: {err}", schema_path.display()));
    compiled
        .validate(value)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>())
        .unwrap_or_default()
}

fn assert_schema(schema_path: &Path, value: &Value) {
    let errors = schema_errors(schema_path, value);
    assert!(
        errors.is_empty(),
        "schema validation failed for {}:\n{}",
        schema_path.display(),
        errors.join("\n")
    );
}

#[test]
fn contract_pack_validates_fixtures() {
    let repo = repo_root();
    let schema_dir = repo.join("contracts/v1/schemas");
    let fixture_dir = repo.join("contracts/v1/fixtures");

    for (schema, fixture) in [
        ("rolling-metrics.schema.json", "rolling-metrics.sample.json"),
        ("chart-rows.schema.json", "chart-rows.sample.json"),
        ("store-status.schema.json", "store-status.sample.json"),
    ] {
        let value = read_json(&fixture_dir.join(fixture));
        assert_schema(&schema_dir.join(schema), &value);
    }
}

#[test]
fn contract_pack_rejects_out_of_range_quality_and_unknown_termination() {
    let repo = repo_root();
    let schema_path = repo.join("contracts/v1/schemas/rolling-metrics.schema.json");
    let mut value = read_json(&repo.join("contracts/v1/fixtures/rolling-metrics.sample.json"));

    value["rows"][0]["quality_score"] = serde_json::json!(1.5);
    assert!(!schema_errors(&schema_path, &value).is_empty());

    value["rows"][0]["quality_score"] = serde_json::json!(0.5);
    value["lookback"]["termination"] = serde_json::json!("gave_up");
    assert!(!schema_errors(&schema_path, &value).is_empty());
}

#[test]
fn every_schema_pins_its_contract_version() {
    let schema_dir = repo_root().join("contracts/v1/schemas");
    let entries = fs::read_dir(&schema_dir)
        .unwrap_or_else(|err| panic!("failed to list {}: {err}", schema_dir.display()));

    let mut checked = 0;
    for entry in entries {
        let path = entry
            .unwrap_or_else(|err| panic!("failed to read schema entry: {err}"))
            .path();
        let schema = read_json(&path);
        let pinned = &schema["properties"]["contract_version"]["const"];
        assert!(
            pinned.as_str().is_some_and(|value| value.ends_with(".v1")),
            "{} must pin a v1 contract_version",
            path.display()
        );
        checked += 1;
    }
    assert_eq!(checked, 6);
}
