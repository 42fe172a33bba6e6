use std::fs;

use assert_cmd::Command;
use assert_fs::prelude::*;
use serde_json::{Value, json};

const ORDER_FORM: &str = include_str!("fixtures/order_form.json");
const CHECKOUT: &str = include_str!("fixtures/checkout_workflow.json");

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn validate_accepts_complete_values() -> TestResult {
    let workspace = assert_fs::TempDir::new()?;
    let spec = workspace.child("order.json");
    spec.write_str(ORDER_FORM)?;
    let values = workspace.child("values.json");
    values.write_str(
        &json!({
            "customer": "Ada",
            "items": [{ "name": "ebook", "kind": "digital", "qty": 1 }]
        })
        .to_string(),
    )?;

    let output = Command::cargo_bin("stepform")?
        .arg("validate")
        .arg("--spec")
        .arg(spec.path())
        .arg("--values")
        .arg(values.path())
        .assert()
        .success()
        .get_output()
        .clone();
    assert!(stdout_of(&output).contains("Validation result: valid"));
    Ok(())
}

#[test]
fn validate_reports_item_errors_by_position() -> TestResult {
    let workspace = assert_fs::TempDir::new()?;
    let spec = workspace.child("order.json");
    spec.write_str(ORDER_FORM)?;
    let values = workspace.child("values.json");
    values.write_str(
        &json!({
            "customer": "Ada",
            "items": [
                { "name": "ebook", "kind": "digital", "qty": 1 },
                { "name": "lamp", "kind": "physical", "qty": 1 }
            ]
        })
        .to_string(),
    )?;

    let output = Command::cargo_bin("stepform")?
        .arg("validate")
        .arg("--spec")
        .arg(spec.path())
        .arg("--values")
        .arg(values.path())
        .assert()
        .failure()
        .get_output()
        .clone();
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Validation result: invalid"));
    assert!(stdout.contains("items[1].weight"));
    assert!(stdout.contains("CONDITIONAL_REQUIRED"));
    assert!(!stdout.contains("[k1]"));
    Ok(())
}

#[test]
fn structure_normalizes_values() -> TestResult {
    let workspace = assert_fs::TempDir::new()?;
    let spec = workspace.child("order.json");
    spec.write_str(ORDER_FORM)?;
    let values = workspace.child("values.json");
    values.write_str(r#"{ "customer": "Ada" }"#)?;

    let output = Command::cargo_bin("stepform")?
        .arg("structure")
        .arg("--spec")
        .arg(spec.path())
        .arg("--values")
        .arg(values.path())
        .assert()
        .success()
        .get_output()
        .clone();
    let normalized: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(normalized["customer"], "Ada");
    assert_eq!(normalized["gift"], false);
    assert_eq!(normalized["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(normalized["items"][0]["kind"], "physical");
    Ok(())
}

#[test]
fn walk_submits_visible_steps_and_saves_snapshot() -> TestResult {
    let workspace = assert_fs::TempDir::new()?;
    let workflow = workspace.child("checkout.json");
    workflow.write_str(CHECKOUT)?;
    let data = workspace.child("data.json");
    data.write_str(r#"{ "products": { "items": ["Y"] } }"#)?;
    let state_dir = workspace.child("state");

    let output = Command::cargo_bin("stepform")?
        .arg("walk")
        .arg("--workflow")
        .arg(workflow.path())
        .arg("--data")
        .arg(data.path())
        .arg("--state-dir")
        .arg(state_dir.path())
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .clone();
    let summary: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["path"], json!(["products", "shipping", "review"]));
    assert!(summary["submitted"].get("company").is_none());
    assert_eq!(summary["submitted"]["products"]["items"], json!(["Y"]));

    let snapshot = fs::read_to_string(state_dir.path().join("checkout-draft.snapshot.json"))?;
    let snapshot: Value = serde_json::from_str(&snapshot)?;
    assert_eq!(snapshot["workflow_id"], "checkout");
    assert_eq!(snapshot["version"], 1);
    Ok(())
}

#[test]
fn walk_stops_at_an_incomplete_required_step() -> TestResult {
    let workspace = assert_fs::TempDir::new()?;
    let workflow = workspace.child("checkout.json");
    workflow.write_str(CHECKOUT)?;
    let data = workspace.child("data.json");
    data.write_str(r#"{ "products": { "items": ["X"] } }"#)?;

    let output = Command::cargo_bin("stepform")?
        .arg("walk")
        .arg("--workflow")
        .arg(workflow.path())
        .arg("--data")
        .arg(data.path())
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Step 'company' is incomplete"));
    assert!(stderr.contains("name"));
    Ok(())
}

#[test]
fn walk_rejects_workflow_without_steps() -> TestResult {
    let workspace = assert_fs::TempDir::new()?;
    let workflow = workspace.child("empty.json");
    workflow.write_str(r#"{ "id": "empty", "steps": [] }"#)?;

    let output = Command::cargo_bin("stepform")?
        .arg("walk")
        .arg("--workflow")
        .arg(workflow.path())
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("workflow has no steps"));
    assert!(stderr.contains("workflow 'empty' has no steps"));
    assert!(!stderr.contains("panicked"));
    Ok(())
}

#[test]
fn schema_prints_form_schema() -> TestResult {
    let output = Command::cargo_bin("stepform")?
        .arg("schema")
        .arg("--kind")
        .arg("workflow")
        .assert()
        .success()
        .get_output()
        .clone();
    let schema: Value = serde_json::from_slice(&output.stdout)?;
    assert!(schema["properties"].get("steps").is_some());
    Ok(())
}
