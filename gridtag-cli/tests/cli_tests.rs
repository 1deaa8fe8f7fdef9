//! End-to-end checks of the `gridtag` binary against temp files.

use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn gridtag(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gridtag"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to spawn gridtag")
}

fn write_json(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn workbook() -> Value {
    json!({
        "file_name": "financial_report.xlsx",
        "sheets": [{
            "name": "Summary",
            "grid": [
                ["Company", "2022", "2023"],
                ["Revenue", 1000000, 1200000],
                ["Profit", 300000, 350000],
                ["Margin", "30%", "29.2%"]
            ],
            "merges": []
        }]
    })
}

#[test]
fn workbook_to_stdout() {
    let dir = TempDir::new().unwrap();
    let input = write_json(dir.path(), "book.json", &workbook());

    let out = gridtag(&["--input", &input]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let doc: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(doc["document_type"], "excel");
    let tags: Vec<&str> = doc["global_tags"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    for tag in ["2022", "2023", "revenue", "high_revenue"] {
        assert!(tags.contains(&tag), "missing {tag}");
    }
}

#[test]
fn output_file_and_tag_filter() {
    let dir = TempDir::new().unwrap();
    let input = write_json(dir.path(), "book.json", &workbook());
    let output = dir.path().join("out.json");

    let out = gridtag(&[
        "--input",
        &input,
        "--tag",
        "revenue",
        "--tag",
        "2023",
        "--output",
        output.to_str().unwrap(),
    ]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());

    let matches: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(matches.as_array().unwrap().len(), 1);
    assert_eq!(matches[0]["status"], "displayable");

    let out = gridtag(&["--input", &input, "--tag", "revenue", "--max-cells", "4"]);
    let matches: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(matches[0]["status"], "oversized");
    assert_eq!(matches[0]["cells"], 9);
}

#[test]
fn api_payload_with_custom_config() {
    let dir = TempDir::new().unwrap();
    let input = write_json(
        dir.path(),
        "crm.json",
        &json!({"deals": [{"client": "Acme LLC", "amount": 2500}]}),
    );
    let config = dir.path().join("config.yaml");
    fs::write(&config, "search:\n  max_display_cells: 50\n").unwrap();

    let out = gridtag(&["--input", &input, "--api", "--config", config.to_str().unwrap()]);
    assert!(out.status.success());
    let doc: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(doc["document_type"], "api");
    assert_eq!(doc["metadata"]["source"], "crm");
    let tags = doc["global_tags"].as_array().unwrap();
    assert!(tags.contains(&json!("company")));
    assert!(tags.contains(&json!("large_amount")));
}

#[test]
fn show_config_prints_yaml() {
    let out = gridtag(&["--show-config", "--max-cells", "77"]);
    assert!(out.status.success());
    let yaml = String::from_utf8(out.stdout).unwrap();
    assert!(yaml.contains("max_display_cells: 77"));
    assert!(yaml.contains("high_revenue"));
}

#[test]
fn failures_exit_with_status_one() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");
    let out = gridtag(&["--input", missing.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Input not found"));

    let empty = write_json(dir.path(), "empty.json", &json!({"file_name": "x.xlsx", "sheets": []}));
    let out = gridtag(&["--input", &empty]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("missing required input: sheets"));
}
