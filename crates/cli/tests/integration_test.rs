use anyhow::Result;
use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

fn tether(args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_tether"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()?)
}

fn leaky_project() -> Result<TempDir> {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join("poller.js"),
        "export function start(store) {\n  const id = setInterval(() => store.refresh(), 1000);\n}\n",
    )?;
    fs::write(
        dir.path().join("menu.js"),
        r#"class Menu extends HTMLElement {
  connectedCallback() {
    window.addEventListener("resize", this.layout);
  }
  disconnectedCallback() {
    window.removeEventListener("scroll", this.layout);
  }
}
"#,
    )?;
    Ok(dir)
}

#[test]
fn test_scan_json_report_and_exit_code() -> Result<()> {
    let dir = leaky_project()?;
    let root = dir.path().to_str().unwrap_or_default();

    let output = tether(&["scan", "run", "--input", root, "--no-structural", "--no-ripgrep", "--format", "json"])?;
    assert_eq!(
        output.status.code(),
        Some(1),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["schema_version"], 1);
    assert_eq!(report["summary"]["status"], "issues");
    assert_eq!(report["summary"]["matcher_mode"], "textual");
    let ids: Vec<&str> = report["findings"]
        .as_array()
        .map(|f| f.iter().filter_map(|x| x["rule_id"].as_str()).collect())
        .unwrap_or_default();
    assert!(ids.contains(&"js.timer.interval"));
    assert!(ids.contains(&"js.listener.dom"));
    Ok(())
}

#[test]
fn test_warning_only_leaks_respect_fail_on_warning() -> Result<()> {
    let dir = leaky_project()?;
    fs::remove_file(dir.path().join("poller.js"))?;
    let root = dir.path().to_str().unwrap_or_default();

    let lenient = tether(&["scan", "run", "--input", root, "--no-structural", "--no-ripgrep"])?;
    assert_eq!(lenient.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&lenient.stdout).contains("js.listener.dom"));

    let strict = tether(&[
        "scan", "run", "--input", root, "--no-structural", "--no-ripgrep", "--fail-on-warning",
    ])?;
    assert_eq!(strict.status.code(), Some(1));
    Ok(())
}

#[test]
fn test_markdown_written_to_output_file() -> Result<()> {
    let dir = leaky_project()?;
    let root = dir.path().to_str().unwrap_or_default();
    let report_path = dir.path().join("report.md");

    let output = tether(&[
        "scan",
        "run",
        "--input",
        root,
        "--no-structural",
        "--no-ripgrep",
        "--format",
        "markdown",
        "--output",
        report_path.to_str().unwrap_or_default(),
    ])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());

    let markdown = fs::read_to_string(&report_path)?;
    assert!(markdown.starts_with("# Resource Lifecycle Report"));
    assert!(markdown.contains("js.timer.interval"));
    Ok(())
}

#[test]
fn test_config_file_and_category_skip() -> Result<()> {
    let dir = leaky_project()?;
    let config_path = dir.path().join("tether.json");
    fs::write(
        &config_path,
        r#"{"structural": "disabled", "use_ripgrep": false, "categories": {"skip": ["async-resources"]}}"#,
    )?;
    let root = dir.path().to_str().unwrap_or_default();

    let output = tether(&[
        "scan",
        "run",
        "--input",
        root,
        "--config",
        config_path.to_str().unwrap_or_default(),
        "--format",
        "json",
    ])?;
    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let findings = report["findings"].as_array().cloned().unwrap_or_default();
    assert!(findings.iter().all(|f| f["category"] != "async-resources"));
    Ok(())
}

#[test]
fn test_invalid_input_exits_two() -> Result<()> {
    let missing = tether(&["scan", "run", "--input", "/no/such/project/here"])?;
    assert_eq!(missing.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("does not exist"));

    let dir = TempDir::new()?;
    let root = dir.path().to_str().unwrap_or_default();
    let bad_glob = tether(&["scan", "run", "--input", root, "--include", "src/[", "--no-structural"])?;
    assert_eq!(bad_glob.status.code(), Some(2));

    let bad_flag = tether(&["scan", "run", "--input", root, "--format", "xml"])?;
    assert_eq!(bad_flag.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_rules_list_by_language() -> Result<()> {
    let output = tether(&["rules", "list", "--language", "go", "--json"])?;
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let rows = rows.as_array().cloned().unwrap_or_default();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r["language"] == "go"));

    let unknown = tether(&["rules", "list", "--language", "cobol"])?;
    assert_eq!(unknown.status.code(), Some(2));
    Ok(())
}
