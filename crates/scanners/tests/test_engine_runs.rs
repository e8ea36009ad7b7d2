use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tether_scanners::core::{LinterSpec, StructuralMode};
use tether_scanners::runner::MatcherMode;
use tether_scanners::{CancellationToken, RunStatus, ScanConfig, ScanningEngine, Verdict};

fn write(root: &Path, rel: &str, text: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

fn project() -> Result<TempDir> {
    let dir = TempDir::new()?;
    let root = dir.path();
    for i in 0..7 {
        write(
            root,
            &format!("src/widgets/w{}.js", i),
            "export function mount(el) {\n  const id = setInterval(() => el.tick(), 100);\n}\n",
        )?;
    }
    write(
        root,
        "src/clean.js",
        "export function once(el) {\n  const id = setInterval(() => el.tick(), 100);\n  clearInterval(id);\n}\n",
    )?;
    write(
        root,
        "node_modules/lib/index.js",
        "const id = setInterval(() => {}, 1);\n",
    )?;
    write(root, "cmd/main.go", "package main\n\nfunc main() {\n\tt := time.NewTicker(time.Second)\n\t<-t.C\n}\n")?;
    write(root, "README.md", "setInterval is mentioned here\n")?;
    Ok(dir)
}

fn config(root: &Path) -> ScanConfig {
    let mut config = ScanConfig::new(root);
    config.structural = StructuralMode::Disabled;
    config.use_ripgrep = false;
    config
}

#[test]
fn test_directory_scan_aggregates_per_rule() -> Result<()> {
    let dir = project()?;
    let engine = ScanningEngine::new(config(dir.path()))?;
    let report = engine.run(&CancellationToken::new())?;

    assert_eq!(report.summary.files_scanned, 9);
    assert_eq!(report.summary.matcher_mode, MatcherMode::Textual);

    let interval = report
        .findings
        .iter()
        .find(|f| f.rule_id == "js.timer.interval" && f.verdict == Verdict::Leaked)
        .expect("interval leak");
    assert_eq!(interval.occurrences, 7);
    assert_eq!(interval.files, 7);
    assert_eq!(interval.locations.len(), 5);
    assert!(interval.locations.iter().all(|l| l.file.starts_with("src/widgets/")));
    assert_eq!(interval.locations[0].file, "src/widgets/w0.js");

    assert!(report.findings.iter().any(|f| f.rule_id == "go.time.ticker"));
    assert_eq!(report.categories["async-resources"].cleaned, 1);
    assert_eq!(report.summary.status, RunStatus::Issues);
    Ok(())
}

#[test]
fn test_repeated_runs_are_identical() -> Result<()> {
    let dir = project()?;
    let mut serial = config(dir.path());
    serial.threads = Some(1);
    let mut parallel = config(dir.path());
    parallel.threads = Some(4);

    let first = ScanningEngine::new(serial)?.run(&CancellationToken::new())?;
    let second = ScanningEngine::new(parallel)?.run(&CancellationToken::new())?;

    assert_eq!(
        serde_json::to_value(&first.findings)?,
        serde_json::to_value(&second.findings)?
    );
    assert_eq!(first.categories, second.categories);
    assert_eq!(first.exit_code(false), second.exit_code(false));
    Ok(())
}

#[test]
fn test_baseline_reports_delta() -> Result<()> {
    let dir = project()?;
    let engine = ScanningEngine::new(config(dir.path()))?;
    let before = engine.run(&CancellationToken::new())?;

    let baseline = dir.path().join("baseline.json");
    fs::write(&baseline, before.to_json()?)?;
    fs::remove_file(dir.path().join("cmd/main.go"))?;
    fs::remove_file(dir.path().join("src/widgets/w6.js"))?;

    let mut with_baseline = config(dir.path());
    with_baseline.baseline = Some(baseline);
    let after = ScanningEngine::new(with_baseline)?.run(&CancellationToken::new())?;
    let delta = after.baseline.expect("baseline delta");

    assert!(delta.new.is_empty());
    assert!(delta.resolved.iter().any(|e| e.rule_id == "go.time.ticker"));
    let changed = delta
        .changed
        .iter()
        .find(|c| c.rule_id == "js.timer.interval")
        .expect("interval count changed");
    assert_eq!((changed.before, changed.after), (7, 6));
    Ok(())
}

#[test]
fn test_missing_baseline_is_invalid_input() -> Result<()> {
    let dir = project()?;
    let mut cfg = config(dir.path());
    cfg.baseline = Some(dir.path().join("nope.json"));
    let err = ScanningEngine::new(cfg)?
        .run(&CancellationToken::new())
        .unwrap_err();
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn test_oversized_files_are_skipped_not_fatal() -> Result<()> {
    let dir = project()?;
    write(dir.path(), "src/huge.js", &"// padding\n".repeat(200))?;
    let mut cfg = config(dir.path());
    cfg.max_file_size = 1024;

    let report = ScanningEngine::new(cfg)?.run(&CancellationToken::new())?;
    assert_eq!(report.summary.files_skipped, 1);
    assert_eq!(report.diagnostics.counts["skipped_file"], 1);
    assert!(!report.summary.degraded);
    Ok(())
}

#[test]
fn test_include_globs_narrow_the_scan() -> Result<()> {
    let dir = project()?;
    let mut cfg = config(dir.path());
    cfg.include = vec!["**/*.go".to_string()];

    let report = ScanningEngine::new(cfg)?.run(&CancellationToken::new())?;
    assert_eq!(report.summary.files_scanned, 1);
    assert!(report.findings.iter().all(|f| f.language == "go"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_supplementary_linter_counts() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "app.js", "console.log('ok');\n")?;
    let mut cfg = config(dir.path());
    cfg.linters = vec![LinterSpec {
        name: "fake-lint".to_string(),
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'app.js:1:1: no-console'; exit 1".to_string(),
        ],
        timeout_ms: None,
    }];

    let report = ScanningEngine::new(cfg)?.run(&CancellationToken::new())?;
    assert!(report.findings.is_empty());
    assert_eq!(report.supplementary.len(), 1);
    assert_eq!(report.supplementary[0].count, 1);
    assert_eq!(report.summary.status, RunStatus::Issues);
    assert_eq!(report.exit_code(true), 0);
    Ok(())
}
