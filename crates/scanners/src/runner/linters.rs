//! Optional third-party linters. Each linter runs once from the project root
//! and contributes one supplementary finding built from its
//! `file:line[:col]: message` output lines.

use crate::core::{CancellationToken, Diagnostic, LinterSpec, Location};
use crate::error::{Result, ScanError};
use crate::matcher::ToolCommand;
use crate::runner::report::SupplementaryFinding;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

static LINT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>[^:\s][^:]*):(?P<line>\d+)(?::(?P<col>\d+))?:\s*(?P<message>.*)$")
        .expect("Invalid regex")
});

pub fn run_linter(
    spec: &LinterSpec,
    root: &Path,
    default_timeout: Duration,
    sample_cap: usize,
    cancel: &CancellationToken,
) -> Result<SupplementaryFinding> {
    let (program, args) = spec
        .command
        .split_first()
        .ok_or_else(|| ScanError::InvalidInput(format!("linter `{}` has an empty command", spec.name)))?;
    let timeout = spec
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);

    let cwd = if root.is_dir() {
        root
    } else {
        root.parent().unwrap_or(root)
    };
    let output = ToolCommand::new(program, timeout)
        .args(args)
        .current_dir(cwd)
        .run(cancel)?;

    let finding = parse_output(&spec.name, &output.stdout_lossy(), sample_cap);
    if finding.count == 0 && !output.status.success() {
        let stderr = output.stderr_lossy();
        let reason = stderr.lines().next().unwrap_or("no output").to_string();
        return Err(ScanError::tool_failed(
            spec.name.clone(),
            format!("exited with {:?}: {}", output.code(), reason),
        ));
    }
    Ok(finding)
}

pub fn parse_output(name: &str, stdout: &str, sample_cap: usize) -> SupplementaryFinding {
    let mut samples = Vec::new();
    let mut count = 0;
    for line in stdout.lines() {
        let Some(caps) = LINT_LINE.captures(line.trim_end()) else {
            continue;
        };
        let Ok(line_no) = caps["line"].parse::<usize>() else {
            continue;
        };
        let column = caps
            .name("col")
            .and_then(|c| c.as_str().parse().ok())
            .unwrap_or(0);
        count += 1;
        samples.push(
            Location::new(caps["file"].to_string(), line_no, column)
                .with_snippet(caps["message"].trim().to_string()),
        );
    }
    samples.sort();
    samples.truncate(sample_cap);
    SupplementaryFinding {
        linter: name.to_string(),
        count,
        samples,
    }
}

/// Runs every linter; failures become diagnostics.
pub fn run_all(
    linters: &[LinterSpec],
    root: &Path,
    default_timeout: Duration,
    sample_cap: usize,
    cancel: &CancellationToken,
) -> (Vec<SupplementaryFinding>, Vec<Diagnostic>) {
    let mut findings = Vec::new();
    let mut diagnostics = Vec::new();
    for spec in linters {
        match run_linter(spec, root, default_timeout, sample_cap, cancel) {
            Ok(finding) => findings.push(finding),
            Err(err) => {
                warn!(linter = %spec.name, "linter failed: {}", err);
                diagnostics.push(Diagnostic::from_error(&err).with_rule(spec.name.clone()));
            }
        }
    }
    (findings, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DiagnosticKind;

    #[test]
    fn test_parse_output() {
        let out = "src/a.py:12:5: W0612 unused variable\nnoise line\nsrc/b.py:3: E1 bad\n";
        let finding = parse_output("pylint", out, 5);
        assert_eq!(finding.count, 2);
        assert_eq!(finding.samples[0].file, "src/a.py");
        assert_eq!(finding.samples[0].column, 5);
        assert_eq!(finding.samples[1].line, 3);
        assert_eq!(finding.samples[1].snippet.as_deref(), Some("E1 bad"));
    }

    #[test]
    fn test_missing_linter_is_a_diagnostic() {
        let spec = LinterSpec {
            name: "nope".to_string(),
            command: vec!["definitely-not-a-linter-binary".to_string()],
            timeout_ms: None,
        };
        let (findings, diagnostics) = run_all(
            &[spec],
            Path::new("."),
            Duration::from_secs(2),
            5,
            &CancellationToken::new(),
        );
        assert!(findings.is_empty());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ToolUnavailable);
    }

    #[cfg(unix)]
    #[test]
    fn test_linter_output_is_collected() {
        let spec = LinterSpec {
            name: "echo".to_string(),
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo 'a.go:1:2: leak'; exit 1".to_string(),
            ],
            timeout_ms: Some(5_000),
        };
        let finding = run_linter(
            &spec,
            Path::new("."),
            Duration::from_secs(5),
            5,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(finding.count, 1);
    }
}
