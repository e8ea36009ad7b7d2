use crate::aggregate::CategoryTotals;
use crate::core::{Diagnostic, Finding, Location, Severity, Verdict};
use crate::error::Result;
use crate::runner::baseline::BaselineDelta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Clean,
    CleanDegraded,
    Issues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherMode {
    Structural,
    Textual,
    Mixed,
}

impl MatcherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Textual => "textual",
            Self::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCount {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub root: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub rules_loaded: usize,
    pub matcher_mode: MatcherMode,
    pub ast_grep_version: Option<String>,
    pub severity_counts: SeverityCount,
    pub leaked: usize,
    pub ambiguous: usize,
    pub status: RunStatus,
    pub degraded: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticTotals {
    pub counts: BTreeMap<String, usize>,
    pub samples: Vec<Diagnostic>,
}

/// Output of one configured third-party linter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementaryFinding {
    pub linter: String,
    pub count: usize,
    pub samples: Vec<Location>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub schema_version: u32,
    pub tool_version: String,
    pub summary: RunSummary,
    pub findings: Vec<Finding>,
    pub categories: BTreeMap<String, CategoryTotals>,
    pub diagnostics: DiagnosticTotals,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplementary: Vec<SupplementaryFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineDelta>,
}

impl ScanReport {
    pub fn count_by_severity(findings: &[Finding]) -> SeverityCount {
        let mut count = SeverityCount::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => count.critical += 1,
                Severity::Warning => count.warning += 1,
                Severity::Info => count.info += 1,
            }
        }
        count
    }

    pub fn status_for(findings: &[Finding], supplementary: &[SupplementaryFinding], degraded: bool) -> RunStatus {
        if !findings.is_empty() || supplementary.iter().any(|s| s.count > 0) {
            RunStatus::Issues
        } else if degraded {
            RunStatus::CleanDegraded
        } else {
            RunStatus::Clean
        }
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_confirmed())
    }

    /// 1 when a leaked critical finding exists, or a leaked warning finding
    /// when `fail_on_warning` is set; 0 otherwise.
    pub fn exit_code(&self, fail_on_warning: bool) -> i32 {
        let failing = self.confirmed().any(|f| {
            f.severity == Severity::Critical || (fail_on_warning && f.severity == Severity::Warning)
        });
        i32::from(failing)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let summary = &self.summary;
        let mut md = String::from("# Resource Lifecycle Report\n\n");

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- Status: {}\n", status_label(summary.status)));
        md.push_str(&format!(
            "- Files: {} scanned, {} skipped\n",
            summary.files_scanned, summary.files_skipped
        ));
        md.push_str(&format!("- Matcher: {}\n", summary.matcher_mode.as_str()));
        md.push_str(&format!("- Critical: {}\n", summary.severity_counts.critical));
        md.push_str(&format!("- Warning: {}\n", summary.severity_counts.warning));
        md.push_str(&format!("- Info: {}\n", summary.severity_counts.info));
        if summary.cancelled {
            md.push_str("- Cancelled: partial results\n");
        }
        md.push('\n');

        if !self.findings.is_empty() {
            md.push_str("## Findings\n\n");
            for finding in &self.findings {
                md.push_str(&format!(
                    "### {} {}: {}\n\n",
                    finding.severity.emoji(),
                    finding.severity,
                    finding.title
                ));
                md.push_str(&format!("**Rule:** `{}` ({})\n", finding.rule_id, finding.verdict));
                md.push_str(&format!(
                    "**Occurrences:** {} in {} file(s)\n",
                    finding.occurrences, finding.files
                ));
                md.push_str(&format!("**Confidence:** {}\n\n", finding.confidence));
                md.push_str(&format!("{}\n\n", finding.description));
                if let Some(remediation) = &finding.remediation {
                    md.push_str(&format!("**Fix:** {}\n\n", remediation));
                }
                if !finding.locations.is_empty() {
                    md.push_str("**Locations:**\n");
                    for loc in &finding.locations {
                        md.push_str(&format!("- {}", loc));
                        if let Some(snippet) = &loc.snippet {
                            md.push_str(&format!(" `{}`", snippet.replace('`', "'")));
                        }
                        md.push('\n');
                    }
                    md.push('\n');
                }
            }
        }

        if !self.categories.is_empty() {
            md.push_str("## Categories\n\n| Category | Cleaned | Leaked | Ambiguous |\n|---|---|---|---|\n");
            for (category, totals) in &self.categories {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    category, totals.cleaned, totals.leaked, totals.ambiguous
                ));
            }
            md.push('\n');
        }

        if !self.supplementary.is_empty() {
            md.push_str("## Linters\n\n");
            for linter in &self.supplementary {
                md.push_str(&format!("- {}: {} issue(s)\n", linter.linter, linter.count));
            }
            md.push('\n');
        }

        if let Some(delta) = &self.baseline {
            md.push_str("## Baseline\n\n");
            md.push_str(&format!(
                "- New: {}\n- Resolved: {}\n- Changed: {}\n\n",
                delta.new.len(),
                delta.resolved.len(),
                delta.changed.len()
            ));
        }

        if !self.diagnostics.counts.is_empty() {
            md.push_str("## Diagnostics\n\n");
            for (kind, count) in &self.diagnostics.counts {
                md.push_str(&format!("- {}: {}\n", kind, count));
            }
        }

        md
    }
}

pub fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Clean => "clean",
        RunStatus::CleanDegraded => "clean (degraded)",
        RunStatus::Issues => "issues found",
    }
}

/// Findings that count towards the summary's leaked / ambiguous totals.
pub fn verdict_totals(findings: &[Finding]) -> (usize, usize) {
    findings.iter().fold((0, 0), |(leaked, ambiguous), f| match f.verdict {
        Verdict::Leaked => (leaked + f.occurrences, ambiguous),
        Verdict::Ambiguous => (leaked, ambiguous + f.occurrences),
        Verdict::Cleaned => (leaked, ambiguous),
    })
}
