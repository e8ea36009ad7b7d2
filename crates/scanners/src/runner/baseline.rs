//! Comparison against a previous JSON report.

use crate::core::{Finding, FindingFingerprint, Verdict};
use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub rule_id: String,
    pub verdict: Verdict,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaChange {
    pub rule_id: String,
    pub verdict: Verdict,
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineDelta {
    pub new: Vec<DeltaEntry>,
    pub resolved: Vec<DeltaEntry>,
    pub changed: Vec<DeltaChange>,
}

#[derive(Debug, Deserialize)]
struct BaselineFile {
    findings: Vec<BaselineFinding>,
}

#[derive(Debug, Deserialize)]
struct BaselineFinding {
    rule_id: String,
    verdict: Verdict,
    #[serde(default)]
    resource_kind: String,
    occurrences: usize,
}

/// Occurrence counts per finding fingerprint of a previous report.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    counts: BTreeMap<FindingFingerprint, usize>,
}

impl Baseline {
    /// An unreadable or malformed baseline is invalid input.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScanError::InvalidInput(format!("cannot read baseline {}: {}", path.display(), e))
        })?;
        Self::parse(&text).map_err(|e| {
            ScanError::InvalidInput(format!("invalid baseline {}: {}", path.display(), e))
        })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let file: BaselineFile = serde_json::from_str(text)?;
        let mut counts = BTreeMap::new();
        for f in file.findings {
            let key = FindingFingerprint {
                rule_id: f.rule_id,
                verdict: f.verdict,
                resource_kind: f.resource_kind,
            };
            *counts.entry(key).or_insert(0) += f.occurrences;
        }
        Ok(Self { counts })
    }

    pub fn compare(&self, findings: &[Finding]) -> BaselineDelta {
        let mut current: BTreeMap<FindingFingerprint, usize> = BTreeMap::new();
        for finding in findings {
            *current
                .entry(FindingFingerprint::from_finding(finding))
                .or_insert(0) += finding.occurrences;
        }

        let mut delta = BaselineDelta::default();
        for (key, &after) in &current {
            match self.counts.get(key) {
                None => delta.new.push(entry(key, after)),
                Some(&before) if before != after => delta.changed.push(DeltaChange {
                    rule_id: key.rule_id.clone(),
                    verdict: key.verdict,
                    before,
                    after,
                }),
                Some(_) => {}
            }
        }
        for (key, &before) in &self.counts {
            if !current.contains_key(key) {
                delta.resolved.push(entry(key, before));
            }
        }
        delta
    }
}

fn entry(key: &FindingFingerprint, occurrences: usize) -> DeltaEntry {
    DeltaEntry {
        rule_id: key.rule_id.clone(),
        verdict: key.verdict,
        occurrences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Confidence, Severity};

    fn finding(rule: &str, kind: &str, occurrences: usize) -> Finding {
        Finding::new(
            rule.to_string(),
            Verdict::Leaked,
            Severity::Warning,
            Confidence::High,
            "t".to_string(),
            "d".to_string(),
        )
        .with_kind(kind, "c", "js")
        .with_counts(occurrences, 1)
    }

    #[test]
    fn test_delta_new_resolved_changed() {
        let baseline = Baseline::parse(
            r#"{"schema_version": 1, "findings": [
                {"rule_id": "js.socket", "verdict": "leaked", "resource_kind": "socket", "occurrences": 1},
                {"rule_id": "js.observer", "verdict": "leaked", "resource_kind": "observer", "occurrences": 2},
                {"rule_id": "js.fs.open", "verdict": "leaked", "resource_kind": "file_handle", "occurrences": 4}
            ]}"#,
        )
        .unwrap();

        let delta = baseline.compare(&[
            finding("js.observer", "observer", 3),
            finding("js.fs.open", "file_handle", 4),
            finding("js.timer.interval", "timer", 1),
        ]);

        assert_eq!(delta.new.len(), 1);
        assert_eq!(delta.new[0].rule_id, "js.timer.interval");
        assert_eq!(delta.resolved.len(), 1);
        assert_eq!(delta.resolved[0].rule_id, "js.socket");
        assert_eq!(
            delta.changed,
            vec![DeltaChange {
                rule_id: "js.observer".to_string(),
                verdict: Verdict::Leaked,
                before: 2,
                after: 3,
            }]
        );
    }

    #[test]
    fn test_malformed_baseline_is_invalid_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Baseline::load(&path), Err(ScanError::InvalidInput(_))));
        assert!(matches!(
            Baseline::load(&dir.path().join("missing.json")),
            Err(ScanError::InvalidInput(_))
        ));
    }
}
