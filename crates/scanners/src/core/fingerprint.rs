//! Finding fingerprints for baseline comparison.
//!
//! Findings are aggregated per (rule id, verdict), so the fingerprint is that
//! pair plus the resource kind. Location samples are not part of it.

use crate::core::{Finding, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FindingFingerprint {
    pub rule_id: String,
    pub verdict: Verdict,
    pub resource_kind: String,
}

impl FindingFingerprint {
    pub fn from_finding(finding: &Finding) -> Self {
        Self {
            rule_id: finding.rule_id.clone(),
            verdict: finding.verdict,
            resource_kind: finding.resource_kind.clone(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.rule_id, self.verdict, self.resource_kind)
    }
}

impl fmt::Display for FindingFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Confidence, Location, Severity};

    #[test]
    fn test_fingerprint_ignores_locations() {
        let base = Finding::new(
            "go.time.ticker".to_string(),
            Verdict::Leaked,
            Severity::Critical,
            Confidence::High,
            "t".to_string(),
            "d".to_string(),
        )
        .with_kind("timer", "async-resources", "go");
        let moved = base
            .clone()
            .with_locations(vec![Location::new("main.go".to_string(), 40, 2)]);

        assert_eq!(
            FindingFingerprint::from_finding(&base),
            FindingFingerprint::from_finding(&moved)
        );
        assert_eq!(
            FindingFingerprint::from_finding(&base).key(),
            "go.time.ticker:leaked:timer"
        );
    }
}
