use crate::core::{Confidence, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub snippet: Option<String>,
}

impl Location {
    pub fn new(file: String, line: usize, column: usize) -> Self {
        Self {
            file,
            line,
            column,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: String) -> Self {
        self.snippet = Some(snippet);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Outcome of correlating one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Cleaned,
    Leaked,
    Ambiguous,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleaned => write!(f, "cleaned"),
            Self::Leaked => write!(f, "leaked"),
            Self::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Which matcher produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Structural,
    Textual,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Textual => write!(f, "textual"),
        }
    }
}

/// Mode summary for an aggregated finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingMode {
    Structural,
    Textual,
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,

    pub verdict: Verdict,

    pub severity: Severity,

    pub base_severity: Severity,

    pub confidence: Confidence,

    pub confidence_score: f64,

    pub resource_kind: String,

    pub category: String,

    pub language: String,

    pub title: String,

    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub remediation: Option<String>,

    pub occurrences: usize,

    pub files: usize,

    pub locations: Vec<Location>,

    pub mode: FindingMode,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub escalation_factors: Vec<String>,
}

impl Finding {
    pub fn new(
        rule_id: String,
        verdict: Verdict,
        severity: Severity,
        confidence: Confidence,
        title: String,
        description: String,
    ) -> Self {
        Self {
            rule_id,
            verdict,
            severity,
            base_severity: severity,
            confidence,
            confidence_score: confidence.to_score(),
            resource_kind: String::new(),
            category: String::new(),
            language: String::new(),
            title,
            description,
            remediation: None,
            occurrences: 0,
            files: 0,
            locations: Vec::new(),
            mode: FindingMode::Structural,
            escalation_factors: Vec::new(),
        }
    }

    pub fn with_kind(mut self, resource_kind: &str, category: &str, language: &str) -> Self {
        self.resource_kind = resource_kind.to_string();
        self.category = category.to_string();
        self.language = language.to_string();
        self
    }

    pub fn with_remediation(mut self, remediation: String) -> Self {
        self.remediation = Some(remediation);
        self
    }

    pub fn with_counts(mut self, occurrences: usize, files: usize) -> Self {
        self.occurrences = occurrences;
        self.files = files;
        self
    }

    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_mode(mut self, mode: FindingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn adjust_severity(mut self, new_severity: Severity) -> Self {
        self.severity = new_severity;
        self
    }

    /// A leaked finding is confirmed; ambiguous ones never drive the exit code.
    pub fn is_confirmed(&self) -> bool {
        self.verdict == Verdict::Leaked
    }
}
