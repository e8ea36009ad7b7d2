//! Non-finding events: skipped files, degraded tools, dropped rules.

use crate::error::ScanError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ToolUnavailable,
    ToolTimeout,
    ToolFailed,
    MalformedRule,
    SkippedFile,
    ScopeFallback,
    Cancelled,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolUnavailable => "tool_unavailable",
            Self::ToolTimeout => "tool_timeout",
            Self::ToolFailed => "tool_failed",
            Self::MalformedRule => "malformed_rule",
            Self::SkippedFile => "skipped_file",
            Self::ScopeFallback => "scope_fallback",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this event lowers confidence in a clean result.
    pub fn degrades(&self) -> bool {
        !matches!(self, Self::SkippedFile | Self::MalformedRule)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub level: DiagnosticLevel,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rule_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            level: DiagnosticLevel::Info,
            path: None,
            rule_id: None,
            message: message.into(),
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            ..Self::info(kind, message)
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn from_error(error: &ScanError) -> Self {
        match error {
            ScanError::ToolUnavailable { .. } => {
                Self::info(DiagnosticKind::ToolUnavailable, error.to_string())
            }
            ScanError::ToolTimeout { .. } => {
                Self::info(DiagnosticKind::ToolTimeout, error.to_string())
            }
            ScanError::MalformedRule { rule_id, .. } => {
                Self::warning(DiagnosticKind::MalformedRule, error.to_string()).with_rule(rule_id)
            }
            ScanError::SkippedFile { path, .. } => {
                Self::info(DiagnosticKind::SkippedFile, error.to_string())
                    .with_path(path.display().to_string())
            }
            ScanError::Cancelled => Self::info(DiagnosticKind::Cancelled, error.to_string()),
            _ => Self::info(DiagnosticKind::ToolFailed, error.to_string()),
        }
    }
}

/// Collects diagnostics from run-level steps that are not part of the
/// per-file reduction (catalog loading, tool probes, linters).
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }

    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.entries.lock().extend(diagnostics);
    }

    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
