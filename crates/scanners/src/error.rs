//! Error taxonomy for the scanner library.
//!
//! Only [`ScanError::InvalidInput`] (and the I/O or glob errors that produce
//! it) aborts a run. Every other variant is caught at the file, rule or tool
//! boundary and recorded as a diagnostic instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("tool `{tool}` is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("tool `{tool}` timed out after {}ms", .elapsed.as_millis())]
    ToolTimeout { tool: String, elapsed: Duration },

    #[error("tool `{tool}` failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("malformed rule `{rule_id}`: {reason}")]
    MalformedRule { rule_id: String, reason: String },

    #[error("skipped {}: {reason}", .path.display())]
    SkippedFile { path: PathBuf, reason: SkipReason },

    #[error("scan cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Oversized { size: u64, limit: u64 },
    Binary,
    NotUtf8,
    Unreadable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oversized { size, limit } => {
                write!(f, "file is {} bytes, limit is {}", size, limit)
            }
            Self::Binary => write!(f, "binary content"),
            Self::NotUtf8 => write!(f, "not valid UTF-8"),
            Self::Unreadable => write!(f, "unreadable"),
        }
    }
}

impl ScanError {
    pub fn tool_failed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRule {
            rule_id: rule_id.into(),
            reason: reason.into(),
        }
    }

    /// Errors that abort the whole run rather than degrading one unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Glob(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
