//! Core data types shared by every stage of the scan.
//!
//! Severity and confidence levels, the aggregated [`Finding`] and its
//! [`Location`] samples, run configuration with the cancellation token, and
//! the diagnostics that record degraded or skipped work.

pub mod context;
pub mod diagnostics;
pub mod fingerprint;
pub mod result;
pub mod severity;
pub mod severity_calculator;

pub use context::{
    CancellationToken, CategorySelection, LinterSpec, OutputFormat, ScanConfig, ScopeResolution,
    StructuralMode, DEFAULT_SAMPLE_CAP,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLevel, DiagnosticSink};
pub use fingerprint::FindingFingerprint;
pub use result::{Finding, FindingMode, Location, MatchMode, Verdict};
pub use severity::{Confidence, Severity};
pub use severity_calculator::{SeverityCalculator, SeverityContext, SeverityRule};
