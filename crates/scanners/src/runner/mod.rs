//! Scan orchestration
//!
//! Discovers files, runs the per-file pipeline (load, match, resolve scopes,
//! correlate) in parallel, reduces the partial totals and renders the report.
//! Supplementary linters and baseline comparison hang off the same run.

pub mod baseline;
pub mod engine;
pub mod files;
pub mod linters;
pub mod report;

pub use baseline::{Baseline, BaselineDelta, DeltaChange, DeltaEntry};
pub use engine::ScanningEngine;
pub use files::{DiscoveredFile, FileDiscovery};
pub use report::{
    DiagnosticTotals, MatcherMode, RunStatus, RunSummary, ScanReport, SeverityCount,
    SupplementaryFinding, SCHEMA_VERSION,
};
