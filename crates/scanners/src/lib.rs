//! Tether Scanners - Resource Lifecycle Correlation
//!
//! Finds resources that are acquired but never released: timers, listeners,
//! subscriptions, observers, handles and the like. Each rule pairs acquisition
//! patterns with cleanup patterns; a cleanup only counts when its bindings
//! unify with the acquisition and it sits in a context that actually runs it
//! (same scope, `finally`/`defer`, a returned cleanup closure, or the paired
//! lifecycle teardown).

pub mod aggregate;
pub mod catalog;
pub mod core;
pub mod correlation;
pub mod error;
pub mod matcher;
pub mod runner;
pub mod scope;

pub use catalog::{Language, ResourceRule, RuleCatalog};
pub use core::{
    CancellationToken, Confidence, Diagnostic, DiagnosticKind, Finding, Location, ScanConfig,
    Severity, Verdict,
};
pub use error::{Result, ScanError};
pub use runner::{RunStatus, ScanReport, ScanningEngine};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
