//! Command implementations for the tether CLI
//!
//! `scan` runs the lifecycle correlation over a project and renders the report;
//! `rules` lists the built-in catalog together with any user rule files.

pub mod rules;
pub mod scan;
