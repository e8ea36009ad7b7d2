//! Mergeable per-file totals and finding finalization.
//!
//! Each file folds its correlation results into a [`PartialTotals`]; rayon
//! reduces the partials with [`PartialTotals::merge`], which is associative
//! and commutative (counts add, capped samples keep the smallest locations
//! of the union). [`PartialTotals::into_findings`] turns the totals into one
//! finding per (rule id, verdict).

use crate::catalog::{ResourceRule, RuleCatalog};
use crate::core::{
    Confidence, Diagnostic, Finding, FindingMode, Location, MatchMode, SeverityCalculator,
    Verdict,
};
use crate::correlation::CorrelationResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const SNIPPET_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FindingKey {
    pub rule_id: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingTotals {
    pub occurrences: usize,
    pub files: usize,
    pub samples: Vec<Location>,
    pub structural: usize,
    /// Structural matches whose scope tree was precise.
    pub exact: usize,
}

impl FindingTotals {
    fn merge(&mut self, other: FindingTotals, cap: usize) {
        self.occurrences += other.occurrences;
        self.files += other.files;
        self.structural += other.structural;
        self.exact += other.exact;
        self.samples = smallest(std::mem::take(&mut self.samples), other.samples, cap);
    }

    pub fn confidence(&self, verdict: Verdict) -> Confidence {
        if verdict == Verdict::Ambiguous || self.exact == 0 {
            Confidence::Low
        } else if self.exact == self.occurrences {
            Confidence::High
        } else {
            Confidence::Medium
        }
    }

    pub fn mode(&self) -> FindingMode {
        if self.structural == self.occurrences {
            FindingMode::Structural
        } else if self.structural == 0 {
            FindingMode::Textual
        } else {
            FindingMode::Mixed
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub cleaned: usize,
    pub leaked: usize,
    pub ambiguous: usize,
}

impl CategoryTotals {
    fn record(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Cleaned => self.cleaned += 1,
            Verdict::Leaked => self.leaked += 1,
            Verdict::Ambiguous => self.ambiguous += 1,
        }
    }

    fn merge(&mut self, other: CategoryTotals) {
        self.cleaned += other.cleaned;
        self.leaked += other.leaked;
        self.ambiguous += other.ambiguous;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTotals {
    pub sample_cap: usize,
    pub findings: BTreeMap<FindingKey, FindingTotals>,
    pub categories: BTreeMap<String, CategoryTotals>,
    pub diagnostic_counts: BTreeMap<String, usize>,
    pub diagnostics: Vec<Diagnostic>,
    pub degraded: usize,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub structural_matches: usize,
    pub textual_matches: usize,
}

impl PartialTotals {
    pub fn new(sample_cap: usize) -> Self {
        Self {
            sample_cap,
            findings: BTreeMap::new(),
            categories: BTreeMap::new(),
            diagnostic_counts: BTreeMap::new(),
            diagnostics: Vec::new(),
            degraded: 0,
            files_scanned: 0,
            files_skipped: 0,
            structural_matches: 0,
            textual_matches: 0,
        }
    }

    /// Folds the correlation results of one file.
    pub fn fold_in(&mut self, results: &[CorrelationResult], rules: &[ResourceRule], precise: bool) {
        let cap = self.sample_cap;
        let mut touched: BTreeSet<FindingKey> = BTreeSet::new();

        for result in results {
            let acquisition = &result.acquisition;
            let structural = acquisition.mode == MatchMode::Structural;
            match acquisition.mode {
                MatchMode::Structural => self.structural_matches += 1,
                MatchMode::Textual => self.textual_matches += 1,
            }

            let category = rules
                .iter()
                .find(|r| r.id == acquisition.rule_id)
                .map(|r| r.category.clone())
                .unwrap_or_default();
            self.categories
                .entry(category)
                .or_default()
                .record(result.verdict);

            if result.verdict == Verdict::Cleaned {
                continue;
            }

            let key = FindingKey {
                rule_id: acquisition.rule_id.clone(),
                verdict: result.verdict,
            };
            let totals = self.findings.entry(key.clone()).or_default();
            totals.occurrences += 1;
            if touched.insert(key) {
                totals.files += 1;
            }
            if structural {
                totals.structural += 1;
                if precise {
                    totals.exact += 1;
                }
            }

            let snippet: String = acquisition
                .text
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .chars()
                .take(SNIPPET_MAX_CHARS)
                .collect();
            let location = Location::new(acquisition.path.clone(), acquisition.line, acquisition.column)
                .with_snippet(snippet);
            totals.samples = smallest(std::mem::take(&mut totals.samples), vec![location], cap);
        }
        self.files_scanned += 1;
    }

    pub fn record_skip(&mut self, diagnostic: Diagnostic) {
        self.files_skipped += 1;
        self.record_diagnostic(diagnostic);
    }

    pub fn record_diagnostic(&mut self, diagnostic: Diagnostic) {
        *self
            .diagnostic_counts
            .entry(diagnostic.kind.as_str().to_string())
            .or_default() += 1;
        if diagnostic.kind.degrades() {
            self.degraded += 1;
        }
        self.diagnostics = smallest(std::mem::take(&mut self.diagnostics), vec![diagnostic], self.diagnostic_cap());
    }

    fn diagnostic_cap(&self) -> usize {
        self.sample_cap.max(1) * 10
    }

    pub fn merge(mut self, other: PartialTotals) -> PartialTotals {
        let cap = self.sample_cap.max(other.sample_cap);
        self.sample_cap = cap;
        for (key, totals) in other.findings {
            self.findings.entry(key).or_default().merge(totals, cap);
        }
        for (category, totals) in other.categories {
            self.categories.entry(category).or_default().merge(totals);
        }
        for (kind, count) in other.diagnostic_counts {
            *self.diagnostic_counts.entry(kind).or_default() += count;
        }
        for totals in self.findings.values_mut() {
            totals.samples.truncate(cap);
        }
        let diagnostic_cap = self.diagnostic_cap();
        self.diagnostics = smallest(self.diagnostics, other.diagnostics, diagnostic_cap);
        self.degraded += other.degraded;
        self.files_scanned += other.files_scanned;
        self.files_skipped += other.files_skipped;
        self.structural_matches += other.structural_matches;
        self.textual_matches += other.textual_matches;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded > 0
    }

    /// One finding per (rule id, verdict) for leaked and ambiguous
    /// acquisitions, highest severity first.
    pub fn into_findings(&self, catalog: &RuleCatalog, calculator: &SeverityCalculator) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self
            .findings
            .iter()
            .filter(|(_, totals)| totals.occurrences > 0)
            .filter_map(|(key, totals)| {
                let rule = catalog.rule(&key.rule_id)?;
                Some(calculator.apply(build_finding(rule, key.verdict, totals)))
            })
            .collect();

        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.rule_id.cmp(&b.rule_id))
                .then(a.verdict.cmp(&b.verdict))
        });
        findings
    }
}

fn build_finding(rule: &ResourceRule, verdict: Verdict, totals: &FindingTotals) -> Finding {
    let (title, description) = match verdict {
        Verdict::Ambiguous => (
            format!("Possibly unreleased {}: {}", rule.kind, rule.summary),
            format!(
                "{} acquisition(s) in {} file(s) have a matching cleanup whose scope could not be judged precisely.",
                totals.occurrences, totals.files
            ),
        ),
        _ => (
            rule.summary.clone(),
            format!(
                "{} acquisition(s) in {} file(s) have no matching cleanup in a scope where it is guaranteed to run.",
                totals.occurrences, totals.files
            ),
        ),
    };

    let mut finding = Finding::new(
        rule.id.clone(),
        verdict,
        rule.severity,
        totals.confidence(verdict),
        title,
        description,
    )
    .with_kind(rule.kind.as_str(), &rule.category, rule.language.as_str())
    .with_counts(totals.occurrences, totals.files)
    .with_locations(totals.samples.clone())
    .with_mode(totals.mode());
    if let Some(remediation) = &rule.remediation {
        finding = finding.with_remediation(remediation.clone());
    }
    finding
}

/// The `cap` smallest elements of `a` ∪ `b`, sorted.
fn smallest<T: Ord>(mut a: Vec<T>, b: Vec<T>, cap: usize) -> Vec<T> {
    a.extend(b);
    a.sort();
    a.truncate(cap);
    a
}
