use crate::aggregate::PartialTotals;
use crate::catalog::{ResourceRule, RuleCatalog};
use crate::core::{
    CancellationToken, Diagnostic, DiagnosticKind, DiagnosticSink, ScanConfig, SeverityCalculator,
    StructuralMode,
};
use crate::correlation::CorrelationEngine;
use crate::error::{Result, ScanError};
use crate::matcher::{AstGrepMatcher, Match, MatcherChain, SourceFile, TextSearch};
use crate::runner::baseline::Baseline;
use crate::runner::files::{DiscoveredFile, FileDiscovery};
use crate::runner::linters;
use crate::runner::report::{
    verdict_totals, DiagnosticTotals, MatcherMode, RunSummary, ScanReport, SCHEMA_VERSION,
};
use crate::scope::ScopeResolverChain;
use crate::VERSION;
use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

pub struct ScanningEngine {
    config: ScanConfig,
    catalog: RuleCatalog,
    matchers: MatcherChain,
    resolvers: ScopeResolverChain,
    correlation: CorrelationEngine,
    calculator: SeverityCalculator,
    search: TextSearch,
    /// Catalog and probe diagnostics, replayed into every run.
    startup: Vec<Diagnostic>,
    ast_grep_version: Option<String>,
}

impl ScanningEngine {
    /// Validates the config, loads the catalog (built-in plus rule files)
    /// and probes the external tools once for the whole run.
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        let catalog = RuleCatalog::load_with(&config.rule_files)?;
        Self::with_catalog(config, catalog)
    }

    pub fn with_catalog(config: ScanConfig, catalog: RuleCatalog) -> Result<Self> {
        config.validate()?;
        let mut startup = catalog.diagnostics().to_vec();
        let catalog = catalog.select(&config.categories);

        let structural = match config.structural {
            StructuralMode::Disabled => None,
            StructuralMode::Auto => {
                match AstGrepMatcher::probe(config.ast_grep_binary.as_deref(), config.tool_timeout()) {
                    Ok(matcher) => Some(matcher),
                    Err(err) => {
                        info!("structural matching unavailable, using textual mode: {}", err);
                        startup.push(Diagnostic::from_error(&err));
                        None
                    }
                }
            }
        };
        let ast_grep_version = structural.as_ref().map(|m| m.version().to_string());

        Ok(Self {
            search: TextSearch::detect(config.use_ripgrep, config.tool_timeout()),
            resolvers: ScopeResolverChain::new(config.scope_resolution),
            calculator: SeverityCalculator::new(config.escalation_threshold),
            matchers: MatcherChain::new(structural),
            correlation: CorrelationEngine::new(),
            catalog,
            config,
            startup,
            ast_grep_version,
        })
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn structural_available(&self) -> bool {
        self.matchers.structural_available()
    }

    /// Scans the configured root. Only invalid input is an error; a cancelled
    /// run returns the partial report with `cancelled` set.
    pub fn run(&self, cancel: &CancellationToken) -> Result<ScanReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let root = &self.config.root;
        let sink = DiagnosticSink::new();
        sink.extend(self.startup.iter().cloned());

        let baseline = self
            .config
            .baseline
            .as_deref()
            .map(Baseline::load)
            .transpose()?;

        let discovered = FileDiscovery::new(&self.config.include, &self.config.exclude)?.discover(root)?;
        let files = self.prefilter(discovered, &sink, cancel);
        info!(files = files.len(), root = %root.display(), "scanning");

        let cap = self.config.sample_cap;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.thread_count())
            .build()
            .map_err(|e| ScanError::InvalidInput(format!("cannot build thread pool: {}", e)))?;
        let mut totals = pool.install(|| {
            files
                .par_iter()
                .map(|file| self.scan_file(file, cancel))
                .reduce(|| PartialTotals::new(cap), PartialTotals::merge)
        });

        let (supplementary, linter_diagnostics) = if cancel.is_cancelled() {
            (Vec::new(), Vec::new())
        } else {
            linters::run_all(&self.config.linters, root, self.config.tool_timeout(), cap, cancel)
        };
        sink.extend(linter_diagnostics);

        let cancelled = cancel.is_cancelled();
        if cancelled {
            sink.push(Diagnostic::info(
                DiagnosticKind::Cancelled,
                "scan cancelled; results are partial",
            ));
        }
        for diagnostic in sink.drain() {
            totals.record_diagnostic(diagnostic);
        }

        let findings = totals.into_findings(&self.catalog, &self.calculator);
        let baseline = baseline.map(|b| b.compare(&findings));
        let severity_counts = ScanReport::count_by_severity(&findings);
        let (leaked, ambiguous) = verdict_totals(&findings);
        let degraded = totals.is_degraded();
        let status = ScanReport::status_for(&findings, &supplementary, degraded);

        let summary = RunSummary {
            root: root.display().to_string(),
            started_at,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            files_scanned: totals.files_scanned,
            files_skipped: totals.files_skipped,
            rules_loaded: self.catalog.len(),
            matcher_mode: self.matcher_mode(&totals),
            ast_grep_version: self.ast_grep_version.clone(),
            severity_counts,
            leaked,
            ambiguous,
            status,
            degraded,
            cancelled,
        };

        Ok(ScanReport {
            schema_version: SCHEMA_VERSION,
            tool_version: VERSION.to_string(),
            summary,
            findings,
            categories: totals.categories.clone(),
            diagnostics: DiagnosticTotals {
                counts: totals.diagnostic_counts.clone(),
                samples: totals.diagnostics.clone(),
            },
            supplementary,
            baseline,
        })
    }

    fn prefilter(
        &self,
        files: Vec<DiscoveredFile>,
        sink: &DiagnosticSink,
        cancel: &CancellationToken,
    ) -> Vec<DiscoveredFile> {
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let anchors = self.catalog.anchors();
        let kept = self.search.prefilter(&self.config.root, paths, &anchors, cancel);
        if let Some(diagnostic) = kept.diagnostic {
            sink.push(diagnostic);
        }
        if kept.files.len() == files.len() {
            return files;
        }
        let mut by_path: HashMap<PathBuf, DiscoveredFile> =
            files.into_iter().map(|f| (f.path.clone(), f)).collect();
        kept.files
            .into_iter()
            .filter_map(|path| by_path.remove(&path))
            .collect()
    }

    fn matcher_mode(&self, totals: &PartialTotals) -> MatcherMode {
        if !self.matchers.structural_available() {
            MatcherMode::Textual
        } else if totals.textual_matches == 0 {
            MatcherMode::Structural
        } else if totals.structural_matches == 0 {
            MatcherMode::Textual
        } else {
            MatcherMode::Mixed
        }
    }

    /// Load, match, resolve, correlate and fold one file. Every failure is
    /// isolated to this file and recorded as a diagnostic.
    pub fn scan_file(&self, file: &DiscoveredFile, cancel: &CancellationToken) -> PartialTotals {
        let mut totals = PartialTotals::new(self.config.sample_cap);
        if cancel.is_cancelled() {
            return totals;
        }
        let rules = self.catalog.rules_for(file.language);

        let source = match SourceFile::load(
            &file.path,
            file.display.clone(),
            file.language,
            self.config.max_file_size,
        ) {
            Ok(source) => source,
            Err(err) => {
                info!(file = %file.display, "skipping file: {}", err);
                totals.record_skip(Diagnostic::from_error(&err).with_path(file.display.clone()));
                return totals;
            }
        };

        let matched = match self.matchers.match_file(&source, rules, cancel) {
            Ok(matched) => matched,
            Err(ScanError::Cancelled) => return totals,
            Err(err) => {
                totals.record_diagnostic(Diagnostic::from_error(&err).with_path(file.display.clone()));
                return totals;
            }
        };
        for diagnostic in matched.diagnostics {
            totals.record_diagnostic(diagnostic);
        }

        let lifecycle = self.catalog.lifecycle();
        let (tree, fallback) = self.resolvers.resolve(&source, lifecycle);
        if let Some(diagnostic) = fallback {
            totals.record_diagnostic(diagnostic);
        }

        let by_id: HashMap<&str, &ResourceRule> = rules.iter().map(|r| (r.id.as_str(), r)).collect();
        let matches: Vec<Match> = matched
            .matches
            .into_iter()
            .filter_map(|raw| {
                let rule = *by_id.get(raw.rule_id.as_str())?;
                Some(Match::resolve(raw, rule, &source, &tree))
            })
            .collect();

        let results = self.correlation.correlate(matches, rules, &tree, lifecycle);
        debug!(
            file = %file.display,
            results = results.len(),
            precise = tree.is_precise(),
            "correlated file"
        );
        totals.fold_in(&results, rules, tree.is_precise());
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Verdict, DEFAULT_SAMPLE_CAP};
    use crate::runner::report::RunStatus;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &std::path::Path) -> ScanConfig {
        let mut config = ScanConfig::new(root);
        config.structural = StructuralMode::Disabled;
        config.use_ripgrep = false;
        config.threads = Some(2);
        config
    }

    #[test]
    fn test_run_reports_leaks_and_skips() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("poll.js"),
            "function poll() {\n  const t = setInterval(refresh, 1000);\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("blob.js"), b"setInterval\0\0\0").unwrap();

        let engine = ScanningEngine::new(config(dir.path())).unwrap();
        let report = engine.run(&CancellationToken::new()).unwrap();

        assert_eq!(report.summary.files_scanned, 1);
        assert_eq!(report.summary.files_skipped, 1);
        assert_eq!(report.summary.matcher_mode, MatcherMode::Textual);
        let leaked: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.verdict == Verdict::Leaked)
            .collect();
        assert_eq!(leaked.len(), 1);
        assert_eq!(leaked[0].rule_id, "js.timer.interval");
        assert!(leaked[0].locations.len() <= DEFAULT_SAMPLE_CAP);
        assert_eq!(report.exit_code(false), 1);
    }

    #[test]
    fn test_cancelled_run_is_partial() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.js"), "setInterval(f, 1);\n").unwrap();
        let engine = ScanningEngine::new(config(dir.path())).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let report = engine.run(&token).unwrap();
        assert!(report.summary.cancelled);
        assert_eq!(report.summary.files_scanned, 0);
        assert_eq!(report.diagnostics.counts.get("cancelled"), Some(&1));
    }

    #[test]
    fn test_repeated_runs_keep_startup_diagnostics() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("clean.js"), "const x = 1;\n").unwrap();
        let mut config = config(dir.path());
        config.structural = StructuralMode::Auto;
        config.ast_grep_binary = Some(dir.path().join("no-such-ast-grep"));

        let engine = ScanningEngine::new(config).unwrap();
        assert!(!engine.structural_available());
        let first = engine.run(&CancellationToken::new()).unwrap();
        let second = engine.run(&CancellationToken::new()).unwrap();

        for report in [&first, &second] {
            assert!(report.summary.degraded);
            assert_eq!(report.summary.status, RunStatus::CleanDegraded);
            assert_eq!(report.diagnostics.counts.get("tool_unavailable"), Some(&1));
        }
        assert_eq!(first.diagnostics.counts, second.diagnostics.counts);
        assert_eq!(first.summary.files_scanned, second.summary.files_scanned);
    }

    #[test]
    fn test_invalid_root_is_fatal() {
        let result = ScanningEngine::new(config(std::path::Path::new("/definitely/not/here")));
        assert!(matches!(result, Err(ScanError::InvalidInput(_))));
    }
}
