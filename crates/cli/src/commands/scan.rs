//! `tether scan run`: builds a [`ScanConfig`] from an optional JSON config file
//! plus flags, runs the engine and renders the report.
//!
//! Flags override config-file values. The process exit code comes from the
//! report: 1 for a confirmed critical leak (or a confirmed warning with
//! `--fail-on-warning`), 0 otherwise. Errors exit 2 from `main`.

use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Subcommand, ValueEnum};
use colored::*;
use std::fs;
use std::path::PathBuf;
use tether_scanners::core::{
    CancellationToken, LinterSpec, OutputFormat, ScanConfig, ScopeResolution, StructuralMode,
};
use tether_scanners::runner::RunStatus;
use tether_scanners::{ScanReport, ScanningEngine, Verdict};
use tracing::{debug, warn};

#[derive(Subcommand, Clone)]
pub enum ScanCommand {
    /// Scan a file or directory
    Run(RunArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Project root (or a single file) to scan
    #[arg(short, long)]
    input: PathBuf,

    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only scan paths matching these globs
    #[arg(long)]
    include: Vec<String>,

    /// Additional globs to exclude
    #[arg(long)]
    exclude: Vec<String>,

    /// Only run rules in these categories
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Skip rules in these categories
    #[arg(long, value_delimiter = ',')]
    skip: Vec<String>,

    /// Location samples kept per finding
    #[arg(long)]
    sample_cap: Option<usize>,

    /// Timeout for each external tool invocation, in milliseconds
    #[arg(long)]
    tool_timeout_ms: Option<u64>,

    /// Previous JSON report to compare against
    #[arg(long)]
    baseline: Option<PathBuf>,

    #[arg(long)]
    fail_on_warning: bool,

    /// Never use ast-grep; match with the built-in regex patterns only
    #[arg(long)]
    no_structural: bool,

    /// Skip tree-sitter and resolve scopes heuristically
    #[arg(long)]
    heuristic_scopes: bool,

    /// Files larger than this many bytes are skipped
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Extra rule files, applied after the built-in catalog
    #[arg(long = "rules")]
    rule_files: Vec<PathBuf>,

    /// Supplementary linter as `name=command args...`
    #[arg(long = "linter", value_parser = parse_linter)]
    linters: Vec<LinterSpec>,

    #[arg(long)]
    threads: Option<usize>,

    /// Escalate a finding one severity level above this many occurrences
    #[arg(long, conflicts_with = "no_escalation")]
    escalation_threshold: Option<usize>,

    #[arg(long)]
    no_escalation: bool,

    /// Do not prefilter files with ripgrep
    #[arg(long)]
    no_ripgrep: bool,

    /// Path to the ast-grep binary
    #[arg(long)]
    ast_grep: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum FormatArg {
    Console,
    Json,
    Markdown,
}

impl From<FormatArg> for OutputFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Console => OutputFormat::Console,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Markdown => OutputFormat::Markdown,
        }
    }
}

fn parse_linter(value: &str) -> std::result::Result<LinterSpec, String> {
    let (name, command) = value
        .split_once('=')
        .ok_or_else(|| format!("expected `name=command`, got `{}`", value))?;
    let command: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if name.trim().is_empty() || command.is_empty() {
        return Err(format!("expected `name=command`, got `{}`", value));
    }
    Ok(LinterSpec {
        name: name.trim().to_string(),
        command,
        timeout_ms: None,
    })
}

impl ScanCommand {
    pub fn execute(&self) -> Result<u8> {
        match self {
            ScanCommand::Run(args) => run(args),
        }
    }
}

impl RunArgs {
    fn build_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::from_file(path)?,
            None => ScanConfig::default(),
        };

        config.root = self.input.clone();
        if !self.include.is_empty() {
            config.include = self.include.clone();
        }
        config.exclude.extend(self.exclude.iter().cloned());
        if !self.only.is_empty() {
            config.categories.only = self.only.clone();
        }
        config.categories.skip.extend(self.skip.iter().cloned());
        if let Some(cap) = self.sample_cap {
            config.sample_cap = cap;
        }
        if let Some(timeout) = self.tool_timeout_ms {
            config.tool_timeout_ms = timeout;
        }
        if let Some(format) = self.format {
            config.format = format.into();
        }
        if self.baseline.is_some() {
            config.baseline = self.baseline.clone();
        }
        config.fail_on_warning |= self.fail_on_warning;
        if self.no_structural {
            config.structural = StructuralMode::Disabled;
        }
        if self.heuristic_scopes {
            config.scope_resolution = ScopeResolution::Heuristic;
        }
        if let Some(size) = self.max_file_size {
            config.max_file_size = size;
        }
        config.rule_files.extend(self.rule_files.iter().cloned());
        config.linters.extend(self.linters.iter().cloned());
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if self.no_escalation {
            config.escalation_threshold = None;
        } else if self.escalation_threshold.is_some() {
            config.escalation_threshold = self.escalation_threshold;
        }
        if self.no_ripgrep {
            config.use_ripgrep = false;
        }
        if self.ast_grep.is_some() {
            config.ast_grep_binary = self.ast_grep.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn run(args: &RunArgs) -> Result<u8> {
    let config = args.build_config()?;
    debug!(?config, "scan configuration");

    let token = CancellationToken::new();
    install_interrupt_handler(token.clone());

    let engine = ScanningEngine::new(config.clone()).context("Failed to start scan")?;
    let report = engine
        .run(&token)
        .with_context(|| format!("Failed to scan {}", config.root.display()))?;

    if args.output.is_some() {
        colored::control::set_override(false);
    }
    let rendered = match config.format {
        OutputFormat::Console => render_console(&report),
        OutputFormat::Json => report.to_json()?,
        OutputFormat::Markdown => report.to_markdown(),
    };

    match &args.output {
        Some(path) => fs::write(path, &rendered)
            .with_context(|| format!("Failed to write report: {}", path.display()))?,
        None => println!("{}", rendered),
    }

    Ok(u8::try_from(report.exit_code(config.fail_on_warning)).unwrap_or(1))
}

/// Cancels the run on Ctrl-C. The signal future needs a runtime, so it gets a
/// single-threaded one on its own thread; the scan itself stays synchronous.
fn install_interrupt_handler(token: CancellationToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!("Ctrl-C handling unavailable: {}", err);
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing with partial results");
                token.cancel();
            }
        });
    });
}

fn render_console(report: &ScanReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    out.push_str(&format!(
        "\n{} {}\n",
        "Resource lifecycle scan:".bright_blue().bold(),
        summary.root
    ));
    out.push_str(&format!(
        "   {} files scanned, {} skipped, {} rules, {} matching, {}ms\n",
        summary.files_scanned,
        summary.files_skipped,
        summary.rules_loaded,
        summary.matcher_mode.as_str(),
        summary.elapsed_ms
    ));
    if let Some(version) = &summary.ast_grep_version {
        out.push_str(&format!("   {}\n", version.dimmed()));
    }

    if report.findings.is_empty() {
        out.push_str(&format!("\n{} No unreleased resources found\n", "✅".green()));
    } else {
        out.push_str(&format!(
            "\n⚠️  {} leaked and {} ambiguous acquisitions:\n",
            summary.leaked, summary.ambiguous
        ));
    }

    for (i, finding) in report.findings.iter().enumerate() {
        let verdict = match finding.verdict {
            Verdict::Ambiguous => finding.verdict.to_string().yellow(),
            _ => finding.verdict.to_string().red(),
        };
        out.push_str(&format!(
            "\n{}. {} {} {} [{}] x{} in {} file(s), confidence {}\n",
            i + 1,
            finding.severity.emoji(),
            finding.severity.as_str().to_uppercase().color(finding.severity.color()).bold(),
            finding.rule_id.bold(),
            verdict,
            finding.occurrences,
            finding.files,
            finding.confidence
        ));
        out.push_str(&format!("   {}\n", finding.title));
        for location in &finding.locations {
            match &location.snippet {
                Some(snippet) => out.push_str(&format!(
                    "     - {}  {}\n",
                    location.to_string().cyan(),
                    snippet.dimmed()
                )),
                None => out.push_str(&format!("     - {}\n", location.to_string().cyan())),
            }
        }
        if finding.occurrences > finding.locations.len() {
            out.push_str(&format!(
                "     ... and {} more\n",
                finding.occurrences - finding.locations.len()
            ));
        }
        if let Some(remediation) = &finding.remediation {
            out.push_str(&format!("   {} {}\n", "Fix:".green(), remediation));
        }
    }

    if !report.categories.is_empty() {
        out.push_str(&format!("\n{}\n", "Categories".bold()));
        for (category, totals) in &report.categories {
            out.push_str(&format!(
                "   {:<20} cleaned {:>4}  leaked {:>4}  ambiguous {:>4}\n",
                category, totals.cleaned, totals.leaked, totals.ambiguous
            ));
        }
    }

    for linter in &report.supplementary {
        out.push_str(&format!(
            "\n{} {}: {} issue(s)\n",
            "Linter".bold(),
            linter.linter,
            linter.count
        ));
        for sample in &linter.samples {
            out.push_str(&format!("     - {}\n", sample));
        }
    }

    if !report.diagnostics.counts.is_empty() {
        let counts: Vec<String> = report
            .diagnostics
            .counts
            .iter()
            .map(|(kind, count)| format!("{} {}", kind, count))
            .collect();
        out.push_str(&format!("\n{} {}\n", "Diagnostics:".dimmed(), counts.join(", ")));
    }

    if let Some(delta) = &report.baseline {
        out.push_str(&format!(
            "\n{} {} new, {} resolved, {} changed\n",
            "Baseline:".bold(),
            delta.new.len(),
            delta.resolved.len(),
            delta.changed.len()
        ));
    }

    let status = match summary.status {
        RunStatus::Clean => "clean".green().bold(),
        RunStatus::CleanDegraded => "clean (some checks degraded)".yellow().bold(),
        RunStatus::Issues => "issues".red().bold(),
    };
    out.push_str(&format!("\nStatus: {}", status));
    if summary.cancelled {
        out.push_str(&format!(" {}", "(cancelled, partial results)".yellow()));
    }
    out.push('\n');
    out
}
