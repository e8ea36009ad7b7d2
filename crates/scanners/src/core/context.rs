use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SAMPLE_CAP: usize = 5;
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_ESCALATION_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralMode {
    #[default]
    Auto,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeResolution {
    #[default]
    Auto,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
    Markdown,
}

/// `only` wins over `skip` when both name a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySelection {
    pub only: Vec<String>,
    pub skip: Vec<String>,
}

impl CategorySelection {
    pub fn allows(&self, category: &str) -> bool {
        if !self.only.is_empty() {
            return self.only.iter().any(|c| c == category);
        }
        !self.skip.iter().any(|c| c == category)
    }
}

/// A third-party linter run once per scan from the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinterSpec {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub categories: CategorySelection,
    pub sample_cap: usize,
    pub tool_timeout_ms: u64,
    pub format: OutputFormat,
    pub baseline: Option<PathBuf>,
    pub fail_on_warning: bool,
    pub structural: StructuralMode,
    pub scope_resolution: ScopeResolution,
    pub max_file_size: u64,
    pub rule_files: Vec<PathBuf>,
    pub linters: Vec<LinterSpec>,
    pub threads: Option<usize>,
    pub escalation_threshold: Option<usize>,
    pub use_ripgrep: bool,
    pub ast_grep_binary: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let exclude = [
            "**/node_modules/**",
            "**/.git/**",
            "**/target/**",
            "**/dist/**",
            "**/build/**",
            "**/vendor/**",
            "**/*.min.js",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            root: PathBuf::from("."),
            include: Vec::new(),
            exclude,
            categories: CategorySelection::default(),
            sample_cap: DEFAULT_SAMPLE_CAP,
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            format: OutputFormat::Console,
            baseline: None,
            fail_on_warning: false,
            structural: StructuralMode::Auto,
            scope_resolution: ScopeResolution::Auto,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            rule_files: Vec::new(),
            linters: Vec::new(),
            threads: None,
            escalation_threshold: Some(DEFAULT_ESCALATION_THRESHOLD),
            use_ripgrep: true,
            ast_grep_binary: None,
        }
    }
}

impl ScanConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Reads a JSON config file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScanError::InvalidInput(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&text).map_err(|e| {
            ScanError::InvalidInput(format!("invalid config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.root.exists() {
            return Err(ScanError::InvalidInput(format!(
                "input path does not exist: {}",
                self.root.display()
            )));
        }
        if self.tool_timeout_ms == 0 {
            return Err(ScanError::InvalidInput(
                "tool timeout must be greater than zero".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(ScanError::InvalidInput(
                "thread count must be greater than zero".to_string(),
            ));
        }
        if let Some(linter) = self.linters.iter().find(|l| l.command.is_empty()) {
            return Err(ScanError::InvalidInput(format!(
                "linter `{}` has an empty command",
                linter.name
            )));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Run-wide cancellation flag shared by the file pipeline and subprocess polls.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }
}
