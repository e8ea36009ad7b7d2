//! Optional ripgrep prefilter over the discovered file set.

use crate::core::{CancellationToken, Diagnostic, DiagnosticKind};
use crate::matcher::process::{probe_version, ToolCommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TextSearch {
    rg: Option<PathBuf>,
    timeout: Duration,
}

#[derive(Debug)]
pub struct Prefiltered {
    pub files: Vec<PathBuf>,
    pub diagnostic: Option<Diagnostic>,
}

impl TextSearch {
    pub fn detect(enabled: bool, timeout: Duration) -> Self {
        let rg = if enabled {
            let candidate = PathBuf::from("rg");
            probe_version(&candidate, &["--version"], PROBE_TIMEOUT).map(|version| {
                debug!(%version, "ripgrep available");
                candidate
            })
        } else {
            None
        };
        Self { rg, timeout }
    }

    pub fn in_process(timeout: Duration) -> Self {
        Self { rg: None, timeout }
    }

    pub fn uses_ripgrep(&self) -> bool {
        self.rg.is_some()
    }

    /// Keeps files that contain at least one anchor. Without ripgrep, or when
    /// it fails, every file is kept and each rule's anchors are checked
    /// in-process after the file is loaded.
    pub fn prefilter(
        &self,
        root: &Path,
        files: Vec<PathBuf>,
        anchors: &[String],
        cancel: &CancellationToken,
    ) -> Prefiltered {
        let Some(rg) = &self.rg else {
            return Prefiltered {
                files,
                diagnostic: None,
            };
        };
        if anchors.is_empty() || files.is_empty() {
            return Prefiltered {
                files,
                diagnostic: None,
            };
        }

        let mut command = ToolCommand::new(rg, self.timeout).args([
            "--files-with-matches",
            "--fixed-strings",
            "--no-ignore",
            "--hidden",
            "--no-messages",
        ]);
        for anchor in anchors {
            command = command.arg("-e").arg(anchor);
        }
        let command = command.arg("--").arg(root);

        let failure = match command.run(cancel) {
            Ok(output) if matches!(output.code(), Some(0) | Some(1)) && !output.truncated => {
                let hits: HashSet<PathBuf> = output
                    .stdout_lossy()
                    .lines()
                    .filter(|l| !l.is_empty())
                    .map(|l| relative_key(root, Path::new(l)))
                    .collect();
                let before = files.len();
                let kept: Vec<PathBuf> = files
                    .into_iter()
                    .filter(|f| hits.contains(&relative_key(root, f)))
                    .collect();
                debug!(before, after = kept.len(), "ripgrep prefilter");
                return Prefiltered {
                    files: kept,
                    diagnostic: None,
                };
            }
            Ok(output) => format!("rg exited with {:?}", output.code()),
            Err(err) => err.to_string(),
        };

        info!("ripgrep prefilter failed, scanning all files: {}", failure);
        Prefiltered {
            files,
            diagnostic: Some(Diagnostic::info(
                DiagnosticKind::ToolFailed,
                format!("ripgrep prefilter skipped: {}", failure),
            )),
        }
    }
}

fn relative_key(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
