//! Bounded subprocess execution.
//!
//! Every external tool (ast-grep, rg, linters) runs through [`ToolCommand`].
//! Output is drained on reader threads and the child is polled against a
//! deadline and the run's cancellation token. A [`ChildGuard`] kills and
//! reaps the process on every exit path. Readers are only waited on for a
//! short grace period after the child exits, since a backgrounded
//! descendant can keep the pipes open indefinitely.

use crate::core::CancellationToken;
use crate::error::{Result, ScanError};
use parking_lot::Mutex;
use std::ffi::{OsStr, OsString};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const READER_GRACE: Duration = Duration::from_millis(500);
const DEFAULT_OUTPUT_CAP: usize = 32 * 1024 * 1024;

/// Owns a running child; dropping it kills and reaps the process.
pub struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    /// Hands back ownership once the child has been reaped normally.
    pub fn release(mut self) -> Option<Child> {
        self.child.take()
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
    pub truncated: bool,
}

impl ToolOutput {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    output_cap: usize,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
            output_cap: DEFAULT_OUTPUT_CAP,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn run(&self, cancel: &CancellationToken) -> Result<ToolOutput> {
        let tool = self.tool_name();
        cancel.check()?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ScanError::ToolUnavailable {
                    tool: tool.clone(),
                    reason: e.to_string(),
                }
            }
            _ => ScanError::tool_failed(&tool, format!("spawn: {}", e)),
        })?;

        let stdout = child.stdout.take().map(|r| OutputReader::spawn(r, self.output_cap));
        let stderr = child.stderr.take().map(|r| OutputReader::spawn(r, self.output_cap));
        let mut guard = ChildGuard::new(child);
        let deadline = start.checked_add(self.timeout);

        let status = loop {
            let child = guard
                .child_mut()
                .ok_or_else(|| ScanError::tool_failed(&tool, "child handle missing"))?;
            if let Some(status) = child
                .try_wait()
                .map_err(|e| ScanError::tool_failed(&tool, format!("try_wait: {}", e)))?
            {
                break status;
            }
            if cancel.is_cancelled() {
                trace!(tool = %tool, "cancelling subprocess");
                return Err(ScanError::Cancelled);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(ScanError::ToolTimeout {
                    tool,
                    elapsed: start.elapsed(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };
        drop(guard.release());

        let drain_deadline = Instant::now() + READER_GRACE;
        let (stdout, out_truncated) = collect(stdout, drain_deadline);
        let (stderr, err_truncated) = collect(stderr, drain_deadline);
        if out_truncated || err_truncated {
            debug!(tool = %tool, "output incomplete: capture limit or pipe held open");
        }

        Ok(ToolOutput {
            status,
            stdout,
            stderr,
            elapsed: start.elapsed(),
            truncated: out_truncated || err_truncated,
        })
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
    finished: bool,
}

/// A pipe drained on its own thread into shared, capped storage.
struct OutputReader {
    captured: Arc<Mutex<Captured>>,
}

impl OutputReader {
    fn spawn<R: Read + Send + 'static>(reader: R, cap: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let shared = Arc::clone(&captured);
        std::thread::spawn(move || {
            drain_capped(reader, cap, &shared);
            shared.lock().finished = true;
        });
        Self { captured }
    }

    /// What has been read by `deadline`. Output still open at the deadline
    /// is reported as truncated and the reader thread is left detached.
    fn collect(self, deadline: Instant) -> (Vec<u8>, bool) {
        loop {
            {
                let mut captured = self.captured.lock();
                if captured.finished || Instant::now() >= deadline {
                    let truncated = captured.truncated || !captured.finished;
                    return (std::mem::take(&mut captured.bytes), truncated);
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn collect(reader: Option<OutputReader>, deadline: Instant) -> (Vec<u8>, bool) {
    reader
        .map(|r| r.collect(deadline))
        .unwrap_or_default()
}

fn drain_capped<R: Read>(mut reader: R, cap: usize, captured: &Mutex<Captured>) {
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        let mut captured = captured.lock();
        let keep = n.min(cap.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        if keep < n {
            captured.truncated = true;
        }
    }
}

/// Runs `program args` and returns trimmed stdout when it exits successfully.
pub fn probe_version(program: &Path, args: &[&str], timeout: Duration) -> Option<String> {
    let output = ToolCommand::new(program, timeout)
        .args(args)
        .run(&CancellationToken::new())
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = output.stdout_lossy();
    let text = if text.trim().is_empty() {
        output.stderr_lossy()
    } else {
        text
    };
    Some(text.trim().to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_unavailable() {
        let err = ToolCommand::new("definitely-not-a-real-tool-xyz", Duration::from_secs(1))
            .run(&CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::ToolUnavailable { .. }));
    }

    #[test]
    fn test_captures_stdout_and_status() {
        let output = ToolCommand::new("sh", Duration::from_secs(5))
            .args(["-c", "echo hello; echo oops >&2; exit 3"])
            .run(&CancellationToken::new())
            .unwrap();
        assert_eq!(output.code(), Some(3));
        assert_eq!(output.stdout_lossy().trim(), "hello");
        assert_eq!(output.stderr_lossy().trim(), "oops");
    }

    #[test]
    fn test_timeout_kills_child() {
        let start = Instant::now();
        let err = ToolCommand::new("sleep", Duration::from_millis(100))
            .arg("5")
            .run(&CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::ToolTimeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_cancelled_token_stops_before_spawn() {
        let token = CancellationToken::new();
        token.cancel();
        let err = ToolCommand::new("sleep", Duration::from_secs(5))
            .arg("5")
            .run(&token)
            .unwrap_err();
        assert!(matches!(err, ScanError::Cancelled));
    }

    #[test]
    fn test_drain_capped_truncates() {
        let data = vec![7u8; 100];
        let captured = Mutex::new(Captured::default());
        drain_capped(&data[..], 10, &captured);
        let captured = captured.into_inner();
        assert_eq!(captured.bytes.len(), 10);
        assert!(captured.truncated);
    }

    #[test]
    fn test_background_descendant_does_not_hold_run_open() {
        let start = Instant::now();
        let output = ToolCommand::new("sh", Duration::from_millis(300))
            .args(["-c", "sleep 4 & echo a.js:1:1: x"])
            .run(&CancellationToken::new())
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(output.code(), Some(0));
        assert!(output.stdout_lossy().contains("a.js:1:1: x"));
        assert!(output.truncated);
    }
}
