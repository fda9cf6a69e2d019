//! Supervised process execution.
//!
//! Every external invocation in the workspace goes through [`run`]: spawn
//! with piped output, poll for completion on a short tick, kill on timeout
//! or cancellation, and always reap the child. Callers get the captured
//! output even when the run was cut short, which lets probes keep partial
//! results.

use clipforge_core::{CancelFlag, ClipForgeError, Result};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Completion poll interval. Cancellation latency is bounded by this.
const POLL_TICK: Duration = Duration::from_millis(100);

/// How one supervised invocation should run.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Short human label used in errors and logs ("audio probe", ...).
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub cancel: CancelFlag,
}

impl RunSpec {
    pub fn new(
        label: impl Into<String>,
        program: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Duration,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args,
            timeout,
            cancel,
        }
    }
}

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { success: bool },
    TimedOut,
    Cancelled,
}

/// Captured output of a supervised run. `stdout`/`stderr` hold whatever the
/// child produced before it exited or was killed.
#[derive(Debug)]
pub struct RunOutput {
    pub outcome: RunOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    /// Collapse into a hard result: timeouts, cancellation, and non-zero
    /// exits all become errors carrying the stderr tail.
    pub fn into_result(self, label: &str, timeout: Duration) -> Result<RunOutput> {
        match self.outcome {
            RunOutcome::Completed { success: true } => Ok(self),
            RunOutcome::Completed { success: false } => Err(ClipForgeError::UpstreamUnavailable(
                format!("{label} failed: {}", stderr_tail(&self.stderr)),
            )),
            RunOutcome::TimedOut => Err(ClipForgeError::Timeout {
                what: label.to_string(),
                seconds: timeout.as_secs(),
            }),
            RunOutcome::Cancelled => Err(ClipForgeError::Cancelled),
        }
    }
}

/// Run a child process to completion under supervision.
pub fn run(spec: &RunSpec) -> Result<RunOutput> {
    debug!(
        label = %spec.label,
        program = %spec.program.display(),
        args = ?spec.args,
        "Spawning supervised process"
    );

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ClipForgeError::UpstreamUnavailable(format!(
                "{}: failed to start {}: {e}",
                spec.label,
                spec.program.display()
            ))
        })?;

    // Readers drain the pipes on their own threads so the child never
    // blocks on a full pipe; they return whatever was collected once the
    // pipe closes (normal exit or kill).
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout_pipe));
    let stderr_reader = thread::spawn(move || drain(stderr_pipe));

    let started = Instant::now();
    let outcome = loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                break RunOutcome::Completed {
                    success: status.success(),
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(label = %spec.label, error = %e, "try_wait failed; killing child");
                kill_and_reap(&mut child);
                return Err(ClipForgeError::Io(e));
            }
        }

        if spec.cancel.is_cancelled() {
            kill_and_reap(&mut child);
            break RunOutcome::Cancelled;
        }
        if started.elapsed() >= spec.timeout {
            warn!(label = %spec.label, timeout_s = spec.timeout.as_secs(), "Process timed out");
            kill_and_reap(&mut child);
            break RunOutcome::TimedOut;
        }
        thread::sleep(POLL_TICK);
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    debug!(
        label = %spec.label,
        outcome = ?outcome,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Supervised process finished"
    );

    Ok(RunOutput {
        outcome,
        stdout,
        stderr,
    })
}

/// Run and require a clean exit, returning the output.
pub fn run_checked(spec: &RunSpec) -> Result<RunOutput> {
    run(spec)?.into_result(&spec.label, spec.timeout)
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let mut bytes = Vec::new();
        if pipe.read_to_end(&mut bytes).is_ok() {
            buf = String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    buf
}

fn kill_and_reap(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Last few lines of stderr for error messages.
pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail_start = lines.len().saturating_sub(3);
    let tail = lines[tail_start..].join(" | ");
    if tail.is_empty() {
        "(no stderr)".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str], timeout_ms: u64) -> RunSpec {
        RunSpec::new(
            "test",
            program,
            args.iter().map(|s| s.to_string()).collect(),
            Duration::from_millis(timeout_ms),
            CancelFlag::new(),
        )
    }

    #[test]
    fn test_successful_run_captures_stdout() {
        let out = run(&spec("sh", &["-c", "echo hello"], 5000)).unwrap();
        assert_eq!(out.outcome, RunOutcome::Completed { success: true });
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_nonzero_exit_reported() {
        let out = run(&spec("sh", &["-c", "echo oops >&2; exit 3"], 5000)).unwrap();
        assert_eq!(out.outcome, RunOutcome::Completed { success: false });
        assert!(out.stderr.contains("oops"));
        assert!(out.into_result("test", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let out = run(&spec("sh", &["-c", "sleep 30"], 300)).unwrap();
        assert_eq!(out.outcome, RunOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancel_kills_child() {
        let mut s = spec("sh", &["-c", "sleep 30"], 60_000);
        let cancel = s.cancel.clone();
        s.cancel = cancel.clone();
        let handle = thread::spawn(move || run(&s));
        thread::sleep(Duration::from_millis(200));
        cancel.cancel();
        let out = handle.join().unwrap().unwrap();
        assert_eq!(out.outcome, RunOutcome::Cancelled);
    }

    #[test]
    fn test_partial_output_kept_on_timeout() {
        let out = run(&spec("sh", &["-c", "echo partial; sleep 30"], 500)).unwrap();
        assert_eq!(out.outcome, RunOutcome::TimedOut);
        assert!(out.stdout.contains("partial"));
    }

    #[test]
    fn test_missing_binary_is_upstream_error() {
        let err = run(&spec("definitely-not-a-real-binary", &[], 1000)).unwrap_err();
        assert!(matches!(err, ClipForgeError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = (0..10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&long);
        assert!(tail.contains("line 9"));
        assert!(!tail.contains("line 2"));
    }
}
