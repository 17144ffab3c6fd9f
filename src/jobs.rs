//! Background export jobs
//!
//! Exports shell out to slow external tools, so each one runs on its own
//! thread and reports back over a channel the main loop polls. A shared
//! mutex is held for the whole invocation, so within one process exports
//! run one at a time; a second request waits for the first to finish.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Completion report for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Finished { command: String },
    Failed { command: String, message: String },
}

impl JobResult {
    /// Status-bar text for this result
    pub fn message(&self) -> String {
        match self {
            JobResult::Finished { command } => format!("Done: {}", command),
            JobResult::Failed { message, .. } => format!("Export failed: {}", message),
        }
    }
}

pub struct ExportRunner {
    gate: Arc<Mutex<()>>,
    result_tx: Sender<JobResult>,
    result_rx: Receiver<JobResult>,
}

impl Default for ExportRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportRunner {
    pub fn new() -> Self {
        let (result_tx, result_rx) = mpsc::channel();
        Self {
            gate: Arc::new(Mutex::new(())),
            result_tx,
            result_rx,
        }
    }

    /// Run `command` through `sh -c` on a background thread
    pub fn spawn(&self, command: String, cwd: Option<PathBuf>) {
        let gate = Arc::clone(&self.gate);
        let tx = self.result_tx.clone();
        thread::spawn(move || {
            let result = {
                let _running = gate.lock();
                tracing::info!(command = %command, "export started");
                run_shell(&command, cwd)
            };
            tracing::info!(?result, "export finished");
            let _ = tx.send(result);
        });
    }

    /// Whether an export currently holds the gate
    pub fn is_busy(&self) -> bool {
        self.gate.is_locked()
    }

    /// Next finished job, if any (non-blocking)
    pub fn try_recv(&self) -> Option<JobResult> {
        self.result_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next finished job
    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_rx.recv_timeout(timeout).ok()
    }
}

fn run_shell(command: &str, cwd: Option<PathBuf>) -> JobResult {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    match cmd.output() {
        Ok(output) if output.status.success() => JobResult::Finished {
            command: command.to_string(),
        },
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exit status {}", output.status.code().unwrap_or(-1))
            } else {
                stderr
            };
            JobResult::Failed {
                command: command.to_string(),
                message,
            }
        }
        Err(e) => JobResult::Failed {
            command: command.to_string(),
            message: e.to_string(),
        },
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn test_success_and_failure_are_reported() {
        let runner = ExportRunner::new();
        runner.spawn("true".to_string(), None);
        assert_eq!(
            runner.recv_timeout(WAIT),
            Some(JobResult::Finished {
                command: "true".to_string()
            })
        );

        runner.spawn("echo broken >&2; exit 3".to_string(), None);
        match runner.recv_timeout(WAIT) {
            Some(JobResult::Failed { message, .. }) => assert_eq!(message, "broken"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exports_do_not_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExportRunner::new();
        let script = |tag: &str| format!("echo {tag}1 >> out; sleep 0.2; echo {tag}2 >> out");
        runner.spawn(script("a"), Some(dir.path().to_path_buf()));
        runner.spawn(script("b"), Some(dir.path().to_path_buf()));

        assert!(runner.recv_timeout(WAIT).is_some());
        assert!(runner.recv_timeout(WAIT).is_some());

        let out = std::fs::read_to_string(dir.path().join("out")).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(
            lines == ["a1", "a2", "b1", "b2"] || lines == ["b1", "b2", "a1", "a2"],
            "interleaved: {:?}",
            lines
        );
    }

    #[test]
    fn test_try_recv_is_non_blocking() {
        let runner = ExportRunner::new();
        assert_eq!(runner.try_recv(), None);
        assert!(!runner.is_busy());
    }

    #[test]
    fn test_busy_while_an_export_runs() {
        let runner = ExportRunner::new();
        runner.spawn("sleep 0.3".to_string(), None);
        let deadline = std::time::Instant::now() + WAIT;
        while !runner.is_busy() {
            assert!(std::time::Instant::now() < deadline, "export never started");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(runner.recv_timeout(WAIT).is_some());
        assert!(!runner.is_busy());
    }
}
