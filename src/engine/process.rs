//! Process-backed engine: shells out to the engine's CLI.
//!
//! The engine command is expected to expose three subcommands:
//! `doctor` (JSON array of checks on stdout), `logs-root` (plain path on
//! stdout), and `run-plan` (JSON result object on stdout). The command is
//! configured explicitly; discovering an engine installation is out of
//! scope.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::{DoctorCheck, EngineError, ExecutionEngine, RunOutcome, RunRequest};
use crate::cancel::CancelToken;

/// Environment variable naming the engine command.
pub const ENGINE_ENV_VAR: &str = "RUNWATCH_ENGINE";

/// How often a running engine process is checked for exit or cancellation.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ProcessEngine {
    command: PathBuf,
}

impl ProcessEngine {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Resolve the engine command from `RUNWATCH_ENGINE`.
    pub fn from_env() -> Option<Self> {
        std::env::var(ENGINE_ENV_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Self::new)
    }

    fn spawn(&self, args: &[&str]) -> Result<Child, EngineError> {
        debug!("invoking engine: {} {}", self.command.display(), args.join(" "));
        Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                command: self.command.display().to_string(),
                source,
            })
    }

    /// Run a subcommand to completion and return its stdout.
    fn invoke(&self, args: &[&str], cancel: &CancelToken) -> Result<String, EngineError> {
        let mut child = self.spawn(args)?;

        // Drain both pipes concurrently with waiting: the child can block on
        // write once a pipe buffer fills up.
        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();

        if let Some(stdout) = child.stdout.take() {
            thread::spawn(move || {
                let _ = stdout_tx.send(read_stream(stdout));
            });
        } else {
            let _ = stdout_tx.send(String::new());
        }
        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || {
                let _ = stderr_tx.send(read_stream(stderr));
            });
        } else {
            let _ = stderr_tx.send(String::new());
        }

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Cancelled);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(WAIT_POLL_INTERVAL),
            }
        };

        let stdout = stdout_rx.recv().unwrap_or_default();
        let stderr = stderr_rx.recv().unwrap_or_default();

        if !status.success() {
            return Err(EngineError::Failed {
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

fn read_stream(mut stream: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

impl ExecutionEngine for ProcessEngine {
    fn doctor(&self) -> Result<Vec<DoctorCheck>, EngineError> {
        let stdout = self.invoke(&["doctor"], &CancelToken::new())?;
        let checks = serde_json::from_str(stdout.trim())?;
        Ok(checks)
    }

    fn logs_root(&self) -> Result<PathBuf, EngineError> {
        let stdout = self.invoke(&["logs-root"], &CancelToken::new())?;
        Ok(PathBuf::from(stdout.trim()))
    }

    fn run_plan(
        &self,
        request: &RunRequest,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, EngineError> {
        let plan = request.plan_path.display().to_string();
        let mut args = vec![
            "run-plan",
            "--plan",
            plan.as_str(),
            "--mode",
            request.mode.as_str(),
            "--run-id",
            request.run_id.as_str(),
        ];
        let policy;
        if let Some(policy_path) = &request.policy_path {
            policy = policy_path.display().to_string();
            args.push("--policy-path");
            args.push(policy.as_str());
        }
        if request.no_snapshot {
            args.push("--no-snapshot");
        }
        if request.continue_on_error {
            args.push("--continue-on-error");
        }

        let stdout = self.invoke(&args, cancel)?;
        let raw: serde_json::Value = serde_json::from_str(stdout.trim())?;
        Ok(RunOutcome::from(raw))
    }
}
