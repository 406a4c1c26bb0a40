//! Shared test helpers: file writers, polling waits, and a stub engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::json;

use runwatch::cancel::CancelToken;
use runwatch::engine::{DoctorCheck, EngineError, ExecutionEngine, RunOutcome, RunRequest};

/// Append text to a file, creating it (and its parents) if needed.
pub fn append(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    use std::io::Write;
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("Failed to open file for append");
    f.write_all(text.as_bytes()).expect("Failed to append");
}

/// Append one journal event line.
pub fn append_journal(journal: &Path, step_id: &str, status: &str, ts: &str) {
    let line = json!({
        "kind": "step",
        "stepId": step_id,
        "status": status,
        "tsUtc": ts,
    });
    append(journal, &format!("{line}\n"));
}

/// Poll `cond` until it holds or the timeout expires.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    cond()
}

/// Let the tail workers catch up with everything written so far. The stub
/// engine calls this before returning, because the orchestrator stops the
/// tails as soon as the engine reports completion.
pub fn settle() {
    std::thread::sleep(Duration::from_millis(700));
}

pub fn ok_outcome() -> RunOutcome {
    RunOutcome::from(json!({
        "status": "ok",
        "endUtc": "2024-01-01T00:01:00Z",
    }))
}

type Script = Box<dyn FnOnce(&RunRequest) -> Result<RunOutcome, EngineError> + Send>;

/// Engine double: produces journal and step output files from a scripted
/// closure, or hangs until cancelled.
pub struct StubEngine {
    logs_root: PathBuf,
    script: Mutex<Option<Script>>,
    hang_until_cancelled: bool,
}

impl StubEngine {
    pub fn new(
        logs_root: PathBuf,
        script: impl FnOnce(&RunRequest) -> Result<RunOutcome, EngineError> + Send + 'static,
    ) -> Self {
        Self {
            logs_root,
            script: Mutex::new(Some(Box::new(script))),
            hang_until_cancelled: false,
        }
    }

    /// An engine whose run never finishes on its own.
    pub fn hanging(logs_root: PathBuf) -> Self {
        Self {
            logs_root,
            script: Mutex::new(None),
            hang_until_cancelled: true,
        }
    }
}

impl ExecutionEngine for StubEngine {
    fn doctor(&self) -> Result<Vec<DoctorCheck>, EngineError> {
        Ok(vec![DoctorCheck {
            name: "Stub".to_string(),
            ok: true,
            details: "always healthy".to_string(),
        }])
    }

    fn logs_root(&self) -> Result<PathBuf, EngineError> {
        Ok(self.logs_root.clone())
    }

    fn run_plan(
        &self,
        request: &RunRequest,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, EngineError> {
        if self.hang_until_cancelled {
            loop {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(25));
            }
        }
        let script = self
            .script
            .lock()
            .expect("script lock")
            .take()
            .expect("stub engine can only run once");
        script(request)
    }
}
