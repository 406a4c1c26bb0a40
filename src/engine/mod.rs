//! Interface to the external plan-execution engine.
//!
//! The engine runs plans and writes the journal and step output files; this
//! crate only observes what it produces. The trait mirrors the three calls
//! the monitoring core needs: environment checks, the logs root, and the
//! (possibly long-running, cancellable) plan run itself.

pub mod process;

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::cancel::CancelToken;

/// One environment check result from the engine's `doctor`.
#[derive(Debug, Clone, Deserialize)]
pub struct DoctorCheck {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub details: String,
}

/// Arguments for one plan run, passed through to the engine verbatim.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub plan_path: PathBuf,
    pub mode: String,
    pub run_id: String,
    pub policy_path: Option<PathBuf>,
    pub no_snapshot: bool,
    pub continue_on_error: bool,
}

/// Final result reported by the engine. `status` and `end_utc` come from the
/// engine's own output and are surfaced verbatim, not computed here.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: Option<String>,
    pub end_utc: Option<String>,
    pub raw: serde_json::Value,
}

impl From<serde_json::Value> for RunOutcome {
    fn from(raw: serde_json::Value) -> Self {
        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let end_utc = raw
            .get("endUtc")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Self {
            status,
            end_utc,
            raw,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch engine command '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("engine exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },
    #[error("failed to parse engine output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("engine run was cancelled")]
    Cancelled,
    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// External execution engine, consumed but never implemented by the core.
pub trait ExecutionEngine: Send + Sync {
    /// Run the engine's environment checks.
    fn doctor(&self) -> Result<Vec<DoctorCheck>, EngineError>;

    /// Root directory under which the engine writes `runs/<run_id>/`.
    fn logs_root(&self) -> Result<PathBuf, EngineError>;

    /// Execute a plan. Blocks until the engine finishes or the token is
    /// cancelled; the journal and step output files appear as side effects.
    fn run_plan(&self, request: &RunRequest, cancel: &CancelToken)
        -> Result<RunOutcome, EngineError>;
}
