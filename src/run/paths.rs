//! On-disk layout of one run, as written by the execution engine.
//!
//! Everything lives under the engine's logs root:
//! `runs/<run_id>/journal.jsonl` plus `runs/<run_id>/steps/<step_id>/` with
//! `stdout.txt`, `stderr.txt` and any other artifacts the step produced.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RunPaths {
    logs_root: PathBuf,
    run_id: String,
}

impl RunPaths {
    pub fn new(logs_root: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            logs_root: logs_root.into(),
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_folder(&self) -> PathBuf {
        self.logs_root.join("runs").join(&self.run_id)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.run_folder().join("journal.jsonl")
    }

    pub fn step_root(&self, step_id: &str) -> PathBuf {
        self.run_folder().join("steps").join(step_id)
    }

    pub fn step_stdout(&self, step_id: &str) -> PathBuf {
        self.step_root(step_id).join("stdout.txt")
    }

    pub fn step_stderr(&self, step_id: &str) -> PathBuf {
        self.step_root(step_id).join("stderr.txt")
    }
}
