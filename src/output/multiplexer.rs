//! Live output tailing for the selected step.
//!
//! One multiplexer manages at most one active tail pair (stdout + stderr) at
//! a time. Attaching to a step first stops the previous pair, takes a
//! bounded snapshot of both files plus the artifact listing, and only then —
//! and only for a running step — starts live tails from each file's length
//! at snapshot time, so snapshot content is never re-delivered.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::debug;

use super::{list_artifacts, snapshot_text, ArtifactFile};
use crate::cancel::CancelToken;
use crate::tail::{spawn_tail, DEFAULT_POLL_INTERVAL};

/// Which of the step's two output streams a chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Point-in-time view of a step's output directory.
#[derive(Debug, Default)]
pub struct StepOutputView {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub artifacts: Vec<ArtifactFile>,
}

pub struct OutputMultiplexer {
    poll_interval: Duration,
    current: Option<CancelToken>,
}

impl Default for OutputMultiplexer {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl OutputMultiplexer {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            current: None,
        }
    }

    /// Stop the active tail pair, if any. Best-effort: the workers observe
    /// cancellation at their next poll boundary; they are not joined.
    pub fn stop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }

    /// Snapshot a step's output without tailing.
    pub fn snapshot(step_root: &Path) -> StepOutputView {
        StepOutputView {
            stdout: snapshot_text(&step_root.join("stdout.txt")),
            stderr: snapshot_text(&step_root.join("stderr.txt")),
            artifacts: list_artifacts(step_root),
        }
    }

    /// Attach to a step: stop the previous pair, snapshot, and — when
    /// `start_tails` is set — begin live tailing both streams under a fresh
    /// child of `run_token`. Chunks are delivered through `chunks`; the
    /// consumer owns the buffers and applies the bounded-append policy.
    ///
    /// When `start_tails` is false (step terminal, not yet started, or live
    /// tailing disabled) the snapshot is the final view.
    pub fn attach(
        &mut self,
        step_root: &Path,
        start_tails: bool,
        run_token: &CancelToken,
        chunks: &Sender<(OutputStream, String)>,
    ) -> StepOutputView {
        self.stop();

        let view = Self::snapshot(step_root);

        if !start_tails || !step_root.exists() {
            return view;
        }

        let token = run_token.child();
        self.spawn_stream(
            step_root.join("stdout.txt"),
            OutputStream::Stdout,
            &token,
            chunks.clone(),
        );
        self.spawn_stream(
            step_root.join("stderr.txt"),
            OutputStream::Stderr,
            &token,
            chunks.clone(),
        );
        self.current = Some(token);

        view
    }

    fn spawn_stream(
        &self,
        path: PathBuf,
        stream: OutputStream,
        token: &CancelToken,
        chunks: Sender<(OutputStream, String)>,
    ) {
        // Resume from the current length so the live tail only delivers
        // content written after the snapshot.
        let initial_offset = std::fs::metadata(&path).map_or(0, |m| m.len());
        debug!(
            "tailing {} from offset {initial_offset}",
            path.display()
        );
        spawn_tail(
            path,
            initial_offset,
            self.poll_interval,
            token.child(),
            move |chunk| {
                let _ = chunks.send((stream, chunk));
            },
        );
    }
}

impl Drop for OutputMultiplexer {
    fn drop(&mut self) {
        self.stop();
    }
}
