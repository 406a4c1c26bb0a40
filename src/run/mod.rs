//! Run orchestration: ties the journal tail, timeline aggregation and live
//! output views together for the lifetime of one run.
//!
//! Concurrency discipline: the tails are independent producer threads, but
//! every mutation of the timeline and the output buffers happens on one
//! consumer thread that drains a single update channel. Producers never
//! touch shared state directly.

pub mod paths;

use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::engine::{EngineError, ExecutionEngine, RunOutcome, RunRequest};
use crate::journal::tailer::JournalTailer;
use crate::journal::StepEvent;
use crate::output::multiplexer::{OutputMultiplexer, OutputStream, StepOutputView};
use crate::output::{ArtifactFile, OutputBuffer};
use crate::plan::count_plan_steps;
use crate::timeline::{is_running_status, StepTimeline, TimelineSignal};

use paths::RunPaths;

/// Tick rate for recomputing durations of still-running steps.
const DURATION_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// How long the consumer waits for an update before re-checking cancellation.
const CONSUMER_IDLE_WAIT: Duration = Duration::from_millis(100);

/// Messages marshalled onto the single consumer thread. All timeline and
/// buffer mutations flow through here, including selection changes.
#[derive(Debug)]
pub enum RunUpdate {
    /// A decoded journal event, in file order.
    Journal(StepEvent),
    /// A chunk of live output from the selected step.
    Output(OutputStream, String),
    /// Periodic duration refresh.
    Tick,
    /// Change the selected step (restarts output tailing).
    Select(Option<String>),
    /// Toggle live output tailing.
    LiveTail(bool),
}

/// All run-scoped state, readable by the presentation layer under the lock.
/// Only the consumer thread writes to it.
pub struct RunState {
    pub run_id: String,
    pub run_folder: std::path::PathBuf,
    pub status: String,
    pub events: Vec<StepEvent>,
    pub timeline: StepTimeline,
    pub stdout: OutputBuffer,
    pub stderr: OutputBuffer,
    pub artifacts: Vec<ArtifactFile>,
    pub live_tail: bool,
    /// Advanced by the refresh ticker; read as "now" for running durations.
    pub last_tick: DateTime<Utc>,
}

impl RunState {
    fn new(run_id: String, run_folder: std::path::PathBuf, total_steps: usize) -> Self {
        Self {
            run_id,
            run_folder,
            status: "Starting".to_string(),
            events: Vec::new(),
            timeline: StepTimeline::new(total_steps),
            stdout: OutputBuffer::new(),
            stderr: OutputBuffer::new(),
            artifacts: Vec::new(),
            live_tail: true,
            last_tick: Utc::now(),
        }
    }
}

/// Final report for a finished (or failed, or cancelled) run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub status: String,
    pub outcome: Option<RunOutcome>,
}

pub struct RunOrchestrator {
    engine: Arc<dyn ExecutionEngine>,
    poll_interval: Duration,
    previous_run: Option<CancelToken>,
}

impl RunOrchestrator {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            poll_interval: crate::tail::DEFAULT_POLL_INTERVAL,
            previous_run: None,
        }
    }

    /// Override the tail poll interval (mainly for tests).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Start a run: reset run-scoped state, begin tailing the journal, and
    /// invoke the engine on a background thread. Returns a handle for
    /// selection, cancellation and awaiting the result.
    ///
    /// Exactly one run is active at a time; any previous run is cancelled
    /// and torn down first.
    pub fn begin_run(
        &mut self,
        plan_path: &Path,
        mode: &str,
        cancel: &CancelToken,
    ) -> Result<RunHandle> {
        if let Some(previous) = self.previous_run.take() {
            previous.cancel();
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let logs_root = self
            .engine
            .logs_root()
            .context("Failed to resolve the engine's logs root")?;
        let run_paths = RunPaths::new(logs_root, run_id.clone());
        info!("run {run_id} writing to {}", run_paths.run_folder().display());

        let total_steps = count_plan_steps(plan_path);
        let mut state = RunState::new(run_id.clone(), run_paths.run_folder(), total_steps);
        state.status = format!("Running ({mode})");
        let state = Arc::new(Mutex::new(state));

        let run_token = cancel.child();
        self.previous_run = Some(run_token.clone());
        let worker_token = run_token.child();

        let (updates_tx, updates_rx) = mpsc::channel::<RunUpdate>();

        let tailer = JournalTailer::start(
            &run_paths.journal_path(),
            worker_token.child(),
            self.poll_interval,
        );
        spawn_journal_forwarder(tailer.subscribe(), updates_tx.clone());
        spawn_duration_ticker(worker_token.child(), updates_tx.clone());

        let consumer = spawn_consumer(
            updates_rx,
            Arc::clone(&state),
            run_paths.clone(),
            worker_token.clone(),
            self.poll_interval,
        );

        let outcome_rx = spawn_engine_worker(
            Arc::clone(&self.engine),
            RunRequest {
                plan_path: plan_path.to_path_buf(),
                mode: mode.to_string(),
                run_id: run_id.clone(),
                policy_path: None,
                no_snapshot: false,
                continue_on_error: false,
            },
            run_token.child(),
        );

        Ok(RunHandle {
            run_id,
            state,
            updates: updates_tx,
            run_token,
            worker_token,
            outcome_rx,
            tailer: Some(tailer),
            consumer: Some(consumer),
        })
    }
}

/// Cloneable control surface for an active run, usable while another thread
/// blocks in [`RunHandle::wait`].
#[derive(Clone)]
pub struct RunController {
    updates: Sender<RunUpdate>,
}

impl RunController {
    pub fn select_step(&self, step_id: Option<String>) {
        let _ = self.updates.send(RunUpdate::Select(step_id));
    }

    pub fn set_live_tail(&self, enabled: bool) {
        let _ = self.updates.send(RunUpdate::LiveTail(enabled));
    }
}

/// Handle to the active run.
pub struct RunHandle {
    run_id: String,
    state: Arc<Mutex<RunState>>,
    updates: Sender<RunUpdate>,
    run_token: CancelToken,
    worker_token: CancelToken,
    outcome_rx: Receiver<Result<RunOutcome, EngineError>>,
    tailer: Option<JournalTailer>,
    consumer: Option<JoinHandle<()>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Shared run state. Read-only from the caller's perspective: all
    /// mutations happen on the consumer thread.
    pub fn state(&self) -> Arc<Mutex<RunState>> {
        Arc::clone(&self.state)
    }

    /// Select a step for live output viewing, or clear the selection.
    pub fn select_step(&self, step_id: Option<String>) {
        let _ = self.updates.send(RunUpdate::Select(step_id));
    }

    /// Toggle live tailing of the selected step's output.
    pub fn set_live_tail(&self, enabled: bool) {
        let _ = self.updates.send(RunUpdate::LiveTail(enabled));
    }

    /// A cloneable controller for use from other threads.
    pub fn controller(&self) -> RunController {
        RunController {
            updates: self.updates.clone(),
        }
    }

    /// Cancel the run cooperatively: the engine process is stopped and every
    /// tail and timer unwinds at its next poll boundary.
    pub fn cancel(&self) {
        self.run_token.cancel();
    }

    /// Block until the engine finishes, then tear down the tails and report
    /// the final run status. Engine errors and cancellation are reported as
    /// status text, never as a panic or a poisoned state.
    pub fn wait(mut self) -> RunSummary {
        let result = self.outcome_rx.recv();

        self.worker_token.cancel();
        if let Some(tailer) = self.tailer.take() {
            tailer.join();
        }
        drop(self.updates);
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }

        let (status, outcome) = match result {
            Ok(Ok(outcome)) => (
                format!(
                    "Finished. status={} endUtc={}",
                    outcome.status.as_deref().unwrap_or("?"),
                    outcome.end_utc.as_deref().unwrap_or("?")
                ),
                Some(outcome),
            ),
            Ok(Err(EngineError::Cancelled)) => ("Cancelled".to_string(), None),
            Ok(Err(e)) => (format!("Error: {e}"), None),
            Err(_) => ("Error: engine worker exited without a result".to_string(), None),
        };

        if let Ok(mut state) = self.state.lock() {
            state.status = status.clone();
        }

        RunSummary {
            run_id: self.run_id,
            status,
            outcome,
        }
    }
}

fn spawn_journal_forwarder(events: Receiver<StepEvent>, updates: Sender<RunUpdate>) {
    thread::spawn(move || {
        for event in events {
            if updates.send(RunUpdate::Journal(event)).is_err() {
                break;
            }
        }
    });
}

fn spawn_duration_ticker(cancel: CancelToken, updates: Sender<RunUpdate>) {
    thread::spawn(move || {
        while !cancel.is_cancelled() {
            thread::sleep(DURATION_REFRESH_INTERVAL);
            if cancel.is_cancelled() || updates.send(RunUpdate::Tick).is_err() {
                break;
            }
        }
    });
}

fn spawn_engine_worker(
    engine: Arc<dyn ExecutionEngine>,
    request: RunRequest,
    cancel: CancelToken,
) -> Receiver<Result<RunOutcome, EngineError>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = engine.run_plan(&request, &cancel);
        let _ = tx.send(result);
    });
    rx
}

fn spawn_consumer(
    updates: Receiver<RunUpdate>,
    state: Arc<Mutex<RunState>>,
    run_paths: RunPaths,
    cancel: CancelToken,
    poll_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut consumer = Consumer {
            state,
            run_paths,
            cancel: cancel.clone(),
            mux: OutputMultiplexer::new(poll_interval),
            chunks: mpsc::channel(),
        };

        loop {
            // Drain live output chunks first so buffer appends stay close to
            // the producing tail.
            while let Ok((stream, chunk)) = consumer.chunks.1.try_recv() {
                consumer.apply(RunUpdate::Output(stream, chunk));
            }

            match updates.recv_timeout(CONSUMER_IDLE_WAIT) {
                Ok(update) => consumer.apply(update),
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        // Drain whatever already arrived, then unwind.
                        while let Ok(update) = updates.try_recv() {
                            consumer.apply(update);
                        }
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        consumer.mux.stop();
    })
}

/// Single-writer apply loop: the only place run state is mutated.
struct Consumer {
    state: Arc<Mutex<RunState>>,
    run_paths: RunPaths,
    cancel: CancelToken,
    mux: OutputMultiplexer,
    chunks: (Sender<(OutputStream, String)>, Receiver<(OutputStream, String)>),
}

impl Consumer {
    fn apply(&mut self, update: RunUpdate) {
        let state_arc = Arc::clone(&self.state);
        let Ok(mut state) = state_arc.lock() else {
            return;
        };
        match update {
            RunUpdate::Journal(event) => {
                let signal = state.timeline.apply(&event);
                state.events.push(event);
                if let Some(TimelineSignal::SelectedStepFinished { step_id }) = signal {
                    debug!("selected step {step_id} finished; freezing output view");
                    self.mux.stop();
                    let view = OutputMultiplexer::snapshot(&self.run_paths.step_root(&step_id));
                    apply_view(&mut state, view);
                }
            }
            RunUpdate::Output(stream, chunk) => match stream {
                OutputStream::Stdout => state.stdout.append(&chunk),
                OutputStream::Stderr => state.stderr.append(&chunk),
            },
            RunUpdate::Tick => {
                state.last_tick = Utc::now();
            }
            RunUpdate::Select(step_id) => {
                state.timeline.select(step_id);
                self.restart_output(&mut state);
            }
            RunUpdate::LiveTail(enabled) => {
                state.live_tail = enabled;
                self.restart_output(&mut state);
            }
        }
    }

    /// Stop the previous tail pair and rebuild the output view for the
    /// current selection: snapshot always, live tails only for a running
    /// step with live tailing enabled.
    fn restart_output(&mut self, state: &mut RunState) {
        self.mux.stop();
        state.stdout.clear();
        state.stderr.clear();
        state.artifacts.clear();

        let Some(step_id) = state.timeline.selected_step_id().map(str::to_string) else {
            return;
        };

        let running = state
            .timeline
            .record(&step_id)
            .is_some_and(|r| is_running_status(&r.status));
        let start_tails = state.live_tail && running;

        let view = self.mux.attach(
            &self.run_paths.step_root(&step_id),
            start_tails,
            &self.cancel,
            &self.chunks.0,
        );
        apply_view(state, view);
    }
}

fn apply_view(state: &mut RunState, view: StepOutputView) {
    state.stdout.set(view.stdout.as_deref().unwrap_or_default());
    state.stderr.set(view.stderr.as_deref().unwrap_or_default());
    state.artifacts = view.artifacts;
}
