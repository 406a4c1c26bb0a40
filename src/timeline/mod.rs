//! Step timeline aggregation.
//!
//! [`StepTimeline`] consumes journal events in arrival order and maintains
//! the authoritative in-memory run state: one record per step id, terminal
//! bookkeeping, and run-wide progress. It is single-writer by design: all
//! calls to [`StepTimeline::apply`] must come from one consumer context.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::journal::StepEvent;

/// Step statuses after which no further lifecycle transitions are expected.
const TERMINAL_STATUSES: &[&str] = &["ok", "error", "blocked", "skip", "whatif", "end"];

/// Display status for a raw `start` event.
const RUNNING_STATUS: &str = "running";

/// True for statuses in the terminal set (case-insensitive).
pub fn is_terminal_status(status: &str) -> bool {
    let s = status.to_lowercase();
    TERMINAL_STATUSES.contains(&s.as_str())
}

/// True for statuses in the running set (case-insensitive).
pub fn is_running_status(status: &str) -> bool {
    let s = status.to_lowercase();
    s == "start" || s == RUNNING_STATUS
}

/// Canonical display status: raw `start` becomes `running`, anything else is
/// used verbatim.
pub fn canonical_status(raw: &str) -> String {
    if raw.eq_ignore_ascii_case("start") {
        RUNNING_STATUS.to_string()
    } else {
        raw.to_string()
    }
}

/// Aggregated view of one plan step, built from journal events.
#[derive(Debug, Clone)]
pub struct StepTimelineRecord {
    pub step_id: String,
    pub step_type: Option<String>,
    pub status: String,
    pub message: Option<String>,
    pub started_utc: Option<DateTime<Utc>>,
    pub ended_utc: Option<DateTime<Utc>>,
}

impl StepTimelineRecord {
    fn new(step_id: String) -> Self {
        Self {
            step_id,
            step_type: None,
            status: "created".to_string(),
            message: None,
            started_utc: None,
            ended_utc: None,
        }
    }

    /// Elapsed time: `(ended ?? now) - started`, or `None` before the first
    /// start event. Running steps keep growing as `now` advances.
    pub fn duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_utc?;
        Some(self.ended_utc.unwrap_or(now) - started)
    }
}

/// Run-wide completion progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunProgress {
    /// Declared step count from the plan document; 0 when unreadable.
    pub total_steps: usize,
    /// Distinct step ids that have reached a terminal status.
    pub completed_steps: usize,
}

impl RunProgress {
    /// Completion fraction clamped to [0, 1]; 0 when the total is unknown.
    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.completed_steps as f64 / self.total_steps as f64).clamp(0.0, 1.0)
    }
}

/// Outcome of applying an event that the orchestrator must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineSignal {
    /// The currently selected step reached a terminal status: stop its live
    /// output tails and take a final artifact snapshot.
    SelectedStepFinished { step_id: String },
}

/// In-memory run state machine fed by the journal tail.
#[derive(Debug, Default)]
pub struct StepTimeline {
    steps: Vec<StepTimelineRecord>,
    counted: HashSet<String>,
    selected: Option<String>,
    progress: RunProgress,
}

impl StepTimeline {
    pub fn new(total_steps: usize) -> Self {
        Self {
            progress: RunProgress {
                total_steps,
                completed_steps: 0,
            },
            ..Self::default()
        }
    }

    /// Records in insertion order (first event per id decides the position).
    pub fn steps(&self) -> &[StepTimelineRecord] {
        &self.steps
    }

    pub fn progress(&self) -> RunProgress {
        self.progress
    }

    pub fn selected_step_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Change the selected step. The caller restarts output tailing.
    pub fn select(&mut self, step_id: Option<String>) {
        self.selected = step_id;
    }

    pub fn record(&self, step_id: &str) -> Option<&StepTimelineRecord> {
        self.steps.iter().find(|r| r.step_id == step_id)
    }

    /// Apply one journal event. Must be invoked in arrival order from a
    /// single consumer; not safe for unsynchronized concurrent calls.
    pub fn apply(&mut self, event: &StepEvent) -> Option<TimelineSignal> {
        // Structural/lifecycle events with no step are not tracked here.
        let step_id = event.step_id.as_deref()?.trim();
        if step_id.is_empty() {
            return None;
        }

        let idx = match self.steps.iter().position(|r| r.step_id == step_id) {
            Some(idx) => idx,
            None => {
                self.steps.push(StepTimelineRecord::new(step_id.to_string()));
                self.steps.len() - 1
            }
        };

        // Sticky step type: later events without one don't clear it.
        if let Some(step_type) = event.step_type.as_deref() {
            if !step_type.trim().is_empty() {
                self.steps[idx].step_type = Some(step_type.to_string());
            }
        }

        self.steps[idx].status = canonical_status(&event.status);
        self.steps[idx].message = event.message.clone();

        // Timing, completion counting and the selected-step signal all need
        // a parseable timestamp; without one the status/message update above
        // is all that happens.
        let ts = parse_utc(&event.ts_utc)?;

        if event.status.eq_ignore_ascii_case("start") && self.steps[idx].started_utc.is_none() {
            self.steps[idx].started_utc = Some(ts);
        }

        if is_terminal_status(&event.status) {
            // Last terminal event wins for the end timestamp.
            self.steps[idx].ended_utc = Some(ts);
        }

        if is_terminal_status(&self.steps[idx].status)
            && self.counted.insert(step_id.to_lowercase())
        {
            // Exactly-once per id, no matter how many terminal events arrive.
            self.progress.completed_steps = self.counted.len();
        }

        let selected_finished = self
            .selected
            .as_deref()
            .is_some_and(|sel| sel == step_id && is_terminal_status(&self.steps[idx].status));
        if selected_finished {
            return Some(TimelineSignal::SelectedStepFinished {
                step_id: step_id.to_string(),
            });
        }

        None
    }
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    if s.trim().is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
