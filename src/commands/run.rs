//! `runwatch run` - execute a plan through the engine and monitor it live.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};

use crate::cancel::CancelToken;
use crate::journal::StepEvent;
use crate::run::{RunOrchestrator, RunState};
use crate::timeline::is_running_status;

const RENDER_INTERVAL: Duration = Duration::from_millis(200);

pub fn execute(
    plan_path: &Path,
    mode: &str,
    engine_cmd: Option<&str>,
    step: Option<String>,
) -> Result<()> {
    let engine = super::resolve_engine(engine_cmd)?;
    let mut orchestrator = RunOrchestrator::new(Arc::new(engine));

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .context("Failed to install Ctrl-C handler")?;
    }

    let handle = orchestrator
        .begin_run(plan_path, mode, &cancel)
        .context("Failed to start run")?;

    println!("{} {}", "run".bold(), handle.run_id());
    if let Ok(state) = handle.state().lock() {
        println!("{}", state.run_folder.display().to_string().dimmed());
    }

    let follow_step = step.is_some();
    if follow_step {
        handle.controller().select_step(step);
    }

    let state = handle.state();
    let done = Arc::new(AtomicBool::new(false));
    let renderer = {
        let state = Arc::clone(&state);
        let done = Arc::clone(&done);
        thread::spawn(move || render_loop(&state, &done, follow_step))
    };

    let summary = handle.wait();
    done.store(true, Ordering::SeqCst);
    let _ = renderer.join();

    print_timeline(&state);
    println!("{}", summary.status.bold());
    Ok(())
}

/// Print journal events (and, when following a step, its live stdout) as
/// they arrive, until the run finishes.
fn render_loop(state: &Arc<Mutex<RunState>>, done: &Arc<AtomicBool>, follow_step: bool) {
    let mut printed_events = 0;
    let mut printed_stdout = 0;

    loop {
        let finished = done.load(Ordering::SeqCst);
        if let Ok(state) = state.lock() {
            for event in &state.events[printed_events..] {
                println!("{}", format_event(event));
            }
            printed_events = state.events.len();

            if follow_step {
                let stdout = state.stdout.as_str();
                if stdout.len() < printed_stdout || !stdout.is_char_boundary(printed_stdout) {
                    // Front eviction or a new selection reset the buffer.
                    printed_stdout = 0;
                }
                if stdout.len() > printed_stdout {
                    print!("{}", &stdout[printed_stdout..]);
                    let _ = std::io::stdout().flush();
                    printed_stdout = stdout.len();
                }
            }
        }
        if finished {
            break;
        }
        thread::sleep(RENDER_INTERVAL);
    }
}

fn format_event(event: &StepEvent) -> String {
    let step = event.step_id.as_deref().unwrap_or("-");
    let message = event.message.as_deref().unwrap_or("");
    format!(
        "{} {} {} {}",
        event.ts_utc.dimmed(),
        step.bold(),
        status_colored(&event.status),
        message
    )
}

fn print_timeline(state: &Arc<Mutex<RunState>>) {
    let Ok(state) = state.lock() else {
        return;
    };
    if state.timeline.steps().is_empty() {
        return;
    }

    println!();
    for record in state.timeline.steps() {
        let duration = record
            .duration(state.last_tick)
            .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_default();
        println!(
            "  {} {} {} {}",
            status_glyph(&record.status),
            record.step_id.bold(),
            status_colored(&record.status),
            duration.dimmed()
        );
    }

    let progress = state.timeline.progress();
    if progress.total_steps > 0 {
        println!(
            "{}",
            format!(
                "{}/{} steps ({:.0}%)",
                progress.completed_steps,
                progress.total_steps,
                progress.fraction() * 100.0
            )
            .dimmed()
        );
    }
}

fn status_colored(status: &str) -> ColoredString {
    match status.to_lowercase().as_str() {
        "ok" | "end" => status.green(),
        "error" => status.red(),
        "blocked" => status.yellow(),
        "skip" | "whatif" => status.dimmed(),
        s if is_running_status(s) => status.cyan(),
        _ => status.normal(),
    }
}

fn status_glyph(status: &str) -> ColoredString {
    match status.to_lowercase().as_str() {
        "ok" | "end" => "✓".green(),
        "error" => "✗".red(),
        "blocked" => "⊘".yellow(),
        "skip" | "whatif" => "-".dimmed(),
        s if is_running_status(s) => "▸".cyan(),
        _ => "·".normal(),
    }
}
