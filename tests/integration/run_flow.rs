//! Full run lifecycle through the orchestrator with a stub engine.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use runwatch::cancel::CancelToken;
use runwatch::engine::EngineError;
use runwatch::run::paths::RunPaths;
use runwatch::run::RunOrchestrator;

use super::helpers::{append, append_journal, ok_outcome, settle, wait_until, StubEngine};

const POLL: Duration = Duration::from_millis(25);

fn write_plan(dir: &TempDir, steps: usize) -> std::path::PathBuf {
    let plan = dir.path().join("plan.json");
    let steps: Vec<_> = (0..steps).map(|i| serde_json::json!({"id": format!("s{i}")})).collect();
    fs::write(
        &plan,
        serde_json::json!({"name": "demo", "steps": steps}).to_string(),
    )
    .expect("Failed to write plan");
    plan
}

#[test]
fn test_full_run_builds_timeline_and_progress() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let plan = write_plan(&dir, 2);
    let logs_root = dir.path().join("logs");

    let engine_logs = logs_root.clone();
    let engine = StubEngine::new(logs_root.clone(), move |request| {
        let paths = RunPaths::new(&engine_logs, request.run_id.clone());
        let journal = paths.journal_path();
        append_journal(&journal, "s1", "start", "2024-01-01T00:00:00Z");
        append_journal(&journal, "s1", "ok", "2024-01-01T00:00:05Z");
        append_journal(&journal, "s2", "start", "2024-01-01T00:00:05Z");
        append_journal(&journal, "s2", "error", "2024-01-01T00:00:07Z");
        settle();
        Ok(ok_outcome())
    });

    let mut orchestrator = RunOrchestrator::new(Arc::new(engine)).with_poll_interval(POLL);
    let cancel = CancelToken::new();
    let handle = orchestrator
        .begin_run(&plan, "Apply", &cancel)
        .expect("begin_run should succeed");
    let state = handle.state();

    let summary = handle.wait();
    assert!(
        summary.status.starts_with("Finished. status=ok"),
        "unexpected status: {}",
        summary.status
    );
    assert!(summary.status.contains("endUtc=2024-01-01T00:01:00Z"));

    let state = state.lock().expect("state lock");
    assert_eq!(state.events.len(), 4);
    assert_eq!(state.timeline.steps().len(), 2);
    assert_eq!(state.timeline.record("s1").expect("s1").status, "ok");
    assert_eq!(state.timeline.record("s2").expect("s2").status, "error");
    assert_eq!(state.timeline.progress().completed_steps, 2);
    assert_eq!(state.timeline.progress().total_steps, 2);
    assert_eq!(state.timeline.progress().fraction(), 1.0);
    assert_eq!(state.status, summary.status);
}

#[test]
fn test_live_output_follows_the_selected_running_step() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let plan = write_plan(&dir, 1);
    let logs_root = dir.path().join("logs");

    let engine_logs = logs_root.clone();
    let engine = StubEngine::new(logs_root.clone(), move |request| {
        let paths = RunPaths::new(&engine_logs, request.run_id.clone());
        append_journal(&paths.journal_path(), "s1", "start", "2024-01-01T00:00:00Z");
        append(&paths.step_stdout("s1"), "hello\n");

        // Stay "running" long enough for the test to select the step.
        std::thread::sleep(Duration::from_millis(1200));
        append(&paths.step_stdout("s1"), "world\n");

        append_journal(&paths.journal_path(), "s1", "ok", "2024-01-01T00:00:05Z");
        settle();
        Ok(ok_outcome())
    });

    let mut orchestrator = RunOrchestrator::new(Arc::new(engine)).with_poll_interval(POLL);
    let cancel = CancelToken::new();
    let handle = orchestrator
        .begin_run(&plan, "Apply", &cancel)
        .expect("begin_run should succeed");
    let state = handle.state();

    assert!(wait_until(Duration::from_secs(5), || {
        state
            .lock()
            .expect("state lock")
            .timeline
            .record("s1")
            .is_some()
    }));
    handle.select_step(Some("s1".to_string()));

    let summary = handle.wait();
    assert!(summary.status.starts_with("Finished."));

    // The terminal event froze the view with a final snapshot, so the full
    // output is present regardless of tail timing.
    let state = state.lock().expect("state lock");
    assert!(state.stdout.as_str().contains("hello"));
    assert!(state.stdout.as_str().contains("world"));
    assert!(state.artifacts.iter().any(|a| a.name == "stdout.txt"));
}

#[test]
fn test_selecting_a_finished_step_shows_a_frozen_snapshot() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let plan = write_plan(&dir, 1);
    let logs_root = dir.path().join("logs");

    let engine_logs = logs_root.clone();
    let engine = StubEngine::new(logs_root.clone(), move |request| {
        let paths = RunPaths::new(&engine_logs, request.run_id.clone());
        append(&paths.step_stdout("s1"), "final output");
        append(&paths.step_root("s1").join("result.json"), "{}");
        append_journal(&paths.journal_path(), "s1", "start", "2024-01-01T00:00:00Z");
        append_journal(&paths.journal_path(), "s1", "ok", "2024-01-01T00:00:05Z");

        // Window for the test to select the already-finished step.
        std::thread::sleep(Duration::from_millis(1500));
        settle();
        Ok(ok_outcome())
    });

    let mut orchestrator = RunOrchestrator::new(Arc::new(engine)).with_poll_interval(POLL);
    let cancel = CancelToken::new();
    let handle = orchestrator
        .begin_run(&plan, "Apply", &cancel)
        .expect("begin_run should succeed");
    let state = handle.state();

    assert!(wait_until(Duration::from_secs(5), || {
        state
            .lock()
            .expect("state lock")
            .timeline
            .record("s1")
            .is_some_and(|r| r.status == "ok")
    }));
    handle.select_step(Some("s1".to_string()));

    assert!(wait_until(Duration::from_secs(5), || {
        state.lock().expect("state lock").stdout.as_str() == "final output"
    }));
    let artifacts: Vec<String> = state
        .lock()
        .expect("state lock")
        .artifacts
        .iter()
        .map(|a| a.name.clone())
        .collect();
    assert!(artifacts.contains(&"result.json".to_string()));
    assert!(artifacts.contains(&"stdout.txt".to_string()));

    // The step is terminal: no live tail may pick up later writes.
    let engine_paths = RunPaths::new(&logs_root, handle.run_id().to_string());
    append(&engine_paths.step_stdout("s1"), " late bytes");
    std::thread::sleep(Duration::from_millis(300));
    assert!(!state
        .lock()
        .expect("state lock")
        .stdout
        .as_str()
        .contains("late bytes"));

    handle.wait();
}

#[test]
fn test_live_tail_toggle_pauses_and_resumes_output() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let plan = write_plan(&dir, 1);
    let logs_root = dir.path().join("logs");

    let engine_logs = logs_root.clone();
    let engine = StubEngine::new(logs_root.clone(), move |request| {
        let paths = RunPaths::new(&engine_logs, request.run_id.clone());
        append_journal(&paths.journal_path(), "s1", "start", "2024-01-01T00:00:00Z");

        // Stay "running" while the test toggles live tailing on and off.
        std::thread::sleep(Duration::from_millis(3000));

        append_journal(&paths.journal_path(), "s1", "ok", "2024-01-01T00:00:05Z");
        settle();
        Ok(ok_outcome())
    });

    let mut orchestrator = RunOrchestrator::new(Arc::new(engine)).with_poll_interval(POLL);
    let cancel = CancelToken::new();
    let handle = orchestrator
        .begin_run(&plan, "Apply", &cancel)
        .expect("begin_run should succeed");
    let state = handle.state();
    let paths = RunPaths::new(&logs_root, handle.run_id().to_string());

    assert!(wait_until(Duration::from_secs(5), || {
        state
            .lock()
            .expect("state lock")
            .timeline
            .record("s1")
            .is_some()
    }));
    handle.select_step(Some("s1".to_string()));

    // Live tailing is on by default: both streams follow the files.
    append(&paths.step_stdout("s1"), "hello\n");
    append(&paths.step_stderr("s1"), "warn\n");
    assert!(wait_until(Duration::from_secs(5), || {
        let state = state.lock().expect("state lock");
        state.stdout.as_str().contains("hello") && state.stderr.as_str().contains("warn")
    }));

    // Disabled: the snapshot stays the view and later writes never arrive.
    handle.set_live_tail(false);
    std::thread::sleep(Duration::from_millis(300));
    append(&paths.step_stdout("s1"), "hidden\n");
    std::thread::sleep(Duration::from_millis(400));
    assert!(!state
        .lock()
        .expect("state lock")
        .stdout
        .as_str()
        .contains("hidden"));

    // Re-enabled: a fresh snapshot picks up the missed content and the live
    // tail resumes from there.
    handle.set_live_tail(true);
    assert!(wait_until(Duration::from_secs(5), || {
        state
            .lock()
            .expect("state lock")
            .stdout
            .as_str()
            .contains("hidden")
    }));
    append(&paths.step_stdout("s1"), "resumed\n");
    assert!(wait_until(Duration::from_secs(5), || {
        state
            .lock()
            .expect("state lock")
            .stdout
            .as_str()
            .contains("resumed")
    }));

    let summary = handle.wait();
    assert!(summary.status.starts_with("Finished."));
}

#[test]
fn test_running_durations_refresh_while_the_run_is_active() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let plan = write_plan(&dir, 1);
    let logs_root = dir.path().join("logs");

    let engine = StubEngine::hanging(logs_root);
    let mut orchestrator = RunOrchestrator::new(Arc::new(engine)).with_poll_interval(POLL);
    let cancel = CancelToken::new();
    let handle = orchestrator
        .begin_run(&plan, "Apply", &cancel)
        .expect("begin_run should succeed");
    let state = handle.state();

    let initial_tick = state.lock().expect("state lock").last_tick;

    // The refresh ticker fires every second; "now" for running-step
    // durations must advance while the engine is still busy.
    assert!(wait_until(Duration::from_secs(3), || {
        state.lock().expect("state lock").last_tick > initial_tick
    }));

    cancel.cancel();
    let summary = handle.wait();
    assert_eq!(summary.status, "Cancelled");
}

#[test]
fn test_engine_error_is_surfaced_without_corrupting_state() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let plan = write_plan(&dir, 1);
    let logs_root = dir.path().join("logs");

    let engine_logs = logs_root.clone();
    let engine = StubEngine::new(logs_root, move |request| {
        let paths = RunPaths::new(&engine_logs, request.run_id.clone());
        append_journal(&paths.journal_path(), "s1", "start", "2024-01-01T00:00:00Z");
        append_journal(&paths.journal_path(), "s1", "ok", "2024-01-01T00:00:05Z");
        settle();
        Err(EngineError::Failed {
            code: 2,
            stderr: "engine exploded".to_string(),
        })
    });

    let mut orchestrator = RunOrchestrator::new(Arc::new(engine)).with_poll_interval(POLL);
    let cancel = CancelToken::new();
    let handle = orchestrator
        .begin_run(&plan, "Apply", &cancel)
        .expect("begin_run should succeed");
    let state = handle.state();

    let summary = handle.wait();
    assert_eq!(
        summary.status,
        "Error: engine exited with code 2: engine exploded"
    );

    // Already-accumulated timeline state survives the engine failure.
    let state = state.lock().expect("state lock");
    assert_eq!(state.timeline.record("s1").expect("s1").status, "ok");
    assert_eq!(state.timeline.progress().completed_steps, 1);
}

#[test]
fn test_cancellation_is_a_normal_terminal_path() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let plan = write_plan(&dir, 1);
    let logs_root = dir.path().join("logs");

    let engine = StubEngine::hanging(logs_root);
    let mut orchestrator = RunOrchestrator::new(Arc::new(engine)).with_poll_interval(POLL);
    let cancel = CancelToken::new();
    let handle = orchestrator
        .begin_run(&plan, "Apply", &cancel)
        .expect("begin_run should succeed");

    let canceller = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        canceller.cancel();
    });

    let summary = handle.wait();
    assert_eq!(summary.status, "Cancelled");
}
