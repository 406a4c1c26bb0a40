//! Journal tailing against a live file: partial writes and rotation.

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use runwatch::cancel::CancelToken;
use runwatch::journal::tailer::JournalTailer;

use super::helpers::{append, append_journal};

const POLL: Duration = Duration::from_millis(10);
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn test_partial_line_is_not_decoded_early() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let journal = dir.path().join("journal.jsonl");

    let cancel = CancelToken::new();
    let tailer = JournalTailer::start(&journal, cancel.clone(), POLL);
    let rx = tailer.subscribe();

    // Writer is mid-append: no newline yet, nothing may be delivered.
    append(&journal, r#"{"stepId":"s1","status":"ok","tsUtc":"2024-"#);
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    append(&journal, "01-01T00:00:05Z\"}\n");
    let event = rx.recv_timeout(RECV_TIMEOUT).expect("Expected event");
    assert_eq!(event.step_id.as_deref(), Some("s1"));
    assert_eq!(event.ts_utc, "2024-01-01T00:00:05Z");

    cancel.cancel();
    tailer.join();
}

#[test]
fn test_rotation_restarts_from_the_beginning() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let journal = dir.path().join("journal.jsonl");

    let cancel = CancelToken::new();
    let tailer = JournalTailer::start(&journal, cancel.clone(), POLL);
    let rx = tailer.subscribe();

    append_journal(&journal, "s1", "start", "2024-01-01T00:00:00Z");
    append_journal(&journal, "s1", "ok", "2024-01-01T00:00:05Z");
    assert_eq!(
        rx.recv_timeout(RECV_TIMEOUT).expect("event").status,
        "start"
    );
    assert_eq!(rx.recv_timeout(RECV_TIMEOUT).expect("event").status, "ok");

    // Replace the journal with a shorter file: the tail must reset to
    // offset 0 and deliver the fresh content.
    fs::write(&journal, "").expect("Failed to truncate journal");
    append_journal(&journal, "s9", "start", "2024-01-01T01:00:00Z");

    let event = rx.recv_timeout(RECV_TIMEOUT).expect("Expected event");
    assert_eq!(event.step_id.as_deref(), Some("s9"));

    cancel.cancel();
    tailer.join();
}

#[test]
fn test_malformed_lines_do_not_stop_the_stream() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let journal = dir.path().join("journal.jsonl");

    let cancel = CancelToken::new();
    let tailer = JournalTailer::start(&journal, cancel.clone(), POLL);
    let rx = tailer.subscribe();

    append(&journal, "not json\n");
    append_journal(&journal, "s1", "ok", "2024-01-01T00:00:05Z");

    let event = rx.recv_timeout(RECV_TIMEOUT).expect("Expected event");
    assert_eq!(event.step_id.as_deref(), Some("s1"));
    assert_eq!(event.status, "ok");

    cancel.cancel();
    tailer.join();
}
