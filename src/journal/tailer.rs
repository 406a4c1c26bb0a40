//! Background journal tail with detachable subscribers.
//!
//! A single worker thread tails the journal in line mode and fans decoded
//! events out to any number of mpsc subscribers. A subscriber detaches by
//! dropping its receiver; the dead sender is pruned on the next send and the
//! underlying tail keeps running for the remaining subscribers.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::{decode_line, StepEvent};
use crate::cancel::CancelToken;
use crate::tail::lines::LineAssembler;
use crate::tail::TailCursor;

pub struct JournalTailer {
    subscribers: Arc<Mutex<Vec<Sender<StepEvent>>>>,
    handle: Option<JoinHandle<()>>,
}

impl JournalTailer {
    /// Start tailing `journal_path` until the token is cancelled.
    ///
    /// The journal's parent directory is created if missing (the run may not
    /// have started writing yet); the file itself may appear later. Events
    /// are delivered to subscribers in file order, with no reordering.
    pub fn start(journal_path: &Path, cancel: CancelToken, poll_interval: Duration) -> Self {
        if let Some(parent) = journal_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(
                    "could not create journal directory {}: {e}",
                    parent.display()
                );
            }
        }

        let subscribers: Arc<Mutex<Vec<Sender<StepEvent>>>> = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn_worker(
            journal_path.to_path_buf(),
            cancel,
            poll_interval,
            Arc::clone(&subscribers),
        );

        Self {
            subscribers,
            handle: Some(handle),
        }
    }

    /// Attach a subscriber. Drop the receiver to detach; the tail itself
    /// keeps running.
    pub fn subscribe(&self) -> Receiver<StepEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Wait for the worker thread to observe cancellation and exit.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_worker(
    journal_path: PathBuf,
    cancel: CancelToken,
    poll_interval: Duration,
    subscribers: Arc<Mutex<Vec<Sender<StepEvent>>>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut cursor = TailCursor::new(&journal_path, 0);
        let mut assembler = LineAssembler::new();

        while !cancel.is_cancelled() {
            if let Some(chunk) = cursor.poll_once() {
                for line in assembler.push(&chunk) {
                    let Some(event) = decode_line(&line) else {
                        debug!("skipping malformed journal line: {line}");
                        continue;
                    };
                    if let Ok(mut subs) = subscribers.lock() {
                        subs.retain(|tx| tx.send(event.clone()).is_ok());
                    }
                }
            }
            thread::sleep(poll_interval);
        }
    })
}
