//! Poll-based tailing of growing text files.
//!
//! The tailer works against files written by another process: the file may
//! not exist yet, may be truncated or replaced mid-run, and is never locked
//! against the writer. Transient read errors are swallowed and retried on
//! the next poll; the only consistency mechanism is the truncation check on
//! the byte offset.

pub mod lines;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::cancel::CancelToken;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Maximum bytes read per poll.
pub const MAX_CHUNK_BYTES: u64 = 64 * 1024;

/// Read position within a single tailed file.
///
/// Invariant: `byte_offset` never exceeds the last observed file length and
/// never decreases, except when a shrink is detected (rotation/truncation),
/// in which case it resets to 0 and the file is re-read from the start.
#[derive(Debug, Clone)]
pub struct TailCursor {
    pub file_path: PathBuf,
    pub byte_offset: u64,
}

impl TailCursor {
    pub fn new(file_path: impl Into<PathBuf>, byte_offset: u64) -> Self {
        Self {
            file_path: file_path.into(),
            byte_offset,
        }
    }

    /// Perform one poll: read up to [`MAX_CHUNK_BYTES`] of newly appended
    /// content and advance the offset by the bytes actually read.
    ///
    /// Returns `None` when there is nothing new or the file is momentarily
    /// unreadable. Transient errors are not surfaced; the next poll retries.
    pub fn poll_once(&mut self) -> Option<String> {
        match self.read_new_bytes() {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(
                    "transient tail error on {}: {e}",
                    self.file_path.display()
                );
                None
            }
        }
    }

    fn read_new_bytes(&mut self) -> std::io::Result<Option<String>> {
        if !self.file_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.file_path)?;
        let len = file.metadata()?.len();

        // Shrink means the file was truncated or replaced; restart from the
        // beginning. No attempt is made to distinguish a "new" file from the
        // old one.
        if self.byte_offset > len {
            self.byte_offset = 0;
        }

        if len <= self.byte_offset {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(self.byte_offset))?;
        let to_read = (len - self.byte_offset).min(MAX_CHUNK_BYTES);
        let mut buf = vec![0u8; to_read as usize];
        let read = file.read(&mut buf)?;
        if read == 0 {
            return Ok(None);
        }

        self.byte_offset += read as u64;
        let chunk = String::from_utf8_lossy(&buf[..read]).into_owned();
        if chunk.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }
}

/// Tail a file until the token is cancelled, invoking `on_chunk` for every
/// non-empty chunk of appended text.
///
/// Blocks the calling thread; use [`spawn_tail`] for a background worker.
/// A missing file is not an error: the loop waits for it to appear.
pub fn tail_file(
    file_path: &Path,
    initial_offset: u64,
    poll_interval: Duration,
    cancel: &CancelToken,
    mut on_chunk: impl FnMut(String),
) {
    let mut cursor = TailCursor::new(file_path, initial_offset);

    while !cancel.is_cancelled() {
        if let Some(chunk) = cursor.poll_once() {
            on_chunk(chunk);
        }
        thread::sleep(poll_interval);
    }
}

/// Spawn a background thread running [`tail_file`].
pub fn spawn_tail(
    file_path: PathBuf,
    initial_offset: u64,
    poll_interval: Duration,
    cancel: CancelToken,
    on_chunk: impl FnMut(String) + Send + 'static,
) -> JoinHandle<()> {
    thread::spawn(move || tail_file(&file_path, initial_offset, poll_interval, &cancel, on_chunk))
}
