//! Bounded step-output views: buffers, snapshots, and artifact listings.

pub mod multiplexer;

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Maximum characters retained per output buffer.
pub const MAX_BUFFER_CHARS: usize = 1_000_000;

/// Snapshot reads are capped to 1 MiB.
pub const MAX_SNAPSHOT_BYTES: u64 = 1024 * 1024;

/// Append-only text buffer with front eviction.
///
/// Invariant: at most `max_chars` characters are retained, and what is
/// retained is always the most recent content.
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    max_chars: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_max_chars(MAX_BUFFER_CHARS)
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            max_chars,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Replace the buffer content, keeping only the trailing `max_chars`
    /// characters of `text`. Used when loading a snapshot.
    pub fn set(&mut self, text: &str) {
        self.text.clear();
        self.append(text);
    }

    /// Append a chunk, evicting the oldest characters once the cap is hit.
    pub fn append(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.text.push_str(chunk);

        let total = self.text.chars().count();
        if total > self.max_chars {
            let cut = self
                .text
                .char_indices()
                .nth(total - self.max_chars)
                .map_or(0, |(idx, _)| idx);
            self.text.replace_range(..cut, "");
        }
    }
}

/// Read up to [`MAX_SNAPSHOT_BYTES`] of a file from offset 0.
///
/// Returns `None` when the file does not exist or is momentarily unreadable;
/// snapshots are best-effort by design.
pub fn snapshot_text(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match read_capped(path) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!("snapshot read failed for {}: {e}", path.display());
            None
        }
    }
}

fn read_capped(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len().min(MAX_SNAPSHOT_BYTES);
    let mut buf = vec![0u8; len as usize];
    let mut read = 0;
    while read < buf.len() {
        let n = file.read(&mut buf[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok(String::from_utf8_lossy(&buf[..read]).into_owned())
}

/// One entry of a step's output directory at a point in time.
#[derive(Debug, Clone)]
pub struct ArtifactFile {
    pub name: String,
    pub full_path: PathBuf,
    pub size_bytes: u64,
    pub last_write_time_utc: DateTime<Utc>,
}

/// Enumerate the files in a step's directory.
///
/// Failures (missing directory, permissions, a file disappearing mid-listing)
/// produce an empty or partial listing rather than an error.
pub fn list_artifacts(step_root: &Path) -> Vec<ArtifactFile> {
    let Ok(entries) = std::fs::read_dir(step_root) else {
        return Vec::new();
    };

    let mut artifacts = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        artifacts.push(ArtifactFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            full_path: path,
            size_bytes: meta.len(),
            last_write_time_utc: modified,
        });
    }
    artifacts.sort_by(|a, b| a.name.cmp(&b.name));
    artifacts
}
