//! Journal event model and line decoder.
//!
//! The execution engine writes an append-only `journal.jsonl`, one JSON
//! object per line, describing step lifecycle transitions. The decoder is
//! deliberately lenient: optional fields may be absent, required string
//! fields default to empty, and anything that is not a JSON object is
//! skipped so a half-written or corrupt line never stops the tail.

pub mod tailer;

use serde::{Deserialize, Serialize};

/// One decoded journal record. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub step_type: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub ts_utc: String,
}

/// Decode one journal line, or return `None` for lines that should be
/// skipped (blank, not JSON, wrong shape). Callers must continue with the
/// next line on `None`; a malformed line is a data-quality issue, not a
/// failure of the tail.
pub fn decode_line(line: &str) -> Option<StepEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
