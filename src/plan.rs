//! Best-effort inspection of plan documents.
//!
//! The plan is a JSON object with a `steps` array. Only the declared step
//! count is read here, to seed run progress; the plan is never validated or
//! executed by this crate.

use std::path::Path;

/// Count the declared steps in a plan document.
///
/// Best-effort: a missing file, unreadable content, or an unexpected shape
/// all yield 0, and progress display degrades gracefully instead of failing
/// the run.
pub fn count_plan_steps(plan_path: &Path) -> usize {
    let Ok(content) = std::fs::read_to_string(plan_path) else {
        return 0;
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        return 0;
    };
    value
        .get("steps")
        .and_then(|s| s.as_array())
        .map_or(0, Vec::len)
}
