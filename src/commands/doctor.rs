//! `runwatch doctor` - render the engine's environment checks.

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::engine::ExecutionEngine;

pub fn execute(engine_cmd: Option<&str>) -> Result<()> {
    let engine = super::resolve_engine(engine_cmd)?;
    let checks = engine
        .doctor()
        .context("Failed to run engine environment checks")?;

    if checks.is_empty() {
        println!("{}", "Engine reported no checks.".yellow());
        return Ok(());
    }

    let mut failed = 0usize;
    for check in &checks {
        let glyph = if check.ok {
            "✓".green()
        } else {
            failed += 1;
            "✗".red()
        };
        println!("{glyph} {} {}", check.name.bold(), check.details.dimmed());
    }

    if failed > 0 {
        bail!("{failed} of {} check(s) failed", checks.len());
    }
    println!("{}", format!("All {} check(s) passed.", checks.len()).green());
    Ok(())
}
