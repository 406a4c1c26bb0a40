pub mod doctor;
pub mod run;

use anyhow::{bail, Result};

use crate::engine::process::{ProcessEngine, ENGINE_ENV_VAR};

/// Resolve the engine command from the CLI flag or the environment.
pub(crate) fn resolve_engine(engine_cmd: Option<&str>) -> Result<ProcessEngine> {
    if let Some(cmd) = engine_cmd {
        return Ok(ProcessEngine::new(cmd));
    }
    match ProcessEngine::from_env() {
        Some(engine) => Ok(engine),
        None => bail!("No engine configured. Pass --engine <command> or set {ENGINE_ENV_VAR}."),
    }
}
