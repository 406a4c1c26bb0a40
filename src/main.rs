use anyhow::Result;
use clap::{Parser, Subcommand};
use runwatch::commands::{doctor, run};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runwatch")]
#[command(about = "Live plan-run monitoring engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan through the external engine and monitor it live
    Run {
        /// Path to the plan file
        plan_path: PathBuf,

        /// Engine run mode (e.g. WhatIf, Apply)
        #[arg(short, long, default_value = "WhatIf")]
        mode: String,

        /// Engine command (defaults to $RUNWATCH_ENGINE)
        #[arg(short, long)]
        engine: Option<String>,

        /// Step id whose live output should be printed
        #[arg(short, long)]
        step: Option<String>,
    },

    /// Run the engine's environment checks
    Doctor {
        /// Engine command (defaults to $RUNWATCH_ENGINE)
        #[arg(short, long)]
        engine: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            plan_path,
            mode,
            engine,
            step,
        } => run::execute(&plan_path, &mode, engine.as_deref(), step),
        Commands::Doctor { engine } => doctor::execute(engine.as_deref()),
    }
}
