//! Capability switch simulator.
//!
//! Runs named scenarios against two simulated modems and prints what each
//! one observed as JSON.

use std::path::PathBuf;

use anyhow::Context;
use capswitch_core::config::SwitchConfig;
use capswitch_sim::scenario::{self, ScenarioKind};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Capability switch scenario runner.
#[derive(Parser, Debug)]
#[command(name = "capswitch-sim", about = "Run capability switch scenarios on simulated modems")]
struct Cli {
    /// Scenario to run.
    #[arg(value_enum, default_value = "happy")]
    scenario: ScenarioKind,

    /// Run every scenario in turn.
    #[arg(long, default_value_t = false)]
    all: bool,

    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SwitchConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SwitchConfig::default(),
    };

    let kinds = if cli.all {
        ScenarioKind::value_variants().to_vec()
    } else {
        vec![cli.scenario]
    };

    for kind in kinds {
        let report = scenario::run(kind, config.clone())?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
