//! Walkthrough binary: find an HP 8563E, configure it, print readings, plot
//! the trace.
//!
//! ```bash
//! # Real instrument on GPIB
//! cargo run --features instrument_visa --bin spec_an_demo
//!
//! # Simulated analyzer, no window
//! cargo run --bin spec_an_demo -- --simulate --no-plot
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use spec_an::adapters::{InstrumentBus, SimulatedBus, VisaBus};
use spec_an::config::{SpecAnConfig, DEFAULT_CONFIG_PATH};
use spec_an::gui::{self, TracePlotOptions};
use spec_an::walkthrough;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Extra `--help` text on how this binary reaches hardware.
const HARDWARE_NOTE: &str = if cfg!(feature = "instrument_visa") {
    "Talks to the analyzer through VISA unless --simulate is given."
} else {
    "Built without VISA: real hardware needs a rebuild with --features instrument_visa. \
     Use --simulate to run against the simulated analyzer."
};

#[derive(Parser, Debug)]
#[command(
    name = "spec_an_demo",
    about = "HP 8563E spectrum analyzer walkthrough",
    after_help = HARDWARE_NOTE
)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the simulated analyzer instead of VISA
    #[arg(long)]
    simulate: bool,

    /// Skip the trace viewer
    #[arg(long)]
    no_plot: bool,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SpecAnConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    init_tracing(&config.application.log_level);

    tracing::info!("Starting {}", config.application.name);

    let bus: Box<dyn InstrumentBus> = if cli.simulate || config.simulation.enabled {
        Box::new(SimulatedBus::new().with_analyzer(&config.simulation))
    } else {
        if !cfg!(feature = "instrument_visa") {
            tracing::warn!("{}", HARDWARE_NOTE);
        }
        Box::new(VisaBus::from_config(&config.instrument))
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start Tokio runtime")?;

    let mut stdout = std::io::stdout();
    let report = runtime.block_on(walkthrough::discover_and_run(
        bus.as_ref(),
        &config,
        &mut stdout,
    ))?;

    let Some(report) = report else {
        return Ok(());
    };

    if cli.no_plot {
        return Ok(());
    }

    gui::show_trace(report.trace, TracePlotOptions::from(&config.plot))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_help_explains_hardware_access() {
        let help = Cli::command().render_help().to_string();
        if cfg!(feature = "instrument_visa") {
            assert!(help.contains("VISA"));
        } else {
            assert!(help.contains("--features instrument_visa"));
            assert!(help.contains("--simulate"));
        }
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from(["spec_an_demo", "--simulate", "--no-plot"]).unwrap();
        assert!(cli.simulate);
        assert!(cli.no_plot);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }
}
