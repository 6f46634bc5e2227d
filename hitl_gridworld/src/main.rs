//! Main entry point for the grid world CLI.

use anyhow::Result;
use clap::Parser;
use hitl_gridworld::{cli, commands, settings::Settings, telemetry};

fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::Cli::parse();

    // Load settings
    let settings = Settings::load_from(args.config.as_deref())?;

    // Initialize logging
    telemetry::init(&settings.logging)?;

    commands::execute(args.command, settings)
}
