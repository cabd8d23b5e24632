use anyhow::Result;
use clap::Parser;
use sensorpush_agent::agent::{self, RunOptions};
use sensorpush_agent::cli::Cli;
use sensorpush_agent::config::Config;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sensorpush_agent=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let config = Config::load(cli.config.as_deref())?;
    let summary = agent::run(
        &config,
        RunOptions {
            dry_run: cli.dry_run,
        },
    )?;
    tracing::info!(
        sensors = summary.sensors,
        samples = summary.samples,
        points = summary.points_written,
        "run complete"
    );
    Ok(())
}
