use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sensorpush-agent",
    version,
    about = "Copy SensorPush readings into InfluxDB"
)]
pub struct Cli {
    /// Secrets YAML with `sensorpush` and `influxdb` sections.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Fetch and print readings without writing to InfluxDB.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
