pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod influx;
pub mod report;
pub mod sensorpush;

#[cfg(test)]
pub mod test_support;
