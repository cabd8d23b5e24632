//! SensorPush cloud API: credential exchange, authorized requests and payload mapping.

pub mod mapper;
mod session;
mod types;

pub use mapper::{parse_observed, parse_samples, parse_sensors};
pub use session::{
    SensorPushSession, SessionPhase, SessionSettings, DEFAULT_BASE_URL, DEFAULT_USER_AGENT,
};
pub use types::{Credentials, Sample, Sensor};
