use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::fmt;

/// Account credentials for the SensorPush exchange endpoint.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: String,
    pub device_id: String,
    pub name: String,
    pub rssi: Option<f64>,
    pub battery_voltage: Option<f64>,
}

/// One reading. Borrows its sensor from the list fetched for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<'a> {
    pub sensor: &'a Sensor,
    pub observed: DateTime<FixedOffset>,
    pub temperature: f64,
    pub humidity: f64,
}

#[derive(Deserialize)]
pub(in crate::sensorpush) struct RawSensor {
    pub(in crate::sensorpush) id: String,
    #[serde(rename = "deviceId")]
    pub(in crate::sensorpush) device_id: String,
    pub(in crate::sensorpush) name: String,
    #[serde(default)]
    pub(in crate::sensorpush) rssi: Option<f64>,
    #[serde(default)]
    pub(in crate::sensorpush) battery_voltage: Option<f64>,
}

#[derive(Deserialize)]
pub(in crate::sensorpush) struct RawSample {
    pub(in crate::sensorpush) observed: String,
    pub(in crate::sensorpush) temperature: f64,
    pub(in crate::sensorpush) humidity: f64,
}

#[derive(Deserialize)]
pub(in crate::sensorpush) struct AuthorizeResponse {
    pub(in crate::sensorpush) authorization: String,
    pub(in crate::sensorpush) apikey: String,
}

#[derive(Deserialize)]
pub(in crate::sensorpush) struct AccessTokenResponse {
    pub(in crate::sensorpush) accesstoken: String,
}
