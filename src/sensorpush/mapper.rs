use crate::error::{AgentError, AgentResult};
use crate::sensorpush::types::{RawSample, RawSensor, Sample, Sensor};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Decode the `/devices/sensors` payload, an object keyed by sensor id.
pub fn parse_sensors(raw: &JsonValue) -> AgentResult<Vec<Sensor>> {
    let entries = raw.as_object().ok_or_else(|| {
        AgentError::MalformedData("sensor listing is not a JSON object".to_string())
    })?;

    entries
        .iter()
        .map(|(key, value)| {
            let sensor = RawSensor::deserialize(value)
                .map_err(|err| AgentError::MalformedData(format!("sensor {key:?}: {err}")))?;
            Ok(Sensor {
                id: sensor.id,
                device_id: sensor.device_id,
                name: sensor.name,
                rssi: sensor.rssi,
                battery_voltage: sensor.battery_voltage,
            })
        })
        .collect()
}

/// Decode the `/samples` payload and attach every reading to its sensor.
///
/// Fails on the first sample list whose key is not in `known_sensors`; no samples are
/// returned in that case. Output order follows the payload's key order and carries no
/// meaning.
pub fn parse_samples<'a>(
    raw: &JsonValue,
    known_sensors: &'a [Sensor],
) -> AgentResult<Vec<Sample<'a>>> {
    let by_sensor = raw
        .get("sensors")
        .and_then(JsonValue::as_object)
        .ok_or_else(|| {
            AgentError::MalformedData("samples payload has no \"sensors\" object".to_string())
        })?;

    let index: HashMap<&str, &'a Sensor> = known_sensors
        .iter()
        .map(|sensor| (sensor.id.as_str(), sensor))
        .collect();

    let mut samples = Vec::new();
    for (sensor_id, entries) in by_sensor {
        let sensor = index
            .get(sensor_id.as_str())
            .copied()
            .ok_or_else(|| AgentError::SensorNotFound(sensor_id.clone()))?;

        let entries = entries.as_array().ok_or_else(|| {
            AgentError::MalformedData(format!("samples for sensor {sensor_id:?} are not a list"))
        })?;

        for (position, entry) in entries.iter().enumerate() {
            let raw_sample = RawSample::deserialize(entry).map_err(|err| {
                AgentError::MalformedData(format!(
                    "sample {position} of sensor {sensor_id:?}: {err}"
                ))
            })?;
            let observed = parse_observed(&raw_sample.observed).map_err(|err| {
                AgentError::MalformedData(format!(
                    "sample {position} of sensor {sensor_id:?}: bad timestamp {:?}: {err}",
                    raw_sample.observed
                ))
            })?;
            samples.push(Sample {
                sensor,
                observed,
                temperature: raw_sample.temperature,
                humidity: raw_sample.humidity,
            });
        }
    }

    Ok(samples)
}

/// ISO-8601 with an explicit offset; a trailing `Z` means `+00:00`.
pub fn parse_observed(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let trimmed = value.trim();
    match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(stripped) => DateTime::parse_from_rfc3339(&format!("{stripped}+00:00")),
        None => DateTime::parse_from_rfc3339(trimmed),
    }
}
