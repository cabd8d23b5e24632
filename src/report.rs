use crate::sensorpush::{Sample, Sensor};
use serde_json::Value as JsonValue;
use std::fmt::Write;

pub fn sensor_table(sensors: &[Sensor]) -> String {
    let mut sorted: Vec<&Sensor> = sensors.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = format!("{:<20} {:>10} {:>10}\n", "name", "rssi", "battery");
    for sensor in sorted {
        let _ = writeln!(
            out,
            "{:<20} {:>10} {:>10}",
            sensor.name,
            optional_reading(sensor.rssi),
            optional_reading(sensor.battery_voltage)
        );
    }
    out
}

/// Rows sorted by sensor name, then observation time.
pub fn sample_table(samples: &[Sample<'_>]) -> String {
    let mut sorted: Vec<&Sample<'_>> = samples.iter().collect();
    sorted.sort_by(|a, b| {
        a.sensor
            .name
            .cmp(&b.sensor.name)
            .then_with(|| a.observed.cmp(&b.observed))
    });

    let mut out = format!("{:<20} {:<20} {:<10} {:<10}\n", "sensor", "time", "temp", "hum");
    for sample in sorted {
        let _ = writeln!(
            out,
            "{:<20} {:<20} {:<10} {:<10}",
            sample.sensor.name,
            sample.observed.format("%H:%M:%S").to_string(),
            sample.temperature,
            sample.humidity
        );
    }
    out
}

pub fn gateway_listing(gateways: &JsonValue) -> String {
    serde_json::to_string_pretty(gateways).unwrap_or_else(|_| gateways.to_string())
}

fn optional_reading(value: Option<f64>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}
