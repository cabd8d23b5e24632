use crate::config::Config;
use crate::error::AgentResult;
use crate::influx::InfluxClient;
use crate::report;
use crate::sensorpush::{Sample, SensorPushSession};
use anyhow::{Context, Result};
use std::collections::BTreeMap;

const SENSOR_TAG: &str = "sensor";
const TEMPERATURE_FIELD: &str = "temperature";
const HUMIDITY_FIELD: &str = "humidity";

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub gateways: usize,
    pub sensors: usize,
    pub samples: usize,
    pub points_written: usize,
}

/// One collection pass: authenticate, pull gateways, sensors and samples, print them,
/// then write every sample's temperature and humidity to InfluxDB.
pub fn run(config: &Config, options: RunOptions) -> Result<RunSummary> {
    let sink = InfluxClient::new(&config.influxdb).context("failed to set up influxdb client")?;
    let session = SensorPushSession::connect(&config.sensorpush, &config.credentials)
        .context("failed to authenticate with sensorpush")?;

    let gateways = session
        .fetch_gateways()
        .context("failed to fetch sensorpush gateways")?;
    println!("{}", report::gateway_listing(&gateways));

    let sensors = session
        .fetch_sensors()
        .context("failed to fetch sensorpush sensors")?;
    print!("{}", report::sensor_table(&sensors));

    let samples = session
        .fetch_samples(&sensors)
        .context("failed to fetch sensorpush samples")?;
    print!("{}", report::sample_table(&samples));

    let mut summary = RunSummary {
        gateways: gateways.as_object().map_or(0, |entries| entries.len()),
        sensors: sensors.len(),
        samples: samples.len(),
        points_written: 0,
    };
    tracing::info!(
        gateways = summary.gateways,
        sensors = summary.sensors,
        samples = summary.samples,
        "sensorpush data fetched"
    );

    if options.dry_run {
        tracing::info!("dry run; skipping influxdb writes");
        return Ok(summary);
    }

    summary.points_written = forward_samples(&sink, &config.measurement, &samples)
        .context("failed to write samples to influxdb")?;
    tracing::info!(points = summary.points_written, "samples forwarded");
    Ok(summary)
}

/// Write temperature and humidity for every sample, tagged with the sensor name.
///
/// Stops at the first failed write; points written before it stay written.
pub fn forward_samples(
    sink: &InfluxClient,
    measurement: &str,
    samples: &[Sample<'_>],
) -> AgentResult<usize> {
    let mut written = 0;
    for sample in samples {
        let mut tags = BTreeMap::new();
        tags.insert(SENSOR_TAG.to_string(), sample.sensor.name.clone());

        sink.write(
            measurement,
            &tags,
            TEMPERATURE_FIELD,
            sample.temperature,
            &sample.observed,
        )?;
        written += 1;
        sink.write(
            measurement,
            &tags,
            HUMIDITY_FIELD,
            sample.humidity,
            &sample.observed,
        )?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::influx::InfluxSettings;
    use crate::sensorpush::{parse_observed, Credentials, Sensor, SessionSettings};
    use crate::test_support::{FakeServer, RecordedRequest, Reply};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn vendor_and_influx(request: &RecordedRequest) -> Reply {
        match request.path.as_str() {
            "/oauth/authorize" => Reply::json(json!({"authorization": "auth-code", "apikey": "k"})),
            "/oauth/accesstoken" => Reply::json(json!({"accesstoken": "token-1"})),
            "/devices/gateways" => Reply::json(json!({"Hub": {"name": "Hub"}})),
            "/devices/sensors" => Reply::json(json!({
                "A": {"id": "A", "deviceId": "dev-a", "name": "Kitchen", "rssi": -50, "battery_voltage": 2.9}
            })),
            "/samples" => Reply::json(json!({
                "sensors": {
                    "A": [{"observed": "2024-01-01T00:00:00Z", "temperature": 20.0, "humidity": 40.0}]
                }
            })),
            "/api/v2/write" => Reply::status(204, ""),
            _ => Reply::status(404, "not found"),
        }
    }

    fn config_for(server: &FakeServer) -> Config {
        let timeout = Duration::from_secs(5);
        Config {
            credentials: Credentials::new("ops@example.com", "hunter2"),
            sensorpush: SessionSettings {
                base_url: server.base_url(),
                user_agent: "agent-test".to_string(),
                timeout,
                sample_limit: None,
            },
            influxdb: InfluxSettings {
                url: server.base_url(),
                org: "home".to_string(),
                bucket: "sensors".to_string(),
                token: "influx-token".to_string(),
                timeout,
            },
            measurement: "sensordata".to_string(),
        }
    }

    fn writes(server: &FakeServer) -> Vec<String> {
        server
            .requests()
            .into_iter()
            .filter(|request| request.path == "/api/v2/write")
            .map(|request| request.body)
            .collect()
    }

    #[test]
    fn run_writes_temperature_and_humidity_per_sample() {
        let server = FakeServer::start(vendor_and_influx);

        let summary = run(&config_for(&server), RunOptions::default()).unwrap();

        assert_eq!(
            summary,
            RunSummary {
                gateways: 1,
                sensors: 1,
                samples: 1,
                points_written: 2,
            }
        );
        assert_eq!(
            writes(&server),
            vec![
                "sensordata,sensor=Kitchen temperature=20 1704067200000000000".to_string(),
                "sensordata,sensor=Kitchen humidity=40 1704067200000000000".to_string(),
            ]
        );
    }

    #[test]
    fn run_calls_vendor_endpoints_in_order() {
        let server = FakeServer::start(vendor_and_influx);

        run(&config_for(&server), RunOptions { dry_run: true }).unwrap();

        let paths: Vec<String> = server
            .requests()
            .into_iter()
            .map(|request| request.path)
            .collect();
        assert_eq!(
            paths,
            vec![
                "/oauth/authorize",
                "/oauth/accesstoken",
                "/devices/gateways",
                "/devices/sensors",
                "/samples",
            ]
        );
    }

    #[test]
    fn dry_run_skips_writes() {
        let server = FakeServer::start(vendor_and_influx);

        let summary = run(&config_for(&server), RunOptions { dry_run: true }).unwrap();

        assert_eq!(summary.samples, 1);
        assert_eq!(summary.points_written, 0);
        assert!(writes(&server).is_empty());
    }

    #[test]
    fn unknown_sensor_in_samples_aborts_before_writing() {
        let server = FakeServer::start(|request| match request.path.as_str() {
            "/samples" => Reply::json(json!({
                "sensors": {
                    "ghost": [{"observed": "2024-01-01T00:00:00Z", "temperature": 1.0, "humidity": 2.0}]
                }
            })),
            _ => vendor_and_influx(request),
        });

        let err = run(&config_for(&server), RunOptions::default()).unwrap_err();

        let cause = err.downcast_ref::<AgentError>().unwrap();
        assert!(matches!(cause, AgentError::SensorNotFound(id) if id == "ghost"));
        assert!(writes(&server).is_empty());
    }

    #[test]
    fn failed_login_aborts_the_run() {
        let server = FakeServer::start(|_| Reply::status(401, "invalid credentials"));

        let err = run(&config_for(&server), RunOptions::default()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::Auth(_))
        ));
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn forward_stops_at_first_rejected_write() {
        let calls = AtomicUsize::new(0);
        let server = FakeServer::start(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Reply::status(204, "")
            } else {
                Reply::status(500, "disk full")
            }
        });
        let sink = InfluxClient::new(&config_for(&server).influxdb).unwrap();
        let sensor = Sensor {
            id: "A".to_string(),
            device_id: "dev-a".to_string(),
            name: "Kitchen".to_string(),
            rssi: None,
            battery_voltage: None,
        };
        let samples = vec![
            Sample {
                sensor: &sensor,
                observed: parse_observed("2024-01-01T00:00:00Z").unwrap(),
                temperature: 20.0,
                humidity: 40.0,
            },
            Sample {
                sensor: &sensor,
                observed: parse_observed("2024-01-01T00:01:00Z").unwrap(),
                temperature: 21.0,
                humidity: 41.0,
            },
        ];

        let err = forward_samples(&sink, "sensordata", &samples).unwrap_err();

        assert!(matches!(err, AgentError::SinkWrite(ref msg) if msg.contains("disk full")));
        let bodies = writes(&server);
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].contains("temperature=20"));
        assert!(bodies[1].contains("humidity=40"));
    }
}
