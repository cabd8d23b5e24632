//! InfluxDB v2 sink: one tagged float field per synchronous write.
//!
//! Points are encoded as line protocol:
//! ```text
//! measurement,tag1=val1,tag2=val2 field=value timestamp_ns
//! ```

use crate::error::{AgentError, AgentResult};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_INFLUX_URL: &str = "https://eastus-1.azure.cloud2.influxdata.com";

#[derive(Clone)]
pub struct InfluxSettings {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
    pub timeout: Duration,
}

impl fmt::Debug for InfluxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxSettings")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A single observation as stored in InfluxDB.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub field_name: String,
    pub field_value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    pub fn new<Tz: TimeZone>(
        measurement: impl Into<String>,
        field_name: impl Into<String>,
        field_value: f64,
        timestamp: &DateTime<Tz>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            field_name: field_name.into(),
            field_value,
            timestamp: timestamp.with_timezone(&Utc),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Encode as one line protocol record with a nanosecond timestamp.
    ///
    /// Tags come out sorted by key. Tags with an empty value are left out since
    /// InfluxDB rejects them.
    pub fn to_line_protocol(&self) -> AgentResult<String> {
        if self.measurement.is_empty() || self.field_name.is_empty() {
            return Err(AgentError::SinkWrite(
                "measurement and field name must not be empty".to_string(),
            ));
        }
        if !self.field_value.is_finite() {
            return Err(AgentError::SinkWrite(format!(
                "field {} has non-finite value {}",
                self.field_name, self.field_value
            )));
        }
        let timestamp_ns = self.timestamp.timestamp_nanos_opt().ok_or_else(|| {
            AgentError::SinkWrite(format!(
                "timestamp {} is outside the nanosecond range",
                self.timestamp.to_rfc3339()
            ))
        })?;

        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }
        line.push(' ');
        line.push_str(&escape_key(&self.field_name));
        line.push('=');
        line.push_str(&self.field_value.to_string());
        line.push(' ');
        line.push_str(&timestamp_ns.to_string());
        Ok(line)
    }
}

/// Backslash goes first so the escapes added after it are not doubled.
fn escape_control(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn escape_measurement(value: &str) -> String {
    escape_control(value).replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys share the same escaping rules.
fn escape_key(value: &str) -> String {
    escape_control(value)
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

pub struct InfluxClient {
    http: Client,
    write_url: Url,
    token: String,
}

impl InfluxClient {
    pub fn new(settings: &InfluxSettings) -> AgentResult<Self> {
        let base = settings.url.trim().trim_end_matches('/');
        let write_url = Url::parse_with_params(
            &format!("{base}/api/v2/write"),
            &[
                ("org", settings.org.as_str()),
                ("bucket", settings.bucket.as_str()),
                ("precision", "ns"),
            ],
        )
        .map_err(|err| AgentError::SinkWrite(format!("invalid influxdb url {base:?}: {err}")))?;

        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| AgentError::SinkWrite(format!("http client setup failed: {err}")))?;

        Ok(Self {
            http,
            write_url,
            token: settings.token.clone(),
        })
    }

    /// Write one field of one measurement, tagged and timestamped.
    pub fn write<Tz: TimeZone>(
        &self,
        measurement: &str,
        tags: &BTreeMap<String, String>,
        field_name: &str,
        field_value: f64,
        timestamp: &DateTime<Tz>,
    ) -> AgentResult<()> {
        let mut point = MetricPoint::new(measurement, field_name, field_value, timestamp);
        point.tags = tags.clone();
        self.write_point(&point)
    }

    pub fn write_point(&self, point: &MetricPoint) -> AgentResult<()> {
        let line = point.to_line_protocol()?;

        let response = self
            .http
            .post(self.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(ACCEPT, "application/json")
            .body(line)
            .send()
            .map_err(|err| AgentError::SinkWrite(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(AgentError::SinkWrite(format!("server returned {status}: {text}")));
        }

        tracing::debug!(
            measurement = %point.measurement,
            field = %point.field_name,
            "point written"
        );
        Ok(())
    }
}
