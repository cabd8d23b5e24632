use crate::influx::{InfluxSettings, DEFAULT_INFLUX_URL};
use crate::sensorpush::{Credentials, SessionSettings, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_SECRETS_PATH: &str = "secret.yaml";
const DEFAULT_MEASUREMENT: &str = "sensordata";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Layout of the secrets file:
///
/// ```yaml
/// sensorpush:
///   email: me@example.com
///   password: "..."
/// influxdb:
///   org: home
///   bucket: sensors
///   token: "..."
/// ```
#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    sensorpush: SensorPushSection,
    #[serde(default)]
    influxdb: InfluxSection,
    #[serde(default)]
    agent: AgentSection,
}

#[derive(Debug, Default, Deserialize)]
struct SensorPushSection {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
    #[serde(default)]
    sample_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct InfluxSection {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentSection {
    #[serde(default)]
    measurement: Option<String>,
    #[serde(default)]
    http_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub credentials: Credentials,
    pub sensorpush: SessionSettings,
    pub influxdb: InfluxSettings,
    pub measurement: String,
}

impl Config {
    /// Load the secrets file (explicit path, then `AGENT_SECRETS_PATH`, then
    /// `./secret.yaml` if present) and apply environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let secrets = match secrets_path(path) {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read secrets file {}", path.display()))?;
                tracing::debug!(path = %path.display(), "loaded secrets file");
                parse_secrets(&contents)
                    .with_context(|| format!("failed to parse secrets file {}", path.display()))?
            }
            None => {
                tracing::debug!("no secrets file found; using environment only");
                SecretsFile::default()
            }
        };

        Self::resolve(secrets, env_optional)
    }

    /// Build from YAML text alone, ignoring the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::resolve(parse_secrets(yaml)?, |_| None)
    }

    fn resolve(secrets: SecretsFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let SecretsFile {
            sensorpush,
            influxdb,
            agent,
        } = secrets;

        let email = required(&env, "SENSORPUSH_EMAIL", sensorpush.email, "sensorpush.email")?;
        let password = required(
            &env,
            "SENSORPUSH_PASSWORD",
            sensorpush.password,
            "sensorpush.password",
        )?;
        let base_url = optional(&env, "SENSORPUSH_BASE_URL", sensorpush.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        validate_url(&base_url, "sensorpush base url")?;
        let user_agent = optional(&env, "AGENT_USER_AGENT", sensorpush.user_agent)
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let sample_limit = match env("SENSORPUSH_SAMPLE_LIMIT") {
            Some(raw) => Some(
                raw.parse::<u32>()
                    .with_context(|| format!("invalid SENSORPUSH_SAMPLE_LIMIT {raw:?}"))?,
            ),
            None => sensorpush.sample_limit,
        }
        .filter(|limit| *limit != 0);

        let influx_url = optional(&env, "INFLUXDB_URL", influxdb.url)
            .unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string());
        validate_url(&influx_url, "influxdb url")?;
        let org = required(&env, "INFLUXDB_ORG", influxdb.org, "influxdb.org")?;
        let bucket = required(&env, "INFLUXDB_BUCKET", influxdb.bucket, "influxdb.bucket")?;
        let token = required(&env, "INFLUXDB_TOKEN", influxdb.token, "influxdb.token")?;

        let measurement = optional(&env, "AGENT_MEASUREMENT", agent.measurement)
            .unwrap_or_else(|| DEFAULT_MEASUREMENT.to_string());
        let timeout_secs = match env("AGENT_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid AGENT_HTTP_TIMEOUT_SECS {raw:?}"))?,
            None => agent.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            bail!("http timeout must be at least one second");
        }
        let timeout = Duration::from_secs(timeout_secs);

        Ok(Self {
            credentials: Credentials::new(email, password),
            sensorpush: SessionSettings {
                base_url,
                user_agent,
                timeout,
                sample_limit,
            },
            influxdb: InfluxSettings {
                url: influx_url,
                org,
                bucket,
                token,
                timeout,
            },
            measurement,
        })
    }
}

fn secrets_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_optional("AGENT_SECRETS_PATH") {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_SECRETS_PATH);
    default.exists().then_some(default)
}

fn parse_secrets(yaml: &str) -> Result<SecretsFile> {
    if yaml.trim().is_empty() {
        return Ok(SecretsFile::default());
    }
    serde_yaml::from_str(yaml).context("invalid secrets YAML")
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn optional(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    from_file: Option<String>,
) -> Option<String> {
    clean(env(key)).or_else(|| clean(from_file))
}

fn required(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    from_file: Option<String>,
    field: &str,
) -> Result<String> {
    optional(env, key, from_file)
        .ok_or_else(|| anyhow!("{field} is required (set it in the secrets file or {key})"))
}

fn validate_url(value: &str, label: &str) -> Result<()> {
    let url = Url::parse(value).with_context(|| format!("invalid {label} {value:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{label} must be http or https, got {value:?}");
    }
    Ok(())
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
