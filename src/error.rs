use reqwest::StatusCode;

/// Failures surfaced by the SensorPush session, the payload mapper and the InfluxDB sink.
///
/// Every variant is fatal for the current run; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("sensorpush authentication failed: {0}")]
    Auth(String),

    #[error("malformed sensorpush payload: {0}")]
    MalformedData(String),

    #[error("sample references unknown sensor id {0:?}")]
    SensorNotFound(String),

    #[error("influxdb write failed: {0}")]
    SinkWrite(String),

    #[error("sensorpush {path} returned {status}: {body}")]
    Http {
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("sensorpush request to {path} failed")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

pub type AgentResult<T> = Result<T, AgentError>;
