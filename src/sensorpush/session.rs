use crate::error::{AgentError, AgentResult};
use crate::sensorpush::mapper::{parse_samples, parse_sensors};
use crate::sensorpush::types::{
    AccessTokenResponse, AuthorizeResponse, Credentials, Sample, Sensor,
};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.sensorpush.com/api/v1";
pub const DEFAULT_USER_AGENT: &str = concat!("sensorpush-agent/", env!("CARGO_PKG_VERSION"));

const AUTHORIZE_PATH: &str = "/oauth/authorize";
const ACCESS_TOKEN_PATH: &str = "/oauth/accesstoken";
const GATEWAYS_PATH: &str = "/devices/gateways";
const SENSORS_PATH: &str = "/devices/sensors";
const SAMPLES_PATH: &str = "/samples";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub sample_limit: Option<u32>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            sample_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Authorized,
    TokenReady,
    Failed,
}

enum SessionState {
    Unauthenticated,
    Authorized {
        authorization: String,
        api_key: String,
    },
    TokenReady {
        authorization: String,
        api_key: String,
        access_token: String,
    },
    Failed,
}

/// Authenticated SensorPush API session.
///
/// Moves `Unauthenticated -> Authorized -> TokenReady`. Any failure during the exchange
/// leaves the session `Failed` for good; build a new one to try again. Expired tokens
/// are not renewed: a `401` from [`SensorPushSession::request`] is returned as-is.
pub struct SensorPushSession {
    http: Client,
    base_url: String,
    user_agent: String,
    sample_limit: Option<u32>,
    state: SessionState,
}

impl SensorPushSession {
    pub fn new(settings: &SessionSettings) -> AgentResult<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|source| AgentError::Transport {
                path: settings.base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim().trim_end_matches('/').to_string(),
            user_agent: settings.user_agent.clone(),
            sample_limit: settings.sample_limit,
            state: SessionState::Unauthenticated,
        })
    }

    /// Build a session and run the full credential exchange.
    pub fn connect(settings: &SessionSettings, credentials: &Credentials) -> AgentResult<Self> {
        let mut session = Self::new(settings)?;
        let authorization = session.authorize(credentials)?;
        session.refresh_token(&authorization)?;
        Ok(session)
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            SessionState::Unauthenticated => SessionPhase::Unauthenticated,
            SessionState::Authorized { .. } => SessionPhase::Authorized,
            SessionState::TokenReady { .. } => SessionPhase::TokenReady,
            SessionState::Failed => SessionPhase::Failed,
        }
    }

    /// Secondary key issued alongside the authorization code. Nothing reads it yet.
    pub fn api_key(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authorized { api_key, .. } | SessionState::TokenReady { api_key, .. } => {
                Some(api_key.as_str())
            }
            _ => None,
        }
    }

    pub fn authorization_code(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authorized { authorization, .. }
            | SessionState::TokenReady { authorization, .. } => Some(authorization.as_str()),
            _ => None,
        }
    }

    pub fn authorize(&mut self, credentials: &Credentials) -> AgentResult<String> {
        if !matches!(self.state, SessionState::Unauthenticated) {
            return Err(AgentError::Auth(format!(
                "authorize called in {:?} phase",
                self.phase()
            )));
        }

        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        match self.exchange::<AuthorizeResponse>(AUTHORIZE_PATH, &body) {
            Ok(response) => {
                tracing::info!(email = %credentials.email, "sensorpush authorization granted");
                self.state = SessionState::Authorized {
                    authorization: response.authorization.clone(),
                    api_key: response.apikey,
                };
                Ok(response.authorization)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    pub fn refresh_token(&mut self, authorization: &str) -> AgentResult<String> {
        let api_key = match &self.state {
            SessionState::Authorized { api_key, .. } => api_key.clone(),
            _ => {
                return Err(AgentError::Auth(format!(
                    "access token requested in {:?} phase",
                    self.phase()
                )))
            }
        };

        let body = json!({ "authorization": authorization });
        match self.exchange::<AccessTokenResponse>(ACCESS_TOKEN_PATH, &body) {
            Ok(response) => {
                tracing::debug!("sensorpush access token issued");
                self.state = SessionState::TokenReady {
                    authorization: authorization.to_string(),
                    api_key,
                    access_token: response.accesstoken.clone(),
                };
                Ok(response.accesstoken)
            }
            Err(err) => {
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    /// Authorized call against `base_url + path`; returns the decoded JSON body.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> AgentResult<JsonValue> {
        if !matches!(self.state, SessionState::TokenReady { .. }) {
            return Err(AgentError::Auth(format!(
                "request to {path} in {:?} phase",
                self.phase()
            )));
        }

        let response = self
            .send(method, path, body)
            .map_err(|source| AgentError::Transport {
                path: path.to_string(),
                source,
            })?;
        let status = response.status();
        let text = response.text().map_err(|source| AgentError::Transport {
            path: path.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(AgentError::Http {
                path: path.to_string(),
                status,
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }

        serde_json::from_str(&text)
            .map_err(|err| AgentError::MalformedData(format!("{path} returned invalid JSON: {err}")))
    }

    pub fn fetch_gateways(&self) -> AgentResult<JsonValue> {
        self.request(Method::POST, GATEWAYS_PATH, Some(&json!({})))
    }

    pub fn fetch_sensors(&self) -> AgentResult<Vec<Sensor>> {
        let raw = self.request(Method::POST, SENSORS_PATH, Some(&json!({})))?;
        parse_sensors(&raw)
    }

    pub fn fetch_samples_raw(&self) -> AgentResult<JsonValue> {
        let body = match self.sample_limit {
            Some(limit) => json!({ "limit": limit }),
            None => json!({}),
        };
        self.request(Method::POST, SAMPLES_PATH, Some(&body))
    }

    pub fn fetch_samples<'a>(&self, sensors: &'a [Sensor]) -> AgentResult<Vec<Sample<'a>>> {
        let raw = self.fetch_samples_raw()?;
        parse_samples(&raw, sensors)
    }

    fn access_token(&self) -> Option<&str> {
        match &self.state {
            SessionState::TokenReady { access_token, .. } => Some(access_token.as_str()),
            _ => None,
        }
    }

    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> Result<Response, reqwest::Error> {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.access_token() {
            request = request.header(AUTHORIZATION, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send()
    }

    /// One hop of the credential exchange. Every failure is an authentication failure.
    fn exchange<T: DeserializeOwned>(&self, path: &str, body: &JsonValue) -> AgentResult<T> {
        let response = self
            .send(Method::POST, path, Some(body))
            .map_err(|err| AgentError::Auth(format!("{path} unreachable: {err}")))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| AgentError::Auth(format!("{path} response unreadable: {err}")))?;
        if !status.is_success() {
            return Err(AgentError::Auth(format!("{path} returned {status}: {text}")));
        }
        serde_json::from_str(&text)
            .map_err(|err| AgentError::Auth(format!("{path} returned unexpected body: {err}")))
    }
}
