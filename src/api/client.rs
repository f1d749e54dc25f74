//! HTTP endpoint client.
//!
//! One call, one round trip. Non-2xx statuses are returned as ordinary
//! responses because the server reports domain errors as structured JSON
//! (`{"error":{"statusCode":404}}`); only failures to obtain a JSON reply
//! become a [`TransportError`].
use super::{Request, Verb};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Decoded reply from the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    /// False when the server sent an empty body.
    pub decoded: bool,
}

impl Response {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            decoded: true,
        }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a request produced no usable reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Unreachable,
    Timeout,
    MalformedResponse,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Unreachable => "unreachable",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::MalformedResponse => "malformed response",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Executes requests against a server.
///
/// Implementations must not retry: a retry would hide the ordering the
/// sequencer is responsible for.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Basic-auth credential supplied by configuration.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn authorization_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Scheme, authority, and API root, without a trailing slash.
    pub base_url: String,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl HttpClientConfig {
    pub fn new(hostname: &str, port: u16, tls: bool, api_root: &str) -> Self {
        let scheme = if tls { "https" } else { "http" };
        let api_root = api_root.trim_end_matches('/');
        Self {
            base_url: format!("{scheme}://{hostname}:{port}{api_root}"),
            timeout: Duration::from_secs(30),
            credentials: None,
        }
    }
}

/// `ureq`-backed [`Transport`].
pub struct HttpClient {
    agent: ureq::Agent,
    base_url: String,
    authorization: Option<String>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(agent_config),
            base_url: config.base_url,
            authorization: config
                .credentials
                .as_ref()
                .map(Credentials::authorization_header),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_headers<B>(&self, builder: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let builder = builder.header("Accept", "application/json");
        match self.authorization.as_deref() {
            Some(value) => builder.header("Authorization", value),
            None => builder,
        }
    }
}

impl Transport for HttpClient {
    fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        let url = format!("{}{}", self.base_url, request.path_and_query());
        let body_text = request.body.as_ref().map(Value::to_string);
        tracing::debug!(verb = %request.verb, url = %url, "sending request");

        let sent = match request.verb {
            Verb::Get => self.with_headers(self.agent.get(&url)).call(),
            Verb::Post => send_with_body(self.with_headers(self.agent.post(&url)), body_text),
            Verb::Put => send_with_body(self.with_headers(self.agent.put(&url)), body_text),
        };
        let mut response = sent.map_err(classify_error)?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(classify_error)?;
        tracing::debug!(status, bytes = text.len(), "received response");
        decode_body(status, &text)
    }
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body_text: Option<String>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body_text {
        Some(text) => builder
            .header("Content-Type", "application/json")
            .send(text.as_bytes()),
        None => builder.send_empty(),
    }
}

fn classify_error(err: ureq::Error) -> TransportError {
    let kind = match &err {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::Io(io_err) if io_err.kind() == io::ErrorKind::TimedOut => {
            TransportErrorKind::Timeout
        }
        ureq::Error::Io(_) | ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportErrorKind::Unreachable
        }
        _ => TransportErrorKind::MalformedResponse,
    };
    TransportError::new(kind, err.to_string())
}

/// Decode a reply body; an empty body is a valid, undecoded reply.
pub(crate) fn decode_body(status: u16, text: &str) -> Result<Response, TransportError> {
    if text.trim().is_empty() {
        return Ok(Response {
            status,
            body: Value::Null,
            decoded: false,
        });
    }
    let body = serde_json::from_str(text).map_err(|err| {
        TransportError::new(
            TransportErrorKind::MalformedResponse,
            format!("status {status}: body is not JSON: {err}"),
        )
    })?;
    Ok(Response::json(status, body))
}
