//! Request construction from catalog operations.
//!
//! Construction is pure: a descriptor plus caller bindings either yields a
//! [`Request`] or a [`RequestError`] before anything touches the network.
use super::body::{ChaincodeBody, EnvelopeBody, InstallBody, PeerDescriptor};
use super::{BodyKind, Operation, OperationId, Verb};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use url::form_urlencoded;

/// Values bound by a caller for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    pub path: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, name: &str, value: &str) -> Self {
        self.path.insert(name.to_string(), value.to_string());
        self
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A concrete, ready-to-send invocation of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub operation: OperationId,
    pub verb: Verb,
    /// Path relative to the API root with placeholders substituted.
    pub path: String,
    /// Present query parameters in the operation's declared order.
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    /// Encoded query string without the leading `?`.
    pub fn query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.query {
            serializer.append_pair(name, value);
        }
        serializer.finish()
    }

    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        format!("{}?{}", self.path, self.query_string())
    }
}

/// Scenario-definition errors raised while building a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{operation}: malformed parameters: {detail}")]
    MalformedParameters {
        operation: OperationId,
        detail: String,
    },
    #[error("{operation}: invalid body: {detail}")]
    InvalidBody {
        operation: OperationId,
        detail: String,
    },
}

impl RequestError {
    fn malformed(operation: &Operation, detail: impl Into<String>) -> Self {
        RequestError::MalformedParameters {
            operation: operation.id,
            detail: detail.into(),
        }
    }

    fn invalid_body(operation: &Operation, detail: impl Into<String>) -> Self {
        RequestError::InvalidBody {
            operation: operation.id,
            detail: detail.into(),
        }
    }
}

/// Build a request for `operation` from caller bindings.
pub fn build_request(operation: &Operation, bindings: &Bindings) -> Result<Request, RequestError> {
    let path = bind_path(operation, &bindings.path)?;
    let query = bind_query(operation, &bindings.query)?;
    let body = encode_body(operation, bindings.body.as_ref())?;
    Ok(Request {
        operation: operation.id,
        verb: operation.verb,
        path,
        query,
        body,
    })
}

/// Decode a query string back into its ordered pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

fn bind_path(
    operation: &Operation,
    values: &BTreeMap<String, String>,
) -> Result<String, RequestError> {
    let params = operation.path_params();
    for name in values.keys() {
        if !params.contains(&name.as_str()) {
            return Err(RequestError::malformed(
                operation,
                format!("unknown path parameter {name:?}"),
            ));
        }
    }
    let mut path = operation.path_template.to_string();
    for name in params {
        let value = values
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                RequestError::malformed(operation, format!("missing path parameter {name:?}"))
            })?;
        if !is_path_safe(value) {
            return Err(RequestError::malformed(
                operation,
                format!("path parameter {name:?} has reserved characters: {value:?}"),
            ));
        }
        path = path.replace(&format!("{{{name}}}"), value);
    }
    Ok(path)
}

fn is_path_safe(value: &str) -> bool {
    !value
        .chars()
        .any(|ch| matches!(ch, '/' | '?' | '#' | '%') || ch.is_whitespace() || ch.is_control())
}

fn bind_query(
    operation: &Operation,
    values: &BTreeMap<String, String>,
) -> Result<Vec<(String, String)>, RequestError> {
    for name in values.keys() {
        if !operation.query_params.contains(&name.as_str()) {
            return Err(RequestError::malformed(
                operation,
                format!("undeclared query parameter {name:?}"),
            ));
        }
    }
    Ok(operation
        .query_params
        .iter()
        .filter_map(|name| {
            values
                .get(*name)
                .map(|value| ((*name).to_string(), value.clone()))
        })
        .collect())
}

fn encode_body(operation: &Operation, body: Option<&Value>) -> Result<Option<Value>, RequestError> {
    match (operation.body, body) {
        (BodyKind::None, None) => Ok(None),
        (BodyKind::None, Some(_)) => Err(RequestError::invalid_body(
            operation,
            "operation does not accept a body",
        )),
        (BodyKind::Json, None) => Ok(None),
        (BodyKind::Json, Some(value)) => {
            if !value.is_object() {
                return Err(RequestError::invalid_body(
                    operation,
                    "body must be a JSON object",
                ));
            }
            Ok(Some(value.clone()))
        }
        (_, None) => Err(RequestError::invalid_body(operation, "body is required")),
        (BodyKind::Install, Some(value)) => typed::<InstallBody>(operation, value).map(Some),
        (BodyKind::Envelope, Some(value)) => typed::<EnvelopeBody>(operation, value).map(Some),
        (BodyKind::Chaincode, Some(value)) => typed::<ChaincodeBody>(operation, value).map(Some),
        (BodyKind::Peer, Some(value)) => typed::<PeerDescriptor>(operation, value).map(Some),
    }
}

fn typed<T: DeserializeOwned + Serialize>(
    operation: &Operation,
    value: &Value,
) -> Result<Value, RequestError> {
    let body: T = serde_json::from_value(value.clone())
        .map_err(|err| RequestError::invalid_body(operation, err.to_string()))?;
    serde_json::to_value(&body).map_err(|err| RequestError::invalid_body(operation, err.to_string()))
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
