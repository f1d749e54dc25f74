//! Response expectations.
//!
//! Checks only classify a response; they never touch run state, so the same
//! stored response always gets the same verdict.
use crate::api::Response;
use crate::scenarios::Expectation;
use regex::Regex;
use serde_json::Value;

const ERROR_STATUS_POINTER: &str = "/error/statusCode";

/// Result of applying one expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Apply one expectation to a response.
pub fn check(expectation: &Expectation, response: &Response) -> Verdict {
    match expectation {
        Expectation::Equals { path, value } => match lookup(response, path) {
            Some(actual) if actual == value => Verdict::Accepted,
            Some(actual) => Verdict::Rejected(format!(
                "expected {path} = {}, observed {}",
                compact(value),
                compact(actual)
            )),
            None => Verdict::Rejected(format!(
                "expected {path} = {}, field missing",
                compact(value)
            )),
        },
        Expectation::Present { path } => match lookup(response, path) {
            Some(_) => Verdict::Accepted,
            None => Verdict::Rejected(format!("expected {path} to be present")),
        },
        Expectation::ErrorStatus { status } => match lookup(response, ERROR_STATUS_POINTER) {
            Some(actual) if actual.as_u64() == Some(u64::from(*status)) => Verdict::Accepted,
            Some(actual) => Verdict::Rejected(format!(
                "expected error status {status}, observed {}",
                compact(actual)
            )),
            None => Verdict::Rejected(format!(
                "expected error status {status}, response has no {ERROR_STATUS_POINTER}"
            )),
        },
        Expectation::HttpStatus { status } => {
            if response.status == *status {
                Verdict::Accepted
            } else {
                Verdict::Rejected(format!(
                    "expected HTTP status {status}, observed {}",
                    response.status
                ))
            }
        }
        Expectation::Matches { path, pattern } => {
            let re = match Regex::new(pattern) {
                Ok(re) => re,
                Err(err) => return Verdict::Rejected(format!("invalid regex {pattern:?}: {err}")),
            };
            match lookup(response, path).and_then(Value::as_str) {
                Some(text) if re.is_match(text) => Verdict::Accepted,
                Some(text) => Verdict::Rejected(format!(
                    "expected {path} to match {pattern:?}, observed {text:?}"
                )),
                None => Verdict::Rejected(format!("expected string at {path}")),
            }
        }
    }
}

/// Apply every expectation and collect the rejection reasons.
pub fn check_all(expectations: &[Expectation], response: &Response) -> Vec<String> {
    expectations
        .iter()
        .filter_map(|expectation| match check(expectation, response) {
            Verdict::Accepted => None,
            Verdict::Rejected(reason) => Some(reason),
        })
        .collect()
}

fn lookup<'a>(response: &'a Response, path: &str) -> Option<&'a Value> {
    if !response.decoded {
        return None;
    }
    response.body.pointer(path)
}

fn compact(value: &Value) -> String {
    const MAX_CHARS: usize = 200;
    let text = value.to_string();
    if text.chars().count() <= MAX_CHARS {
        return text;
    }
    let truncated: String = text.chars().take(MAX_CHARS).collect();
    format!("{truncated}...")
}
