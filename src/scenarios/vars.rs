//! `${name}` substitution for step parameters.
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
    #[error("unknown variable ${{{0}}}")]
    Unknown(String),
    #[error("unterminated variable reference in {0:?}")]
    Unterminated(String),
}

/// Names referenced by `text`, in order of appearance.
pub fn referenced_vars(text: &str) -> Result<Vec<String>, VarError> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| VarError::Unterminated(text.to_string()))?;
        names.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    Ok(names)
}

/// Replace every `${name}` in `text`.
pub fn substitute(text: &str, vars: &BTreeMap<String, String>) -> Result<String, VarError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| VarError::Unterminated(text.to_string()))?;
        let name = &after[..end];
        let value = vars
            .get(name)
            .ok_or_else(|| VarError::Unknown(name.to_string()))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Substitute inside every string leaf of a JSON value. Keys are left alone.
pub fn substitute_value(value: &Value, vars: &BTreeMap<String, String>) -> Result<Value, VarError> {
    Ok(match value {
        Value::String(text) => Value::String(substitute(text, vars)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_value(item, vars))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), substitute_value(item, vars)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

/// Every variable referenced by string leaves of a JSON value.
pub fn referenced_value_vars(value: &Value) -> Result<Vec<String>, VarError> {
    let mut names = Vec::new();
    match value {
        Value::String(text) => names.extend(referenced_vars(text)?),
        Value::Array(items) => {
            for item in items {
                names.extend(referenced_value_vars(item)?);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                names.extend(referenced_value_vars(item)?);
            }
        }
        _ => {}
    }
    Ok(names)
}
