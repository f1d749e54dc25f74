//! Artifact resolution for step bodies.
//!
//! Channel configs, peer certificates and chaincode archives are read from
//! disk and spliced into request bodies as JSON strings. Their contents are
//! never interpreted.
use super::{ArtifactEncoding, ArtifactRef, ArtifactRoot};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories artifact references are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRoots {
    pub samples: PathBuf,
    pub inputs: PathBuf,
}

impl ArtifactRoots {
    pub fn new(samples: impl Into<PathBuf>, inputs: impl Into<PathBuf>) -> Self {
        Self {
            samples: samples.into(),
            inputs: inputs.into(),
        }
    }

    pub fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        let root = match artifact.root {
            ArtifactRoot::Samples => &self.samples,
            ArtifactRoot::Inputs => &self.inputs,
        };
        root.join(&artifact.path)
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {path} is not UTF-8 text")]
    NotText { path: PathBuf },
    #[error("cannot place artifact at {pointer}: {detail}")]
    Placement { pointer: String, detail: String },
}

/// Read an artifact and encode it as a JSON string value.
pub fn load_artifact(roots: &ArtifactRoots, artifact: &ArtifactRef) -> Result<String, ArtifactError> {
    let path = roots.path_for(artifact);
    let bytes = fs::read(&path).map_err(|source| ArtifactError::Read {
        path: path.clone(),
        source,
    })?;
    match artifact.encoding {
        ArtifactEncoding::Base64 => Ok(STANDARD.encode(bytes)),
        ArtifactEncoding::PemSingleLine => {
            let text = String::from_utf8(bytes).map_err(|_| ArtifactError::NotText {
                path: path.clone(),
            })?;
            Ok(text.replace(['\r', '\n'], ""))
        }
    }
}

/// Write `value` into `body` at a JSON pointer, creating objects on the way.
pub fn place_at_pointer(body: &mut Value, pointer: &str, value: Value) -> Result<(), ArtifactError> {
    let placement = |detail: &str| ArtifactError::Placement {
        pointer: pointer.to_string(),
        detail: detail.to_string(),
    };
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(placement("pointer must start with '/'"));
    };
    let tokens: Vec<String> = rest.split('/').map(unescape_token).collect();
    let Some((last, parents)) = tokens.split_last() else {
        return Err(placement("empty pointer"));
    };
    let mut current = body;
    for token in parents {
        let object = as_object(current).ok_or_else(|| placement("parent is not an object"))?;
        current = object
            .entry(token.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let object = as_object(current).ok_or_else(|| placement("parent is not an object"))?;
    object.insert(last.clone(), value);
    Ok(())
}

fn as_object(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Resolve every artifact of a step into its body.
pub fn splice_artifacts<'a>(
    roots: &ArtifactRoots,
    body: Option<Value>,
    artifacts: impl IntoIterator<Item = (&'a String, &'a ArtifactRef)>,
) -> Result<Option<Value>, ArtifactError> {
    let mut body = body;
    for (pointer, artifact) in artifacts {
        let encoded = load_artifact(roots, artifact)?;
        let target = body.get_or_insert_with(|| Value::Object(Map::new()));
        place_at_pointer(target, pointer, Value::String(encoded))?;
    }
    Ok(body)
}

pub(crate) fn is_relative_artifact_path(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && !path.is_absolute()
        && !path
            .components()
            .any(|component| matches!(component, std::path::Component::ParentDir))
}
