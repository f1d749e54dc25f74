//! Typed request bodies.
//!
//! Each body-bearing operation decodes its bound fields into one of these
//! structs and re-encodes it with serde_json, so field values never reach
//! the wire unescaped.
use serde::{Deserialize, Serialize};

/// `POST /chaincodes` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstallBody {
    pub chaincode_id: String,
    pub chaincode_path: String,
    /// Base64 archive; omitted when the server installs from its own path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaincode_package: Option<String>,
    pub chaincode_version: String,
}

/// Channel create/update body carrying a base64 config envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnvelopeBody {
    pub envelope: String,
}

/// Chaincode instantiate/upgrade body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChaincodeBody {
    pub chaincode_id: String,
    pub chaincode_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

/// Connection options for a peer joining a channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PeerOpts {
    /// PEM certificate with newlines stripped.
    pub pem: String,
    #[serde(
        rename = "ssl-target-name-override",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ssl_target_name_override: Option<String>,
}

/// `POST /channels/{channel}/peers` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PeerDescriptor {
    pub url: String,
    pub opts: PeerOpts,
}
