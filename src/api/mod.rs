//! Fixed operation catalog for the Fabric REST management API.
//!
//! Every operation the harness can issue is described here once. Nothing
//! outside this catalog can be called: scenarios name an [`OperationId`] and
//! the builder refuses anything the descriptor does not declare.
use serde::{Deserialize, Serialize};
use std::fmt;

mod body;
mod client;
mod request;

pub use body::{ChaincodeBody, EnvelopeBody, InstallBody, PeerDescriptor, PeerOpts};
pub use client::{
    Credentials, HttpClient, HttpClientConfig, Response, Transport, TransportError,
    TransportErrorKind,
};
pub use request::{build_request, parse_query, Bindings, Request, RequestError};

/// Default mount point of the REST API on the server.
pub const DEFAULT_API_ROOT: &str = "/api/fabric/1_0";

/// HTTP verbs used by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
    Put,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body shape accepted by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    None,
    Install,
    Envelope,
    Chaincode,
    Peer,
    /// Arbitrary JSON object passed through as-is.
    Json,
}

/// Identifier of a catalog operation, as written in scenario plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationId {
    ListChannels,
    InstallChaincode,
    QueryInstalledChaincode,
    CreateChannel,
    InstantiateChaincode,
    QueryLedger,
    JoinChannel,
    CommitTransaction,
    ChannelInfo,
    UpdateChannel,
    QueryBlocks,
    QueryInstantiatedChaincodes,
    QueryChannelChaincode,
    UpgradeChaincode,
    SendProposal,
    QueryTransaction,
}

impl OperationId {
    pub const ALL: [OperationId; 16] = [
        OperationId::ListChannels,
        OperationId::InstallChaincode,
        OperationId::QueryInstalledChaincode,
        OperationId::CreateChannel,
        OperationId::InstantiateChaincode,
        OperationId::QueryLedger,
        OperationId::JoinChannel,
        OperationId::CommitTransaction,
        OperationId::ChannelInfo,
        OperationId::UpdateChannel,
        OperationId::QueryBlocks,
        OperationId::QueryInstantiatedChaincodes,
        OperationId::QueryChannelChaincode,
        OperationId::UpgradeChaincode,
        OperationId::SendProposal,
        OperationId::QueryTransaction,
    ];

    /// Descriptor for this operation.
    pub fn operation(self) -> &'static Operation {
        operation(self)
    }

    pub fn as_str(self) -> &'static str {
        self.operation().name
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable descriptor of one API capability.
#[derive(Debug)]
pub struct Operation {
    pub id: OperationId,
    pub name: &'static str,
    pub verb: Verb,
    /// Path relative to the API root with `{placeholder}` segments.
    pub path_template: &'static str,
    pub body: BodyKind,
    /// Optional query parameters in the order they are sent.
    pub query_params: &'static [&'static str],
}

impl Operation {
    /// Placeholder names in the order they appear in the path template.
    pub fn path_params(&self) -> Vec<&'static str> {
        let mut params = Vec::new();
        let mut rest = self.path_template;
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            params.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        params
    }

    pub fn accepts_body(&self) -> bool {
        self.body != BodyKind::None
    }
}

const CATALOG: [Operation; 16] = [
    Operation {
        id: OperationId::ListChannels,
        name: "list_channels",
        verb: Verb::Get,
        path_template: "/channels",
        body: BodyKind::None,
        query_params: &[],
    },
    Operation {
        id: OperationId::InstallChaincode,
        name: "install_chaincode",
        verb: Verb::Post,
        path_template: "/chaincodes",
        body: BodyKind::Install,
        query_params: &["peers"],
    },
    Operation {
        id: OperationId::QueryInstalledChaincode,
        name: "query_installed_chaincode",
        verb: Verb::Get,
        path_template: "/chaincodes/{id}",
        body: BodyKind::None,
        query_params: &["peers"],
    },
    Operation {
        id: OperationId::CreateChannel,
        name: "create_channel",
        verb: Verb::Post,
        path_template: "/channels/{channel}",
        body: BodyKind::Envelope,
        query_params: &[],
    },
    Operation {
        id: OperationId::InstantiateChaincode,
        name: "instantiate_chaincode",
        verb: Verb::Post,
        path_template: "/channels/{channel}/chaincodes",
        body: BodyKind::Chaincode,
        query_params: &["peers"],
    },
    Operation {
        id: OperationId::QueryLedger,
        name: "query_ledger",
        verb: Verb::Post,
        path_template: "/channels/{channel}/ledger",
        body: BodyKind::Json,
        query_params: &["chaincodeId", "blockId", "blockHash", "txnId"],
    },
    Operation {
        id: OperationId::JoinChannel,
        name: "join_channel",
        verb: Verb::Post,
        path_template: "/channels/{channel}/peers",
        body: BodyKind::Peer,
        query_params: &[],
    },
    Operation {
        id: OperationId::CommitTransaction,
        name: "commit_transaction",
        verb: Verb::Post,
        path_template: "/channels/{channel}/transactions",
        body: BodyKind::Json,
        query_params: &[],
    },
    Operation {
        id: OperationId::ChannelInfo,
        name: "channel_info",
        verb: Verb::Get,
        path_template: "/channels/{channel}",
        body: BodyKind::None,
        query_params: &[],
    },
    Operation {
        id: OperationId::UpdateChannel,
        name: "update_channel",
        verb: Verb::Put,
        path_template: "/channels/{channel}",
        body: BodyKind::Envelope,
        query_params: &[],
    },
    Operation {
        id: OperationId::QueryBlocks,
        name: "query_blocks",
        verb: Verb::Get,
        path_template: "/channels/{channel}/blocks",
        body: BodyKind::None,
        query_params: &["blockId", "blockHash"],
    },
    Operation {
        id: OperationId::QueryInstantiatedChaincodes,
        name: "query_instantiated_chaincodes",
        verb: Verb::Get,
        path_template: "/channels/{channel}/chaincodes",
        body: BodyKind::None,
        query_params: &[],
    },
    Operation {
        id: OperationId::QueryChannelChaincode,
        name: "query_channel_chaincode",
        verb: Verb::Get,
        path_template: "/channels/{channel}/chaincodes/{id}",
        body: BodyKind::None,
        query_params: &[],
    },
    Operation {
        id: OperationId::UpgradeChaincode,
        name: "upgrade_chaincode",
        verb: Verb::Put,
        path_template: "/channels/{channel}/chaincodes",
        body: BodyKind::Chaincode,
        query_params: &["peers"],
    },
    Operation {
        id: OperationId::SendProposal,
        name: "send_proposal",
        verb: Verb::Post,
        path_template: "/channels/{channel}/endorse",
        body: BodyKind::Json,
        query_params: &["peers"],
    },
    Operation {
        id: OperationId::QueryTransaction,
        name: "query_transaction",
        verb: Verb::Get,
        path_template: "/channels/{channel}/transactions/{txn_id}",
        body: BodyKind::None,
        query_params: &[],
    },
];

/// Look up the descriptor for an operation.
pub fn operation(id: OperationId) -> &'static Operation {
    // CATALOG is declared in OperationId::ALL order.
    let idx = OperationId::ALL
        .iter()
        .position(|candidate| *candidate == id)
        .unwrap_or_default();
    &CATALOG[idx]
}

/// All catalog descriptors, in declaration order.
pub fn catalog() -> &'static [Operation] {
    &CATALOG
}
