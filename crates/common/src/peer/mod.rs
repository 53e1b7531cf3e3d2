//! # Peer protocol
//!
//! Everything a node asks of another node goes through [`PeerClient`]. The
//! daemon implements it over HTTP; [`crate::testkit`] implements it by
//! routing calls to in-process nodes.

mod messages;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::guid::Guid;
use crate::manifest::{AtomManifest, Manifest, NodeCapability, NodeManifest};

pub use messages::{AtomPush, NodeSelection, ReplicationMetadata, ReplicationNodes};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("peer answered with status {0}: {1}")]
    Status(u16, String),
    #[error("failed to decode peer response: {0}")]
    Decode(String),
    #[error("peer does not have {0}")]
    NotFound(Guid),
    #[error("peer is unreachable: {0}")]
    Unreachable(Guid),
}

#[async_trait]
pub trait PeerClient: Send + Sync + 'static {
    /// `POST /storage/atom`; the receiver answers with its atom manifest
    async fn push_atom(
        &self,
        node: &NodeManifest,
        push: AtomPush,
    ) -> Result<AtomManifest, ProtocolError>;

    /// `GET /storage/data/guid/{guid}`
    async fn fetch_atom_data(&self, node: &NodeManifest, guid: Guid)
        -> Result<Bytes, ProtocolError>;

    /// `GET /storage/atom/guid/{guid}/challenge/{challenge}`
    async fn challenge(
        &self,
        node: &NodeManifest,
        guid: Guid,
        challenge: &str,
    ) -> Result<Guid, ProtocolError>;

    /// `POST /manifest`
    async fn push_manifest(&self, node: &NodeManifest, manifest: &Manifest)
        -> Result<(), ProtocolError>;

    /// `GET /manifest/guid/{guid}`
    async fn fetch_manifest(&self, node: &NodeManifest, guid: Guid)
        -> Result<Manifest, ProtocolError>;

    /// `POST /node`
    async fn register_node(
        &self,
        node: &NodeManifest,
        registration: &NodeManifest,
    ) -> Result<(), ProtocolError>;

    /// `GET /node/guid/{guid}`
    async fn fetch_node(&self, node: &NodeManifest, guid: Guid)
        -> Result<NodeManifest, ProtocolError>;

    /// `GET /node/service/{capability}`
    async fn nodes_by_capability(
        &self,
        node: &NodeManifest,
        capability: NodeCapability,
    ) -> Result<Vec<NodeManifest>, ProtocolError>;

    /// Plain GET of an http(s) location
    async fn fetch_url(&self, url: &Url) -> Result<Bytes, ProtocolError>;
}

impl std::fmt::Debug for dyn PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PeerClient")
    }
}
