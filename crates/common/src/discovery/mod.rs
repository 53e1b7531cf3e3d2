//! # Node discovery
//!
//! Tracks the peers this node knows about and resolves a node GUID to a
//! reachable [`NodeManifest`], asking other node-discovery (`nds`) peers
//! when the local registry has no answer.

mod registry;

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::guid::Guid;
use crate::manifest::{NodeCapability, NodeManifest};
use crate::peer::PeerClient;

pub use registry::{MemoryNodeStore, NodeRegistry, NodeStore, NodeStoreError};

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("node not found: {0}")]
    NotFound(Guid),
    #[error("invalid node registration: {0}")]
    Registration(String),
    #[error("failed to persist node: {0}")]
    Persist(#[from] NodeStoreError),
}

#[derive(Debug)]
pub struct NodeDiscoveryService {
    local: NodeManifest,
    registry: NodeRegistry,
    client: Arc<dyn PeerClient>,
    timeout: Duration,
}

impl NodeDiscoveryService {
    pub async fn open(
        local: NodeManifest,
        store: Arc<dyn NodeStore>,
        client: Arc<dyn PeerClient>,
        timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let registry = NodeRegistry::load(store).await?;
        tracing::debug!(known = registry.len(), "node registry loaded");
        Ok(Self {
            local,
            registry,
            client,
            timeout,
        })
    }

    pub fn local_node(&self) -> &NodeManifest {
        &self.local
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Register (or re-register) a node.
    ///
    /// Unless `local_only`, the registration is forwarded in the background
    /// to every known node-discovery peer. Forwarding failures are logged.
    pub async fn register_node(
        self: &Arc<Self>,
        node: NodeManifest,
        local_only: bool,
    ) -> Result<(), DiscoveryError> {
        if !node.is_valid() {
            return Err(DiscoveryError::Registration(format!(
                "node manifest {} is not valid",
                node.guid
            )));
        }
        if node.guid == self.local.guid {
            return Ok(());
        }

        self.registry.upsert(node.clone()).await?;
        tracing::info!(node = %node.guid.short(), address = %node.address(), "registered node");

        if !local_only {
            let targets: Vec<_> = self
                .registry
                .with_capability(NodeCapability::Nds)
                .into_iter()
                .filter(|n| n.guid != node.guid && n.guid != self.local.guid)
                .collect();
            let client = self.client.clone();
            tokio::spawn(async move {
                for target in targets {
                    if let Err(e) = client.register_node(&target, &node).await {
                        tracing::warn!(
                            target = %target.guid.short(),
                            node = %node.guid.short(),
                            "failed to forward node registration: {}",
                            e
                        );
                    }
                }
            });
        }
        Ok(())
    }

    /// Resolve a node GUID, asking nds peers if it is not known locally
    pub async fn get_node(&self, guid: &Guid) -> Result<NodeManifest, DiscoveryError> {
        if guid.is_invalid() {
            return Err(DiscoveryError::NotFound(*guid));
        }
        if *guid == self.local.guid {
            return Ok(self.local.clone());
        }
        if let Some(node) = self.registry.get(guid) {
            return Ok(node.as_ref().clone());
        }

        let node = self.find_remote(guid).await?;
        self.registry.upsert(node.clone()).await?;
        Ok(node)
    }

    async fn find_remote(&self, guid: &Guid) -> Result<NodeManifest, DiscoveryError> {
        let peers: Vec<_> = self
            .registry
            .with_capability(NodeCapability::Nds)
            .into_iter()
            .filter(|n| n.guid != self.local.guid)
            .collect();
        if peers.is_empty() {
            return Err(DiscoveryError::NotFound(*guid));
        }

        let mut queries: FuturesUnordered<_> = peers
            .iter()
            .map(|peer| {
                let client = self.client.clone();
                let peer = peer.clone();
                let guid = *guid;
                async move { (peer.guid, client.fetch_node(&peer, guid).await) }
            })
            .collect();

        let search = async {
            while let Some((peer, result)) = queries.next().await {
                match result {
                    Ok(node) if node.guid == *guid && node.is_valid() => return Some(node),
                    Ok(_) => {
                        tracing::warn!(peer = %peer.short(), "peer returned a mismatched node record")
                    }
                    Err(e) => tracing::debug!(peer = %peer.short(), "node lookup failed: {}", e),
                }
            }
            None
        };

        match tokio::time::timeout(self.timeout, search).await {
            Ok(Some(node)) => Ok(node),
            Ok(None) => Err(DiscoveryError::NotFound(*guid)),
            Err(_) => {
                tracing::warn!(node = %guid.short(), "node lookup timed out");
                Err(DiscoveryError::NotFound(*guid))
            }
        }
    }

    /// Known nodes offering `capability`. Does not touch the network.
    pub fn get_nodes_by_capability(&self, capability: NodeCapability) -> Vec<NodeManifest> {
        self.registry
            .with_capability(capability)
            .into_iter()
            .map(|n| n.as_ref().clone())
            .collect()
    }

    pub fn known_nodes(&self) -> Vec<NodeManifest> {
        self.registry
            .all()
            .into_iter()
            .map(|n| n.as_ref().clone())
            .collect()
    }
}
