use std::collections::HashSet;
use std::sync::Arc;

use super::PeerDirectoryIndex;
use crate::discovery::NodeDiscoveryService;
use crate::guid::Guid;
use crate::manifest::{Manifest, NodeCapability, NodeManifest};
use crate::peer::PeerClient;

/// Last-resort tier: ask peers.
///
/// Peers the index says hold the manifest are asked first, then every known
/// metadata-discovery node. Failures move on to the next peer.
#[derive(Debug)]
pub struct RemoteManifestDirectory {
    index: Arc<PeerDirectoryIndex>,
    discovery: Arc<NodeDiscoveryService>,
    client: Arc<dyn PeerClient>,
}

impl RemoteManifestDirectory {
    pub fn new(
        index: Arc<PeerDirectoryIndex>,
        discovery: Arc<NodeDiscoveryService>,
        client: Arc<dyn PeerClient>,
    ) -> Self {
        Self {
            index,
            discovery,
            client,
        }
    }

    async fn candidates(&self, guid: &Guid) -> Vec<NodeManifest> {
        let local = self.discovery.local_node().guid;
        let mut seen = HashSet::from([local]);
        let mut candidates = Vec::new();

        for node in self.index.nodes(guid) {
            if !seen.insert(node) {
                continue;
            }
            match self.discovery.get_node(&node).await {
                Ok(node) => candidates.push(node),
                Err(e) => tracing::debug!(node = %node.short(), "skipping indexed node: {}", e),
            }
        }
        for node in self.discovery.get_nodes_by_capability(NodeCapability::Dds) {
            if seen.insert(node.guid) {
                candidates.push(node);
            }
        }
        candidates
    }

    pub async fn find(&self, guid: &Guid) -> Option<Manifest> {
        for node in self.candidates(guid).await {
            match self.client.fetch_manifest(&node, *guid).await {
                Ok(manifest) if manifest.guid() == *guid && manifest.is_valid() => {
                    self.index.add(*guid, node.guid);
                    tracing::debug!(manifest = %guid.short(), node = %node.guid.short(), "remote hit");
                    return Some(manifest);
                }
                Ok(_) => tracing::warn!(
                    manifest = %guid.short(),
                    node = %node.guid.short(),
                    "peer returned an invalid manifest"
                ),
                Err(e) => tracing::debug!(
                    manifest = %guid.short(),
                    node = %node.guid.short(),
                    "remote miss: {}",
                    e
                ),
            }
        }
        None
    }
}
