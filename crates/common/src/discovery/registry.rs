use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::guid::Guid;
use crate::manifest::{NodeCapability, NodeManifest};

#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeStoreError {
    #[error("node store error: {0}")]
    Backend(String),
}

/// Durable backing for the node registry
#[async_trait]
pub trait NodeStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert or replace the record for `node.guid`
    async fn upsert(&self, node: &NodeManifest) -> Result<(), NodeStoreError>;
    async fn get(&self, guid: &Guid) -> Result<Option<NodeManifest>, NodeStoreError>;
    async fn list(&self) -> Result<Vec<NodeManifest>, NodeStoreError>;
}

/// In-memory node store
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    inner: Arc<RwLock<HashMap<Guid, NodeManifest>>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn upsert(&self, node: &NodeManifest) -> Result<(), NodeStoreError> {
        self.inner.write().insert(node.guid, node.clone());
        Ok(())
    }

    async fn get(&self, guid: &Guid) -> Result<Option<NodeManifest>, NodeStoreError> {
        Ok(self.inner.read().get(guid).cloned())
    }

    async fn list(&self) -> Result<Vec<NodeManifest>, NodeStoreError> {
        Ok(self.inner.read().values().cloned().collect())
    }
}

/// Known peers, held in memory and written through to a [`NodeStore`].
///
/// Records are replaced whole, so readers see either the old or the new
/// version of a node.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<Guid, Arc<NodeManifest>>>,
    store: Arc<dyn NodeStore>,
}

impl NodeRegistry {
    /// Load every persisted record
    pub async fn load(store: Arc<dyn NodeStore>) -> Result<Self, NodeStoreError> {
        let nodes = store
            .list()
            .await?
            .into_iter()
            .filter(NodeManifest::is_valid)
            .map(|n| (n.guid, Arc::new(n)))
            .collect();
        Ok(Self {
            nodes: RwLock::new(nodes),
            store,
        })
    }

    pub async fn upsert(&self, node: NodeManifest) -> Result<(), NodeStoreError> {
        self.store.upsert(&node).await?;
        self.nodes.write().insert(node.guid, Arc::new(node));
        Ok(())
    }

    pub fn get(&self, guid: &Guid) -> Option<Arc<NodeManifest>> {
        self.nodes.read().get(guid).cloned()
    }

    pub fn contains(&self, guid: &Guid) -> bool {
        self.nodes.read().contains_key(guid)
    }

    pub fn all(&self) -> Vec<Arc<NodeManifest>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn with_capability(&self, capability: NodeCapability) -> Vec<Arc<NodeManifest>> {
        self.nodes
            .read()
            .values()
            .filter(|n| n.has(capability))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
