use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use url::Url;

use crate::directory::FindScope;
use crate::guid::Guid;
use crate::manifest::{AtomManifest, Manifest, NodeCapability, NodeManifest};
use crate::peer::{AtomPush, PeerClient, ProtocolError};
use crate::sos::{Sos, SosError};

/// How a node misbehaves when called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every call returns a transport error
    Fail,
    /// Every call waits forever
    Hang,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: RwLock<HashMap<Guid, Weak<Sos>>>,
    faults: RwLock<HashMap<Guid, Fault>>,
    urls: RwLock<HashMap<Url, Bytes>>,
    calls: AtomicUsize,
}

/// In-process [`PeerClient`]. Cloning shares the same network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Inner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sos: &Arc<Sos>) {
        self.inner
            .nodes
            .write()
            .insert(sos.local_node().guid, Arc::downgrade(sos));
    }

    pub fn detach(&self, guid: &Guid) {
        self.inner.nodes.write().remove(guid);
    }

    pub fn set_fault(&self, guid: Guid, fault: Option<Fault>) {
        let mut faults = self.inner.faults.write();
        match fault {
            Some(fault) => faults.insert(guid, fault),
            None => faults.remove(&guid),
        };
    }

    /// Serve `bytes` for GETs of `url`
    pub fn serve_url(&self, url: Url, bytes: Bytes) {
        self.inner.urls.write().insert(url, bytes);
    }

    /// Number of calls made through this network so far
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    async fn target(&self, node: &NodeManifest) -> Result<Arc<Sos>, ProtocolError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let fault = self.inner.faults.read().get(&node.guid).copied();
        match fault {
            Some(Fault::Fail) => {
                return Err(ProtocolError::Transport(format!(
                    "connection to {} refused",
                    node.address()
                )))
            }
            Some(Fault::Hang) => futures::future::pending::<()>().await,
            None => {}
        }
        self.inner
            .nodes
            .read()
            .get(&node.guid)
            .and_then(Weak::upgrade)
            .ok_or(ProtocolError::Unreachable(node.guid))
    }
}

fn protocol_error(e: SosError) -> ProtocolError {
    match e {
        SosError::Directory(crate::directory::DirectoryError::NotFound(guid)) => {
            ProtocolError::NotFound(guid)
        }
        SosError::AtomStore(crate::storage::AtomStoreError::NotFound(guid)) => {
            ProtocolError::NotFound(guid)
        }
        SosError::Discovery(crate::discovery::DiscoveryError::NotFound(guid)) => {
            ProtocolError::NotFound(guid)
        }
        SosError::GuidMismatch { .. } => ProtocolError::Status(400, e.to_string()),
        other => ProtocolError::Status(500, other.to_string()),
    }
}

#[async_trait]
impl PeerClient for MemoryNetwork {
    async fn push_atom(
        &self,
        node: &NodeManifest,
        push: AtomPush,
    ) -> Result<AtomManifest, ProtocolError> {
        let sos = self.target(node).await?;
        sos.receive_atom(push).await.map_err(protocol_error)
    }

    async fn fetch_atom_data(
        &self,
        node: &NodeManifest,
        guid: Guid,
    ) -> Result<Bytes, ProtocolError> {
        let sos = self.target(node).await?;
        sos.serve_atom_data(&guid).await.map_err(protocol_error)
    }

    async fn challenge(
        &self,
        node: &NodeManifest,
        guid: Guid,
        challenge: &str,
    ) -> Result<Guid, ProtocolError> {
        let sos = self.target(node).await?;
        sos.challenge(&guid, challenge).await.map_err(protocol_error)
    }

    async fn push_manifest(
        &self,
        node: &NodeManifest,
        manifest: &Manifest,
    ) -> Result<(), ProtocolError> {
        let sos = self.target(node).await?;
        sos.add_manifest(manifest.clone())
            .await
            .map(|_| ())
            .map_err(protocol_error)
    }

    async fn fetch_manifest(
        &self,
        node: &NodeManifest,
        guid: Guid,
    ) -> Result<Manifest, ProtocolError> {
        let sos = self.target(node).await?;
        // peers answer from what they hold, like the HTTP handler does
        sos.find_manifest(&guid, FindScope::Local)
            .await
            .map_err(protocol_error)
    }

    async fn register_node(
        &self,
        node: &NodeManifest,
        registration: &NodeManifest,
    ) -> Result<(), ProtocolError> {
        let sos = self.target(node).await?;
        sos.register_node(registration.clone(), true)
            .await
            .map_err(protocol_error)
    }

    async fn fetch_node(
        &self,
        node: &NodeManifest,
        guid: Guid,
    ) -> Result<NodeManifest, ProtocolError> {
        let sos = self.target(node).await?;
        sos.known_node(&guid).ok_or(ProtocolError::NotFound(guid))
    }

    async fn nodes_by_capability(
        &self,
        node: &NodeManifest,
        capability: NodeCapability,
    ) -> Result<Vec<NodeManifest>, ProtocolError> {
        let sos = self.target(node).await?;
        Ok(sos.nodes_by_capability(capability))
    }

    async fn fetch_url(&self, url: &Url) -> Result<Bytes, ProtocolError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .urls
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| ProtocolError::Status(404, url.to_string()))
    }
}
