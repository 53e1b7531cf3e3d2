//! # Node facade
//!
//! [`Sos`] owns every component of a node and exposes the operations clients
//! and the peer protocol need. It is built explicitly with [`Sos::open`] and
//! torn down with [`Sos::shutdown`].

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::directory::{
    DdsIndexError, DirectoryError, FindScope, LocalManifestStore, ManifestDirectory,
    PeerDirectoryIndex, RemoteManifestDirectory,
};
use crate::discovery::{
    DiscoveryError, NodeDiscoveryService, NodeStore, DEFAULT_DISCOVERY_TIMEOUT,
};
use crate::guid::Guid;
use crate::lineage::{LineageError, VersionLineageTracker};
use crate::manifest::{
    AtomManifest, BundleKind, CompoundManifest, CompoundType, Content, Location, LocationBundle,
    Manifest,
    ManifestError, NodeCapability, NodeManifest, VersionManifest,
};
use crate::peer::{AtomPush, NodeSelection, PeerClient};
use crate::replication::{
    Payload, ReplicationEngine, ReplicationHandle, ReplicationReport, ReplicationStatus,
    DEFAULT_MAX_CONCURRENT_PUSHES, DEFAULT_PUSH_TIMEOUT,
};
use crate::storage::{AtomSource, AtomStore, AtomStoreError, LocalStorage};

#[derive(Debug, Clone)]
pub struct SosConfig {
    /// Node root: manifests, data, heads and the dds index live here
    pub root: PathBuf,
    pub push_timeout: Duration,
    pub max_concurrent_pushes: usize,
    pub discovery_timeout: Duration,
    /// Bundle kind recorded for atoms added through this node
    pub default_bundle_kind: BundleKind,
}

impl Default for SosConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("store"),
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            max_concurrent_pushes: DEFAULT_MAX_CONCURRENT_PUSHES,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            default_bundle_kind: BundleKind::Persistent,
        }
    }
}

impl SosConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SosError {
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("atom store error: {0}")]
    AtomStore(#[from] AtomStoreError),
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("lineage error: {0}")]
    Lineage(#[from] LineageError),
    #[error("dds index error: {0}")]
    DdsIndex(#[from] DdsIndexError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pushed data hashes to {actual}, not {claimed}")]
    GuidMismatch { claimed: Guid, actual: Guid },
}

/// What the policy layer needs from a node
#[async_trait]
pub trait StorageContract: Send + Sync {
    async fn add_manifest(&self, manifest: Manifest) -> Result<Guid, SosError>;
    async fn get_manifest(&self, guid: &Guid) -> Result<Manifest, SosError>;
    async fn replicate_data(&self, guid: &Guid, factor: u32)
        -> Result<ReplicationHandle, SosError>;
}

#[derive(Debug)]
pub struct Sos {
    config: SosConfig,
    storage: LocalStorage,
    discovery: Arc<NodeDiscoveryService>,
    atoms: AtomStore,
    directory: Arc<ManifestDirectory>,
    replication: ReplicationEngine,
}

impl Sos {
    pub async fn open(
        config: SosConfig,
        node: NodeManifest,
        node_store: Arc<dyn NodeStore>,
        client: Arc<dyn PeerClient>,
    ) -> Result<Self, SosError> {
        let storage = LocalStorage::open(&config.root).await?;
        let local_guid = node.guid;

        let discovery = Arc::new(
            NodeDiscoveryService::open(node, node_store, client.clone(), config.discovery_timeout)
                .await?,
        );
        let atoms = AtomStore::new(storage.clone(), discovery.clone(), client.clone());

        let index = Arc::new(PeerDirectoryIndex::load(storage.dds_index_path()).await?);
        let lineage = Arc::new(VersionLineageTracker::open(storage.heads_dir()).await?);
        let replication = ReplicationEngine::new(
            local_guid,
            client.clone(),
            index.clone(),
            config.max_concurrent_pushes,
            config.push_timeout,
        );
        let local = LocalManifestStore::open(storage.manifests_dir())
            .await
            .map_err(DirectoryError::from)?;
        let remote = RemoteManifestDirectory::new(index.clone(), discovery.clone(), client);
        let directory = Arc::new(
            ManifestDirectory::open(local, remote, index, lineage, Some(replication.clone()))
                .await?,
        );

        tracing::info!(node = %local_guid, root = ?config.root, "node opened");
        Ok(Self {
            config,
            storage,
            discovery,
            atoms,
            directory,
            replication,
        })
    }

    /// Persist the dds index and close the replication pool
    pub async fn shutdown(&self) -> Result<(), SosError> {
        self.replication.shutdown();
        self.directory.index().persist().await?;
        tracing::info!(node = %self.local_node().guid, "node shut down");
        Ok(())
    }

    pub fn config(&self) -> &SosConfig {
        &self.config
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn local_node(&self) -> &NodeManifest {
        self.discovery.local_node()
    }

    pub fn discovery(&self) -> &Arc<NodeDiscoveryService> {
        &self.discovery
    }

    pub fn atoms(&self) -> &AtomStore {
        &self.atoms
    }

    pub fn directory(&self) -> &Arc<ManifestDirectory> {
        &self.directory
    }

    pub fn lineage(&self) -> &Arc<VersionLineageTracker> {
        self.directory.lineage()
    }

    // atoms

    /// Store an atom locally and record its manifest
    pub async fn add_atom(&self, source: impl Into<AtomSource>) -> Result<AtomManifest, SosError> {
        self.add_atom_as(source.into(), self.config.default_bundle_kind)
            .await
    }

    async fn add_atom_as(
        &self,
        source: AtomSource,
        kind: BundleKind,
    ) -> Result<AtomManifest, SosError> {
        let (guid, bundles) = self.atoms.store(source, kind, BTreeSet::new()).await?;
        self.directory
            .add_manifest(AtomManifest::new(guid, bundles).into())
            .await?;
        self.local_atom_manifest(&guid).await
    }

    async fn local_atom_manifest(&self, guid: &Guid) -> Result<AtomManifest, SosError> {
        Ok(self
            .directory
            .find_manifest(guid, FindScope::Local)
            .await?
            .into_atom()?)
    }

    /// Store an atom and replicate its bytes to `factor` storage nodes
    pub async fn add_atom_replicated(
        &self,
        source: impl Into<AtomSource>,
        factor: u32,
    ) -> Result<(AtomManifest, ReplicationHandle), SosError> {
        let atom = self.add_atom(source).await?;
        let handle = self.replicate_data(&atom.guid, factor).await?;
        Ok((atom, handle))
    }

    /// Resolve an atom's bytes through its manifest's locations
    pub async fn get_atom_content(&self, guid: &Guid) -> Result<Bytes, SosError> {
        if let Ok(bytes) = self.atoms.get_local(guid).await {
            return Ok(bytes);
        }
        let atom = self
            .directory
            .find_manifest(guid, FindScope::Any)
            .await?
            .into_atom()?;
        Ok(self.atoms.get_content(guid, &atom.locations).await?)
    }

    /// Bytes this node can hand to a peer without asking other peers:
    /// the local copy, or a non-peer location from the local manifest
    pub async fn serve_atom_data(&self, guid: &Guid) -> Result<Bytes, SosError> {
        if let Ok(bytes) = self.atoms.get_local(guid).await {
            return Ok(bytes);
        }
        let atom = self
            .directory
            .find_manifest(guid, FindScope::Local)
            .await?
            .into_atom()?;
        let direct: BTreeSet<LocationBundle> = atom
            .locations
            .into_iter()
            .filter(|b| !matches!(b.location, Location::Node { .. }))
            .collect();
        Ok(self.atoms.get_content(guid, &direct).await?)
    }

    pub async fn challenge(&self, guid: &Guid, challenge: &str) -> Result<Guid, SosError> {
        Ok(self.atoms.challenge(guid, challenge).await?)
    }

    /// Handle an atom pushed by a peer.
    ///
    /// Returns the manifest the pusher should record: this node's `sos://`
    /// location for the atom.
    pub async fn receive_atom(&self, push: AtomPush) -> Result<AtomManifest, SosError> {
        let actual = Guid::hash(&push.data);
        if let Some(claimed) = push.guid {
            if claimed != actual {
                return Err(SosError::GuidMismatch { claimed, actual });
            }
        }

        let atom = self
            .add_atom_as(AtomSource::Bytes(push.data.clone()), BundleKind::Persistent)
            .await?;

        let onward = push.metadata.onward_factor();
        if onward > 0 {
            let nodes = &push.metadata.replication_nodes;
            let candidates = match nodes.selection {
                NodeSelection::Local => Vec::new(),
                NodeSelection::Any => self
                    .discovery
                    .get_nodes_by_capability(NodeCapability::Storage),
                NodeSelection::Specified => {
                    let mut resolved = Vec::new();
                    for guid in &nodes.refs {
                        match self.discovery.get_node(guid).await {
                            Ok(node) => resolved.push(node),
                            Err(e) => tracing::warn!(node = %guid.short(), "skipping replication target: {}", e),
                        }
                    }
                    resolved
                }
            };
            self.spawn_replication(
                Payload::Atom {
                    guid: atom.guid,
                    data: push.data,
                },
                candidates,
                onward,
            );
        }

        Ok(AtomManifest::new(
            atom.guid,
            [LocationBundle::persistent(self.atoms.node_location(atom.guid))],
        ))
    }

    fn spawn_replication(
        &self,
        payload: Payload,
        candidates: Vec<NodeManifest>,
        factor: u32,
    ) -> ReplicationHandle {
        let handle = self.replication.replicate(payload, candidates, factor);
        let directory = self.directory.clone();
        let watcher = handle.clone();
        tokio::spawn(async move {
            let report = watcher.outcome().await;
            merge_receipts(&directory, &report).await;
        });
        handle
    }

    // manifests

    pub async fn add_manifest(&self, manifest: Manifest) -> Result<Guid, SosError> {
        Ok(self.directory.add_manifest(manifest).await?)
    }

    /// Add a manifest and replicate it to `factor` metadata-discovery nodes
    pub async fn add_manifest_replicated(
        &self,
        manifest: Manifest,
        factor: u32,
    ) -> Result<(Guid, ReplicationHandle), SosError> {
        let peers = self.discovery.get_nodes_by_capability(NodeCapability::Dds);
        Ok(self
            .directory
            .add_manifest_replicated(manifest, peers, factor)
            .await?)
    }

    pub async fn find_manifest(&self, guid: &Guid, scope: FindScope) -> Result<Manifest, SosError> {
        Ok(self.directory.find_manifest(guid, scope).await?)
    }

    pub async fn add_compound(
        &self,
        compound_type: CompoundType,
        contents: impl IntoIterator<Item = Content>,
    ) -> Result<CompoundManifest, SosError> {
        let compound = CompoundManifest::new(compound_type, contents);
        self.directory.add_manifest(compound.clone().into()).await?;
        Ok(compound)
    }

    /// Add a version. HEAD of its asset moves from `previous` to it.
    pub async fn add_version(&self, version: VersionManifest) -> Result<Guid, SosError> {
        Ok(self.directory.add_manifest(version.into()).await?)
    }

    /// Start a new asset whose first version points at `content`
    pub async fn new_asset(
        &self,
        content: Guid,
        metadata: Option<Guid>,
    ) -> Result<VersionManifest, SosError> {
        let version = VersionManifest::root(content, metadata);
        self.add_version(version.clone()).await?;
        Ok(version)
    }

    /// Add a version superseding every current head of `invariant`
    pub async fn next_version(
        &self,
        invariant: Guid,
        content: Guid,
        metadata: Option<Guid>,
    ) -> Result<VersionManifest, SosError> {
        let heads = self.lineage().get_heads(&invariant);
        if heads.is_empty() {
            return Err(LineageError::NotFound(invariant).into());
        }
        let version = VersionManifest::next(invariant, content, heads, metadata);
        self.add_version(version.clone()).await?;
        Ok(version)
    }

    pub fn replication_status(&self, id: &Uuid) -> Option<ReplicationStatus> {
        self.replication.status(id)
    }

    // nodes

    pub async fn register_node(&self, node: NodeManifest, local_only: bool) -> Result<(), SosError> {
        Ok(self.discovery.register_node(node, local_only).await?)
    }

    pub async fn get_node(&self, guid: &Guid) -> Result<NodeManifest, SosError> {
        Ok(self.discovery.get_node(guid).await?)
    }

    /// A node this node knows about, without asking peers
    pub fn known_node(&self, guid: &Guid) -> Option<NodeManifest> {
        if *guid == self.local_node().guid {
            return Some(self.local_node().clone());
        }
        self.discovery
            .registry()
            .get(guid)
            .map(|n| n.as_ref().clone())
    }

    pub fn nodes_by_capability(&self, capability: NodeCapability) -> Vec<NodeManifest> {
        self.discovery.get_nodes_by_capability(capability)
    }
}

/// Record the peer copies reported by receivers of an atom push
async fn merge_receipts(directory: &ManifestDirectory, report: &ReplicationReport) {
    for receipt in &report.receipts {
        if let Err(e) = directory.add_manifest(receipt.clone().into()).await {
            tracing::warn!(atom = %receipt.guid.short(), "failed to merge replication receipt: {}", e);
        }
    }
}

#[async_trait]
impl StorageContract for Sos {
    async fn add_manifest(&self, manifest: Manifest) -> Result<Guid, SosError> {
        Sos::add_manifest(self, manifest).await
    }

    async fn get_manifest(&self, guid: &Guid) -> Result<Manifest, SosError> {
        self.find_manifest(guid, FindScope::Any).await
    }

    async fn replicate_data(
        &self,
        guid: &Guid,
        factor: u32,
    ) -> Result<ReplicationHandle, SosError> {
        let data = self.atoms.get_local(guid).await?;
        let candidates = self
            .discovery
            .get_nodes_by_capability(NodeCapability::Storage);
        Ok(self.spawn_replication(Payload::Atom { guid: *guid, data }, candidates, factor))
    }
}
