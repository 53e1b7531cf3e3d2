//! # Manifest directory
//!
//! Three tiers, fastest first:
//!
//! 1. [`ManifestCache`]: in memory
//! 2. [`LocalManifestStore`]: this node's disk
//! 3. [`RemoteManifestDirectory`]: other nodes
//!
//! Writes go to the cache and the local store synchronously, then optionally
//! to peers through the [`ReplicationEngine`]. Reads fall through the tiers
//! and backfill the faster ones on a hit. A miss in one tier is not an error;
//! only missing in every tier is.

mod cache;
mod dds_index;
mod local;
mod remote;

use std::sync::Arc;

use crate::guid::Guid;
use crate::lineage::{LineageError, VersionLineageTracker};
use crate::manifest::{Manifest, NodeManifest};
use crate::replication::{Payload, ReplicationEngine, ReplicationHandle};

pub use cache::ManifestCache;
pub use dds_index::{DdsIndexError, PeerDirectoryIndex};
pub use local::{LocalManifestStore, LocalStoreError, Stored};
pub use remote::RemoteManifestDirectory;

/// How far a lookup may go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FindScope {
    /// Cache and local disk only
    Local,
    /// Fall through to peers
    #[default]
    Any,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("manifest not found: {0}")]
    NotFound(Guid),
    #[error("failed to persist manifest: {0}")]
    Persist(String),
    #[error("a different manifest is already stored under {0}")]
    Integrity(Guid),
    #[error("lineage error: {0}")]
    Lineage(#[from] LineageError),
    #[error("replication is not enabled on this directory")]
    ReplicationDisabled,
}

impl From<LocalStoreError> for DirectoryError {
    fn from(e: LocalStoreError) -> Self {
        match e {
            LocalStoreError::Conflict(guid) => DirectoryError::Integrity(guid),
            other => DirectoryError::Persist(other.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct ManifestDirectory {
    cache: ManifestCache,
    local: LocalManifestStore,
    remote: RemoteManifestDirectory,
    index: Arc<PeerDirectoryIndex>,
    lineage: Arc<VersionLineageTracker>,
    replication: Option<ReplicationEngine>,
}

impl ManifestDirectory {
    /// Open the local tier and rebuild the version DAG from it
    pub async fn open(
        local: LocalManifestStore,
        remote: RemoteManifestDirectory,
        index: Arc<PeerDirectoryIndex>,
        lineage: Arc<VersionLineageTracker>,
        replication: Option<ReplicationEngine>,
    ) -> Result<Self, DirectoryError> {
        let versions = local.versions().await?;
        for version in &versions {
            lineage.record_version(version);
        }
        tracing::debug!(versions = versions.len(), "rebuilt version dag");

        Ok(Self {
            cache: ManifestCache::new(),
            local,
            remote,
            index,
            lineage,
            replication,
        })
    }

    /// Validate and store a manifest. Versions also advance their asset's HEAD.
    pub async fn add_manifest(&self, manifest: Manifest) -> Result<Guid, DirectoryError> {
        if !manifest.is_valid() {
            return Err(DirectoryError::Persist(format!(
                "{} manifest {} is not valid",
                manifest.manifest_type(),
                manifest.guid()
            )));
        }
        let guid = manifest.guid();

        let Stored { manifest, written } = self.local.put(manifest).await.map_err(|e| {
            tracing::error!(manifest = %guid.short(), "failed to store manifest: {}", e);
            DirectoryError::from(e)
        })?;
        self.cache.insert(manifest.clone());

        // a no-op for versions whose head entry is already logged
        if let Manifest::Version(version) = &manifest {
            self.lineage.record_version(version);
            self.lineage
                .advance_head(version.invariant, &version.previous, version.guid)
                .await?;
        }

        if written {
            tracing::info!(manifest = %guid.short(), kind = %manifest.manifest_type(), "added manifest");
        } else {
            tracing::debug!(manifest = %guid.short(), "manifest already stored");
        }
        Ok(guid)
    }

    /// As [`ManifestDirectory::add_manifest`], then replicate to `peers` in the background
    pub async fn add_manifest_replicated(
        &self,
        manifest: Manifest,
        peers: Vec<NodeManifest>,
        factor: u32,
    ) -> Result<(Guid, ReplicationHandle), DirectoryError> {
        let engine = self
            .replication
            .as_ref()
            .ok_or(DirectoryError::ReplicationDisabled)?;
        let guid = self.add_manifest(manifest.clone()).await?;
        let handle = engine.replicate(Payload::Manifest(manifest), peers, factor);
        Ok((guid, handle))
    }

    pub async fn find_manifest(
        &self,
        guid: &Guid,
        scope: FindScope,
    ) -> Result<Manifest, DirectoryError> {
        if guid.is_invalid() {
            return Err(DirectoryError::NotFound(*guid));
        }

        if let Some(manifest) = self.cache.get(guid) {
            tracing::debug!(manifest = %guid.short(), "cache hit");
            return Ok(manifest);
        }

        match self.local.get(guid).await {
            Ok(Some(manifest)) => {
                tracing::debug!(manifest = %guid.short(), "local hit");
                self.cache.insert(manifest.clone());
                return Ok(manifest);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(manifest = %guid.short(), "local store read failed: {}", e),
        }

        if scope == FindScope::Local {
            return Err(DirectoryError::NotFound(*guid));
        }

        let manifest = self
            .remote
            .find(guid)
            .await
            .ok_or(DirectoryError::NotFound(*guid))?;

        let stored = match self.local.put(manifest.clone()).await {
            Ok(stored) => stored.manifest,
            Err(e) => {
                tracing::warn!(manifest = %guid.short(), "failed to backfill local store: {}", e);
                manifest
            }
        };
        self.cache.insert(stored.clone());
        if let Manifest::Version(version) = &stored {
            // known history, but HEAD only moves for versions added here
            self.lineage.record_version(version);
        }
        Ok(stored)
    }

    pub fn add_manifest_dds_mapping(&self, guid: Guid, node: Guid) {
        if self.index.add(guid, node) {
            tracing::debug!(manifest = %guid.short(), node = %node.short(), "added dds mapping");
        }
    }

    pub fn evict_cached(&self, guid: &Guid) -> bool {
        self.cache.evict(guid)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    pub fn index(&self) -> &Arc<PeerDirectoryIndex> {
        &self.index
    }

    pub fn lineage(&self) -> &Arc<VersionLineageTracker> {
        &self.lineage
    }

    pub fn replication(&self) -> Option<&ReplicationEngine> {
        self.replication.as_ref()
    }
}
