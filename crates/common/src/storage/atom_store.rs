//! Atom bytes: persisting them locally and finding them again
//!
//! An atom may have copies in several places (its [`LocationBundle`]s).
//! Reads walk the bundles in order and accept the first copy whose hash
//! matches the atom's GUID.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;

use super::{write_atomic, LocalStorage};
use crate::discovery::NodeDiscoveryService;
use crate::guid::{Guid, GuidHasher};
use crate::manifest::{BundleKind, Location, LocationBundle, LocationError};
use crate::peer::{PeerClient, ProtocolError};

#[derive(Debug, thiserror::Error)]
pub enum AtomStoreError {
    #[error("atom not found: {0}")]
    NotFound(Guid),
    #[error("invalid guid")]
    InvalidGuid,
    #[error("challenge must not be empty")]
    EmptyChallenge,
    #[error("location {0} could not be read: {1}")]
    Unreachable(String, String),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: Guid, actual: Guid },
    #[error("failed to persist atom: {0}")]
    Persist(#[from] std::io::Error),
    #[error(transparent)]
    Location(#[from] LocationError),
}

/// Where new atom bytes come from
#[derive(Debug, Clone)]
pub enum AtomSource {
    Bytes(Bytes),
    /// Bytes to fetch from somewhere; the origin is kept as provenance
    Location(Location),
}

impl From<Bytes> for AtomSource {
    fn from(bytes: Bytes) -> Self {
        AtomSource::Bytes(bytes)
    }
}

impl From<Location> for AtomSource {
    fn from(location: Location) -> Self {
        AtomSource::Location(location)
    }
}

#[derive(Debug)]
pub struct AtomStore {
    storage: LocalStorage,
    local_node: Guid,
    discovery: Arc<NodeDiscoveryService>,
    client: Arc<dyn PeerClient>,
}

impl AtomStore {
    pub fn new(
        storage: LocalStorage,
        discovery: Arc<NodeDiscoveryService>,
        client: Arc<dyn PeerClient>,
    ) -> Self {
        Self {
            storage,
            local_node: discovery.local_node().guid,
            discovery,
            client,
        }
    }

    /// Persist an atom locally.
    ///
    /// Returns the atom's GUID and `existing` extended with a `kind` bundle
    /// for the local copy (and a provenance bundle for a fetched source).
    pub async fn store(
        &self,
        source: AtomSource,
        kind: BundleKind,
        existing: BTreeSet<LocationBundle>,
    ) -> Result<(Guid, BTreeSet<LocationBundle>), AtomStoreError> {
        let mut bundles = existing;
        let bytes = match source {
            AtomSource::Bytes(bytes) => bytes,
            AtomSource::Location(origin) => {
                let bytes = self.read_location(&origin).await?;
                bundles.insert(LocationBundle::provenance(origin));
                bytes
            }
        };

        let guid = Guid::hash(&bytes);
        let path = self.persist(guid, &bytes).await?;
        bundles.insert(LocationBundle::new(kind, Location::file(path)?));

        tracing::info!(atom = %guid.short(), size = bytes.len(), "stored atom");
        Ok((guid, bundles))
    }

    async fn persist(&self, guid: Guid, bytes: &[u8]) -> Result<std::path::PathBuf, AtomStoreError> {
        let path = self.storage.data_path(&guid);
        if !tokio::fs::try_exists(&path).await? {
            write_atomic(&path, bytes).await.map_err(|e| {
                tracing::error!(atom = %guid.short(), "failed to write atom: {}", e);
                e
            })?;
        }
        Ok(path)
    }

    /// Return the bytes of the first bundle that resolves and verifies
    pub async fn get_content(
        &self,
        guid: &Guid,
        bundles: &BTreeSet<LocationBundle>,
    ) -> Result<Bytes, AtomStoreError> {
        if guid.is_invalid() {
            return Err(AtomStoreError::InvalidGuid);
        }

        for bundle in bundles {
            match self.read_location(&bundle.location).await {
                Ok(bytes) => {
                    let actual = Guid::hash(&bytes);
                    if actual == *guid {
                        tracing::debug!(atom = %guid.short(), location = %bundle.location, "resolved atom");
                        return Ok(bytes);
                    }
                    tracing::warn!(
                        atom = %guid.short(),
                        location = %bundle.location,
                        actual = %actual.short(),
                        "skipping corrupt location"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        atom = %guid.short(),
                        location = %bundle.location,
                        "skipping unreachable location: {}",
                        e
                    );
                }
            }
        }
        Err(AtomStoreError::NotFound(*guid))
    }

    /// Bytes of a locally held atom, verified against its GUID
    pub async fn get_local(&self, guid: &Guid) -> Result<Bytes, AtomStoreError> {
        if guid.is_invalid() {
            return Err(AtomStoreError::InvalidGuid);
        }
        let bytes = match tokio::fs::read(self.storage.data_path(guid)).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AtomStoreError::NotFound(*guid))
            }
            Err(e) => return Err(e.into()),
        };
        let actual = Guid::hash(&bytes);
        if actual != *guid {
            return Err(AtomStoreError::Integrity {
                expected: *guid,
                actual,
            });
        }
        Ok(bytes)
    }

    /// Re-hash the bytes at `bundle` and compare with `guid`
    pub async fn verify_integrity(&self, guid: &Guid, bundle: &LocationBundle) -> bool {
        if guid.is_invalid() {
            return false;
        }
        match self.read_location(&bundle.location).await {
            Ok(bytes) => Guid::hash(&bytes) == *guid,
            Err(_) => false,
        }
    }

    /// Hash of the local bytes followed by the challenge text.
    ///
    /// Proves possession without shipping the bytes. `Invalid` when the atom
    /// is not held here.
    pub async fn challenge(&self, guid: &Guid, challenge: &str) -> Result<Guid, AtomStoreError> {
        if challenge.is_empty() {
            return Err(AtomStoreError::EmptyChallenge);
        }
        let bytes = match self.get_local(guid).await {
            Ok(bytes) => bytes,
            Err(AtomStoreError::NotFound(_)) | Err(AtomStoreError::InvalidGuid) => {
                return Ok(Guid::Invalid)
            }
            Err(e) => return Err(e),
        };
        let mut hasher = GuidHasher::new();
        hasher.update(&bytes);
        hasher.update(challenge.as_bytes());
        Ok(hasher.finish())
    }

    pub async fn has_local(&self, guid: &Guid) -> bool {
        guid.is_valid()
            && tokio::fs::try_exists(self.storage.data_path(guid))
                .await
                .unwrap_or(false)
    }

    /// A bundle pointing at the local copy, if there is one
    pub async fn local_bundle(&self, guid: &Guid, kind: BundleKind) -> Option<LocationBundle> {
        if self.has_local(guid).await {
            let location = Location::file(self.storage.data_path(guid)).ok()?;
            Some(LocationBundle::new(kind, location))
        } else {
            None
        }
    }

    /// How other nodes should refer to the local copy
    pub fn node_location(&self, guid: Guid) -> Location {
        Location::node(self.local_node, guid)
    }

    async fn read_location(&self, location: &Location) -> Result<Bytes, AtomStoreError> {
        let unreadable = |e: &dyn std::fmt::Display| {
            AtomStoreError::Unreachable(location.to_string(), e.to_string())
        };
        match location {
            Location::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| unreadable(&e)),
            Location::Node { node, atom } if *node == self.local_node => self.get_local(atom).await,
            Location::Node { node, atom } => {
                let peer = self
                    .discovery
                    .get_node(node)
                    .await
                    .map_err(|e| unreadable(&e))?;
                self.client
                    .fetch_atom_data(&peer, *atom)
                    .await
                    .map_err(|e: ProtocolError| unreadable(&e))
            }
            Location::Url(url) => self
                .client
                .fetch_url(url)
                .await
                .map_err(|e| unreadable(&e)),
        }
    }
}
