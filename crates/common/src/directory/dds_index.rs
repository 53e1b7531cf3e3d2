use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::concurrency::ShardedMap;
use crate::guid::Guid;
use crate::storage::write_atomic;

#[derive(Debug, thiserror::Error)]
pub enum DdsIndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode dds index: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Which peers are believed to hold a given manifest or atom.
///
/// Mappings are only ever added. The index lives in memory and is written to
/// `dds_index.json` on [`PeerDirectoryIndex::persist`].
#[derive(Debug)]
pub struct PeerDirectoryIndex {
    entries: ShardedMap<BTreeSet<Guid>>,
    path: PathBuf,
}

impl PeerDirectoryIndex {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, DdsIndexError> {
        let path = path.into();
        let entries = ShardedMap::default();
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let stored: BTreeMap<Guid, BTreeSet<Guid>> = serde_json::from_slice(&bytes)?;
                for (guid, nodes) in stored.into_iter().filter(|(g, _)| g.is_valid()) {
                    entries.insert(guid, nodes);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self { entries, path })
    }

    /// Record that `node` holds `guid`. Returns whether this was new.
    pub fn add(&self, guid: Guid, node: Guid) -> bool {
        if guid.is_invalid() || node.is_invalid() {
            return false;
        }
        self.entries.update_with(guid, |nodes| nodes.insert(node))
    }

    pub fn nodes(&self, guid: &Guid) -> Vec<Guid> {
        self.entries
            .read_with(guid, |nodes| nodes.map(|n| n.iter().copied().collect::<Vec<_>>()))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn persist(&self) -> Result<(), DdsIndexError> {
        let snapshot: BTreeMap<Guid, BTreeSet<Guid>> = self.entries.snapshot().into_iter().collect();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        write_atomic(&self.path, &bytes).await?;
        tracing::debug!(entries = snapshot.len(), "persisted dds index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_additive_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dds_index.json");
        let index = PeerDirectoryIndex::load(&path).await.unwrap();

        let guid = Guid::hash(b"manifest");
        let n1 = Guid::hash(b"n1");
        let n2 = Guid::hash(b"n2");
        assert!(index.add(guid, n1));
        assert!(!index.add(guid, n1));
        assert!(index.add(guid, n2));
        assert!(!index.add(Guid::Invalid, n1));
        index.persist().await.unwrap();

        let reloaded = PeerDirectoryIndex::load(&path).await.unwrap();
        let mut nodes = reloaded.nodes(&guid);
        nodes.sort();
        let mut expected = vec![n1, n2];
        expected.sort();
        assert_eq!(nodes, expected);
        assert!(reloaded.nodes(&Guid::hash(b"unknown")).is_empty());
    }
}
