//! On-disk layout of a node
//!
//! ```text
//! <root>/
//!   manifests/<guid>.json
//!   data/<guid>
//!   heads/<invariant>.log
//!   dds_index.json
//! ```

pub mod atom_store;

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::guid::Guid;

pub use atom_store::{AtomSource, AtomStore, AtomStoreError};

const MANIFESTS_DIR: &str = "manifests";
const DATA_DIR: &str = "data";
const HEADS_DIR: &str = "heads";
const DDS_INDEX_FILE: &str = "dds_index.json";

/// Paths under a node's root directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Create the directory layout if needed. A relative root is resolved
    /// against the working directory so recorded file locations stay valid.
    pub async fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let storage = Self {
            root: std::path::absolute(root.into())?,
        };
        for dir in [
            storage.manifests_dir(),
            storage.data_dir(),
            storage.heads_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join(MANIFESTS_DIR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn heads_dir(&self) -> PathBuf {
        self.root.join(HEADS_DIR)
    }

    pub fn dds_index_path(&self) -> PathBuf {
        self.root.join(DDS_INDEX_FILE)
    }

    pub fn data_path(&self, guid: &Guid) -> PathBuf {
        self.data_dir().join(guid.to_string())
    }
}

/// Write `bytes` to a sibling temp file, sync it, then rename over `path`
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let mut file = tokio::fs::File::create(&tmp).await?;
    let result = async {
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_layout_created() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).await.unwrap();
        assert!(storage.manifests_dir().is_dir());
        assert!(storage.data_dir().is_dir());
        assert!(storage.heads_dir().is_dir());
        assert_eq!(storage.dds_index_path(), dir.path().join("dds_index.json"));
    }

    #[tokio::test]
    async fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        write_atomic(&path, b"one").await.unwrap();
        write_atomic(&path, b"two").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"two");

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
