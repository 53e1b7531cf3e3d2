//! Durable manifest tier: one JSON file per manifest
//!
//! Atoms merge on conflict. The merge is crash safe:
//!
//! 1. copy `<name>` to `<name>.bak`
//! 2. write the union to `<name>.new`
//! 3. remove `<name>`, rename `<name>.new` to `<name>`
//! 4. remove `<name>.bak`
//!
//! [`LocalManifestStore::open`] finishes or rolls back whatever a crash left.

use std::path::{Path, PathBuf};

use crate::concurrency::KeyedLocks;
use crate::guid::Guid;
use crate::manifest::{Manifest, ManifestError, VersionManifest};
use crate::storage::write_atomic;

const EXTENSION: &str = "json";
const NEW_SUFFIX: &str = ".new";
const BAK_SUFFIX: &str = ".bak";

#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("a different manifest is already stored under {0}")]
    Conflict(Guid),
}

/// Outcome of [`LocalManifestStore::put`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    /// What is now on disk
    pub manifest: Manifest,
    /// False when the record on disk already covered the incoming manifest
    pub written: bool,
}

impl Stored {
    fn new(manifest: Manifest, written: bool) -> Self {
        Self { manifest, written }
    }
}

#[derive(Debug)]
pub struct LocalManifestStore {
    dir: PathBuf,
    locks: KeyedLocks<Guid>,
}

impl LocalManifestStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, LocalStoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        recover(&dir).await?;
        Ok(Self {
            dir,
            locks: KeyedLocks::new(),
        })
    }

    fn path(&self, guid: &Guid) -> PathBuf {
        self.dir.join(format!("{}.{}", guid, EXTENSION))
    }

    pub async fn get(&self, guid: &Guid) -> Result<Option<Manifest>, LocalStoreError> {
        read_manifest(&self.path(guid)).await
    }

    /// Store a manifest, merging atoms with any existing record.
    ///
    /// Storing a manifest the disk already covers writes nothing.
    pub async fn put(&self, manifest: Manifest) -> Result<Stored, LocalStoreError> {
        let guid = manifest.guid();
        let _guard = self.locks.lock(guid).await;
        let path = self.path(&guid);

        let existing = match read_manifest(&path).await? {
            None => {
                write_atomic(&path, &manifest.to_json()?).await?;
                return Ok(Stored::new(manifest, true));
            }
            Some(existing) => existing,
        };

        match (existing, manifest) {
            (Manifest::Atom(mut existing), Manifest::Atom(incoming)) => {
                if !existing.merge(&incoming) {
                    return Ok(Stored::new(Manifest::Atom(existing), false));
                }
                let merged = Manifest::Atom(existing);
                merge_in_place(&path, &merged.to_json()?).await?;
                tracing::debug!(atom = %guid.short(), "merged atom locations");
                Ok(Stored::new(merged, true))
            }
            (existing, incoming) if existing == incoming => Ok(Stored::new(existing, false)),
            _ => Err(LocalStoreError::Conflict(guid)),
        }
    }

    /// Every stored version manifest
    pub async fn versions(&self) -> Result<Vec<VersionManifest>, LocalStoreError> {
        let mut versions = Vec::new();
        for path in self.manifest_files().await? {
            match read_manifest(&path).await {
                Ok(Some(Manifest::Version(version))) => versions.push(version),
                Ok(_) => {}
                Err(e) => tracing::warn!(path = ?path, "skipping unreadable manifest: {}", e),
            }
        }
        Ok(versions)
    }

    /// GUIDs of every stored manifest
    pub async fn guids(&self) -> Result<Vec<Guid>, LocalStoreError> {
        Ok(self
            .manifest_files()
            .await?
            .iter()
            .filter_map(|p| p.file_stem())
            .map(|s| Guid::parse_lossy(&s.to_string_lossy()))
            .filter(Guid::is_valid)
            .collect())
    }

    async fn manifest_files(&self) -> Result<Vec<PathBuf>, LocalStoreError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn read_manifest(path: &Path) -> Result<Option<Manifest>, LocalStoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(Manifest::from_json(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn merge_in_place(path: &Path, merged: &[u8]) -> Result<(), LocalStoreError> {
    let bak = with_suffix(path, BAK_SUFFIX);
    let new = with_suffix(path, NEW_SUFFIX);

    tokio::fs::copy(path, &bak).await?;
    write_atomic(&new, merged).await?;
    tokio::fs::remove_file(path).await?;
    tokio::fs::rename(&new, path).await?;
    tokio::fs::remove_file(&bak).await?;
    Ok(())
}

/// Finish or roll back merges interrupted by a crash
async fn recover(dir: &Path) -> Result<(), LocalStoreError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut leftovers = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') && name.ends_with(".tmp") {
            tokio::fs::remove_file(entry.path()).await?;
        } else if name.ends_with(NEW_SUFFIX) || name.ends_with(BAK_SUFFIX) {
            leftovers.push(entry.path());
        }
    }
    // handle .new before .bak so a completed merge wins over its backup
    leftovers.sort_by_key(|p| !p.to_string_lossy().ends_with(NEW_SUFFIX));

    for leftover in leftovers {
        let text = leftover.to_string_lossy();
        let suffix = if text.ends_with(NEW_SUFFIX) {
            NEW_SUFFIX
        } else {
            BAK_SUFFIX
        };
        let main = PathBuf::from(&text[..text.len() - suffix.len()]);

        let main_exists = tokio::fs::try_exists(&main).await?;
        let usable = suffix == NEW_SUFFIX && read_manifest(&leftover).await.is_ok()
            || suffix == BAK_SUFFIX;
        if !main_exists && usable {
            tracing::warn!(path = ?main, "restoring manifest from {}", suffix);
            tokio::fs::rename(&leftover, &main).await?;
        } else {
            tokio::fs::remove_file(&leftover).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{AtomManifest, CompoundManifest, CompoundType, Content, LocationBundle};

    fn atom(location: &str) -> Manifest {
        AtomManifest::new(
            Guid::hash(b"atom"),
            [LocationBundle::cache(location.parse().unwrap())],
        )
        .into()
    }

    #[tokio::test]
    async fn test_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalManifestStore::open(dir.path()).await.unwrap();
        let manifest = atom("file:///a");

        assert!(store.get(&manifest.guid()).await.unwrap().is_none());
        store.put(manifest.clone()).await.unwrap();
        assert_eq!(store.get(&manifest.guid()).await.unwrap(), Some(manifest.clone()));
        assert_eq!(store.guids().await.unwrap(), vec![manifest.guid()]);
    }

    #[tokio::test]
    async fn test_atom_merge_leaves_no_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalManifestStore::open(dir.path()).await.unwrap();

        store.put(atom("file:///a")).await.unwrap();
        let merged = store.put(atom("file:///b")).await.unwrap();
        assert!(merged.written);
        assert_eq!(merged.manifest.as_atom().unwrap().locations.len(), 2);

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_covered_atom_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalManifestStore::open(dir.path()).await.unwrap();

        store.put(atom("file:///a")).await.unwrap();
        store.put(atom("file:///b")).await.unwrap();
        let again = store.put(atom("file:///a")).await.unwrap();
        assert!(!again.written);
        assert_eq!(again.manifest.as_atom().unwrap().locations.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_merges_converge() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(LocalManifestStore::open(dir.path()).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.put(atom(&format!("file:///copy/{}", i))).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stored = store.get(&Guid::hash(b"atom")).await.unwrap().unwrap();
        assert_eq!(stored.as_atom().unwrap().locations.len(), 16);
    }

    #[tokio::test]
    async fn test_non_atom_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalManifestStore::open(dir.path()).await.unwrap();
        let compound = CompoundManifest::new(CompoundType::Data, [Content::new("a", Guid::hash(b"a"))]);

        assert!(store.put(compound.clone().into()).await.unwrap().written);
        // same content is a no-op
        let again = store.put(compound.clone().into()).await.unwrap();
        assert!(!again.written);
        assert_eq!(again.manifest, Manifest::from(compound.clone()));

        let mut forged = compound.clone();
        forged.signature = Some("forged".into());
        assert!(matches!(
            store.put(forged.into()).await,
            Err(LocalStoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_recovery_restores_from_new_and_bak() {
        let dir = tempfile::tempdir().unwrap();
        let a = atom("file:///a");
        let b: Manifest = AtomManifest::new(
            Guid::hash(b"other"),
            [LocationBundle::cache("file:///o".parse().unwrap())],
        )
        .into();

        // crash after removing the main file: only .new and .bak remain
        let main_a = dir.path().join(format!("{}.json", a.guid()));
        std::fs::write(with_suffix(&main_a, ".new"), a.to_json().unwrap()).unwrap();
        std::fs::write(with_suffix(&main_a, ".bak"), b"stale").unwrap();

        // crash before the .new was written: only .bak remains
        let main_b = dir.path().join(format!("{}.json", b.guid()));
        std::fs::write(with_suffix(&main_b, ".bak"), b.to_json().unwrap()).unwrap();

        let store = LocalManifestStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get(&a.guid()).await.unwrap(), Some(a));
        assert_eq!(store.get(&b.guid()).await.unwrap(), Some(b));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
