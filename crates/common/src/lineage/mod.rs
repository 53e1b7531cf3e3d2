//! # Version lineage
//!
//! For every asset (identified by its invariant) this tracks the DAG of
//! versions and the HEAD set: the versions currently considered active.
//!
//! HEAD changes are appended to `heads/<invariant>.log`, one JSON object per
//! line. HEAD is `added \ removed` over the whole log, so entries can be
//! replayed in any order and produce the same result.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::concurrency::KeyedLocks;
use crate::guid::Guid;
use crate::manifest::VersionManifest;

const LOG_EXTENSION: &str = "log";

#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    #[error("invalid guid in lineage operation")]
    InvalidGuid,
    #[error("no lineage for asset {0}")]
    NotFound(Guid),
    #[error("asset {invariant} has {} heads", .heads.len())]
    AmbiguousHead { invariant: Guid, heads: Vec<Guid> },
    #[error("failed to persist head log: {0}")]
    Persist(#[from] std::io::Error),
    #[error("failed to encode head log entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HeadEntry {
    invariant: Guid,
    new: Guid,
    #[serde(default)]
    previous: BTreeSet<Guid>,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct AssetLineage {
    added: BTreeSet<Guid>,
    removed: BTreeSet<Guid>,
    /// version -> its predecessors
    versions: HashMap<Guid, BTreeSet<Guid>>,
}

impl AssetLineage {
    fn apply(&mut self, entry: &HeadEntry) {
        self.added.insert(entry.new);
        self.removed.extend(entry.previous.iter().copied());
        self.record(entry.new, &entry.previous);
    }

    fn record(&mut self, version: Guid, previous: &BTreeSet<Guid>) {
        self.versions
            .entry(version)
            .or_default()
            .extend(previous.iter().copied());
    }

    fn heads(&self) -> BTreeSet<Guid> {
        self.added.difference(&self.removed).copied().collect()
    }

    fn tips(&self) -> BTreeSet<Guid> {
        let superseded: BTreeSet<Guid> = self.versions.values().flatten().copied().collect();
        self.versions
            .keys()
            .filter(|v| !superseded.contains(v))
            .copied()
            .collect()
    }
}

#[derive(Debug)]
pub struct VersionLineageTracker {
    dir: PathBuf,
    assets: RwLock<HashMap<Guid, AssetLineage>>,
    log_locks: KeyedLocks<Guid>,
}

impl VersionLineageTracker {
    /// Open the head logs under `dir`, replaying every entry
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, LineageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut assets: HashMap<Guid, AssetLineage> = HashMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            for head in read_log(&path).await? {
                assets.entry(head.invariant).or_default().apply(&head);
            }
        }
        tracing::debug!(assets = assets.len(), "replayed head logs");

        Ok(Self {
            dir,
            assets: RwLock::new(assets),
            log_locks: KeyedLocks::new(),
        })
    }

    fn log_path(&self, invariant: &Guid) -> PathBuf {
        self.dir.join(format!("{}.{}", invariant, LOG_EXTENSION))
    }

    /// Make `new` a head of `invariant`, retiring every member of `previous`
    pub async fn advance_head(
        &self,
        invariant: Guid,
        previous: &BTreeSet<Guid>,
        new: Guid,
    ) -> Result<(), LineageError> {
        if invariant.is_invalid() || new.is_invalid() || previous.iter().any(Guid::is_invalid) {
            return Err(LineageError::InvalidGuid);
        }
        let entry = HeadEntry {
            invariant,
            new,
            previous: previous.clone(),
            at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let _guard = self.log_locks.lock(invariant).await;
        let applied = self
            .assets
            .read()
            .get(&invariant)
            .is_some_and(|a| a.added.contains(&new));
        if applied {
            return Ok(());
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(&invariant))
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;

        self.assets.write().entry(invariant).or_default().apply(&entry);
        tracing::debug!(asset = %invariant.short(), head = %new.short(), "advanced head");
        Ok(())
    }

    /// Add a version to the DAG without touching HEAD
    pub fn record_version(&self, version: &VersionManifest) {
        if !version.is_valid() {
            return;
        }
        self.assets
            .write()
            .entry(version.invariant)
            .or_default()
            .record(version.guid, &version.previous);
    }

    pub fn get_heads(&self, invariant: &Guid) -> BTreeSet<Guid> {
        self.assets
            .read()
            .get(invariant)
            .map(AssetLineage::heads)
            .unwrap_or_default()
    }

    /// The single current head, or an error listing the HEAD set
    pub fn get_head(&self, invariant: &Guid) -> Result<Guid, LineageError> {
        let assets = self.assets.read();
        let asset = assets
            .get(invariant)
            .ok_or(LineageError::NotFound(*invariant))?;
        let heads = asset.heads();
        if let (1, Some(head)) = (heads.len(), heads.first()) {
            return Ok(*head);
        }
        Err(LineageError::AmbiguousHead {
            invariant: *invariant,
            heads: heads.into_iter().collect(),
        })
    }

    /// Versions with no known successor
    pub fn get_tips(&self, invariant: &Guid) -> BTreeSet<Guid> {
        self.assets
            .read()
            .get(invariant)
            .map(AssetLineage::tips)
            .unwrap_or_default()
    }

    /// The DAG of `invariant` as version -> predecessors
    pub fn versions(&self, invariant: &Guid) -> BTreeMap<Guid, BTreeSet<Guid>> {
        self.assets
            .read()
            .get(invariant)
            .map(|a| {
                a.versions
                    .iter()
                    .map(|(v, p)| (*v, p.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn invariants(&self) -> Vec<Guid> {
        self.assets.read().keys().copied().collect()
    }
}

async fn read_log(path: &Path) -> Result<Vec<HeadEntry>, LineageError> {
    let text = tokio::fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            // a crash mid-append leaves a torn last line
            Err(e) => tracing::warn!(path = ?path, line = n + 1, "skipping bad head log entry: {}", e),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(s: &str) -> Guid {
        Guid::hash(s.as_bytes())
    }

    #[tokio::test]
    async fn test_linear_history() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VersionLineageTracker::open(dir.path()).await.unwrap();
        let asset = g("asset");

        tracker.advance_head(asset, &BTreeSet::new(), g("v1")).await.unwrap();
        assert_eq!(tracker.get_head(&asset).unwrap(), g("v1"));

        tracker.advance_head(asset, &BTreeSet::from([g("v1")]), g("v2")).await.unwrap();
        assert_eq!(tracker.get_head(&asset).unwrap(), g("v2"));
        assert_eq!(tracker.get_tips(&asset), BTreeSet::from([g("v2")]));
        assert_eq!(tracker.versions(&asset).len(), 2);
    }

    #[tokio::test]
    async fn test_fork_is_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VersionLineageTracker::open(dir.path()).await.unwrap();
        let asset = g("asset");
        let root = BTreeSet::from([g("v1")]);

        tracker.advance_head(asset, &BTreeSet::new(), g("v1")).await.unwrap();
        tracker.advance_head(asset, &root, g("a")).await.unwrap();
        tracker.advance_head(asset, &root, g("b")).await.unwrap();

        assert_eq!(tracker.get_heads(&asset), BTreeSet::from([g("a"), g("b")]));
        match tracker.get_head(&asset) {
            Err(LineageError::AmbiguousHead { heads, .. }) => assert_eq!(heads.len(), 2),
            other => panic!("expected ambiguous head, got {:?}", other),
        }

        // merging both branches resolves it
        tracker
            .advance_head(asset, &BTreeSet::from([g("a"), g("b")]), g("m"))
            .await
            .unwrap();
        assert_eq!(tracker.get_head(&asset).unwrap(), g("m"));
    }

    #[tokio::test]
    async fn test_replay_order_does_not_matter() {
        let dir = tempfile::tempdir().unwrap();
        let asset = g("asset");
        {
            let tracker = VersionLineageTracker::open(dir.path()).await.unwrap();
            // successor logged before its predecessor
            tracker
                .advance_head(asset, &BTreeSet::from([g("v1")]), g("v2"))
                .await
                .unwrap();
            tracker.advance_head(asset, &BTreeSet::new(), g("v1")).await.unwrap();
            assert_eq!(tracker.get_head(&asset).unwrap(), g("v2"));
        }

        let reopened = VersionLineageTracker::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get_head(&asset).unwrap(), g("v2"));
        assert_eq!(reopened.invariants(), vec![asset]);
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let asset = g("asset");
        {
            let tracker = VersionLineageTracker::open(dir.path()).await.unwrap();
            tracker.advance_head(asset, &BTreeSet::new(), g("v1")).await.unwrap();
        }
        let path = dir.path().join(format!("{}.log", asset));
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("{\"invariant\":");
        std::fs::write(&path, text).unwrap();

        let reopened = VersionLineageTracker::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get_head(&asset).unwrap(), g("v1"));
    }

    #[tokio::test]
    async fn test_recorded_versions_do_not_move_head() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VersionLineageTracker::open(dir.path()).await.unwrap();
        let root = VersionManifest::root(g("content"), None);
        let next = VersionManifest::next(root.invariant, g("content2"), [root.guid], None);

        tracker
            .advance_head(root.invariant, &BTreeSet::new(), root.guid)
            .await
            .unwrap();
        tracker.record_version(&next);

        assert_eq!(tracker.get_head(&root.invariant).unwrap(), root.guid);
        assert_eq!(tracker.get_tips(&root.invariant), BTreeSet::from([next.guid]));
    }

    #[tokio::test]
    async fn test_repeated_advance_is_logged_once() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VersionLineageTracker::open(dir.path()).await.unwrap();
        let asset = g("asset");

        for _ in 0..3 {
            tracker.advance_head(asset, &BTreeSet::new(), g("v1")).await.unwrap();
        }
        let text = std::fs::read_to_string(dir.path().join(format!("{}.log", asset))).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert_eq!(tracker.get_head(&asset).unwrap(), g("v1"));
    }

    #[tokio::test]
    async fn test_unknown_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VersionLineageTracker::open(dir.path()).await.unwrap();
        assert!(matches!(
            tracker.get_head(&g("nothing")),
            Err(LineageError::NotFound(_))
        ));
        assert!(matches!(
            tracker.advance_head(Guid::Invalid, &BTreeSet::new(), g("v")).await,
            Err(LineageError::InvalidGuid)
        ));
    }
}
