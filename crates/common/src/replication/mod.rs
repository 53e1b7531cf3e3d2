//! # Replication
//!
//! Pushes a manifest or an atom's bytes to peers until a replication factor
//! is met or the candidates run out. Work happens in the background; callers
//! get a [`ReplicationHandle`] immediately.
//!
//! Pushes go out in waves: each wave asks exactly as many new peers as there
//! are copies still missing. Every push is its own task, gated by a shared
//! semaphore and awaited under a deadline. A push that misses its deadline
//! is abandoned and cannot affect the report.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use crate::directory::PeerDirectoryIndex;
use crate::guid::Guid;
use crate::manifest::{AtomManifest, Manifest, NodeCapability, NodeManifest};
use crate::peer::{AtomPush, PeerClient, ProtocolError};

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENT_PUSHES: usize = 16;
const STATUS_CAPACITY: usize = 4096;

/// What to replicate
#[derive(Debug, Clone)]
pub enum Payload {
    Manifest(Manifest),
    Atom { guid: Guid, data: Bytes },
}

impl Payload {
    pub fn guid(&self) -> Guid {
        match self {
            Payload::Manifest(manifest) => manifest.guid(),
            Payload::Atom { guid, .. } => *guid,
        }
    }

    /// Capability a peer needs to accept this payload
    pub fn capability(&self) -> NodeCapability {
        match self {
            Payload::Manifest(_) => NodeCapability::Dds,
            Payload::Atom { .. } => NodeCapability::Storage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplicationOutcome {
    /// The factor was met
    Successful,
    /// Candidates ran out before the factor was met
    Unsuccessful,
    /// The factor was not met and at least one push timed out
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationReport {
    pub id: Uuid,
    pub guid: Guid,
    pub factor: u32,
    pub outcome: ReplicationOutcome,
    pub successes: Vec<Guid>,
    pub failures: Vec<Guid>,
    pub timeouts: Vec<Guid>,
    /// Atom manifests returned by receivers of atom pushes
    pub receipts: Vec<AtomManifest>,
}

impl ReplicationReport {
    fn new(id: Uuid, guid: Guid, factor: u32) -> Self {
        Self {
            id,
            guid,
            factor,
            outcome: ReplicationOutcome::Unsuccessful,
            successes: Vec::new(),
            failures: Vec::new(),
            timeouts: Vec::new(),
            receipts: Vec::new(),
        }
    }

    fn settle(&mut self) {
        self.outcome = if self.successes.len() >= self.factor as usize {
            ReplicationOutcome::Successful
        } else if !self.timeouts.is_empty() {
            ReplicationOutcome::Error
        } else {
            ReplicationOutcome::Unsuccessful
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationStatus {
    Pending,
    Finished(ReplicationReport),
}

/// Handle to one background replication
#[derive(Debug, Clone)]
pub struct ReplicationHandle {
    id: Uuid,
    guid: Guid,
    factor: u32,
    rx: watch::Receiver<Option<ReplicationReport>>,
}

impl ReplicationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the final report
    pub async fn outcome(mut self) -> ReplicationReport {
        loop {
            if let Some(report) = self.rx.borrow_and_update().clone() {
                return report;
            }
            if self.rx.changed().await.is_err() {
                // the worker went away without reporting
                let mut report = ReplicationReport::new(self.id, self.guid, self.factor);
                report.outcome = ReplicationOutcome::Error;
                return report;
            }
        }
    }
}

#[derive(Debug, Default)]
struct StatusTable {
    entries: HashMap<Uuid, ReplicationStatus>,
    finished: VecDeque<Uuid>,
}

impl StatusTable {
    fn finish(&mut self, report: ReplicationReport) {
        let id = report.id;
        self.entries.insert(id, ReplicationStatus::Finished(report));
        self.finished.push_back(id);
        while self.finished.len() > STATUS_CAPACITY {
            if let Some(oldest) = self.finished.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

#[derive(Debug)]
struct Shared {
    local: Guid,
    client: Arc<dyn PeerClient>,
    index: Arc<PeerDirectoryIndex>,
    permits: Arc<Semaphore>,
    push_timeout: Duration,
    statuses: Mutex<StatusTable>,
}

#[derive(Debug, Clone)]
pub struct ReplicationEngine {
    shared: Arc<Shared>,
}

enum PushResult {
    Stored(Option<AtomManifest>),
    Failed(ProtocolError),
    TimedOut,
}

impl ReplicationEngine {
    pub fn new(
        local: Guid,
        client: Arc<dyn PeerClient>,
        index: Arc<PeerDirectoryIndex>,
        max_concurrent_pushes: usize,
        push_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                local,
                client,
                index,
                permits: Arc::new(Semaphore::new(max_concurrent_pushes.max(1))),
                push_timeout,
                statuses: Mutex::new(StatusTable::default()),
            }),
        }
    }

    /// Start replicating `payload` to up to `factor` of `candidates`
    pub fn replicate(
        &self,
        payload: Payload,
        candidates: Vec<NodeManifest>,
        factor: u32,
    ) -> ReplicationHandle {
        let id = Uuid::new_v4();
        let guid = payload.guid();
        let (tx, rx) = watch::channel(None);
        self.shared
            .statuses
            .lock()
            .entries
            .insert(id, ReplicationStatus::Pending);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let report = run(&shared, id, payload, candidates, factor).await;
            tracing::info!(
                id = %id,
                guid = %report.guid.short(),
                outcome = ?report.outcome,
                successes = report.successes.len(),
                failures = report.failures.len(),
                timeouts = report.timeouts.len(),
                factor,
                "replication finished"
            );
            shared.statuses.lock().finish(report.clone());
            let _ = tx.send(Some(report));
        });

        ReplicationHandle {
            id,
            guid,
            factor,
            rx,
        }
    }

    pub fn status(&self, id: &Uuid) -> Option<ReplicationStatus> {
        self.shared.statuses.lock().entries.get(id).cloned()
    }

    /// Close the push pool. Queued and future pushes fail immediately.
    pub fn shutdown(&self) {
        self.shared.permits.close();
    }
}

fn eligible(shared: &Shared, payload: &Payload, candidates: Vec<NodeManifest>) -> Vec<NodeManifest> {
    let capability = payload.capability();
    let mut seen = HashSet::from([shared.local]);
    candidates
        .into_iter()
        .filter(|n| n.has(capability) && seen.insert(n.guid))
        .collect()
}

async fn run(
    shared: &Arc<Shared>,
    id: Uuid,
    payload: Payload,
    candidates: Vec<NodeManifest>,
    factor: u32,
) -> ReplicationReport {
    let mut report = ReplicationReport::new(id, payload.guid(), factor);
    let mut remaining = eligible(shared, &payload, candidates).into_iter();
    let payload = Arc::new(payload);

    while report.successes.len() < factor as usize {
        let missing = factor as usize - report.successes.len();
        let wave: Vec<NodeManifest> = remaining.by_ref().take(missing).collect();
        if wave.is_empty() {
            break;
        }

        let mut pushes: FuturesUnordered<_> = wave
            .into_iter()
            .map(|node| {
                let task = tokio::spawn(push(shared.clone(), node.clone(), payload.clone()));
                async move {
                    let result = match task.await {
                        Ok(result) => result,
                        Err(e) => PushResult::Failed(ProtocolError::Transport(e.to_string())),
                    };
                    (node, result)
                }
            })
            .collect();

        while let Some((node, result)) = pushes.next().await {
            match result {
                PushResult::Stored(receipt) => {
                    shared.index.add(report.guid, node.guid);
                    report.successes.push(node.guid);
                    report.receipts.extend(receipt);
                }
                PushResult::Failed(e) => {
                    tracing::warn!(
                        guid = %report.guid.short(),
                        node = %node.guid.short(),
                        "replication push failed: {}",
                        e
                    );
                    report.failures.push(node.guid);
                }
                PushResult::TimedOut => {
                    tracing::warn!(
                        guid = %report.guid.short(),
                        node = %node.guid.short(),
                        "replication push timed out"
                    );
                    report.timeouts.push(node.guid);
                }
            }
        }
    }

    report.settle();
    report
}

async fn push(shared: Arc<Shared>, node: NodeManifest, payload: Arc<Payload>) -> PushResult {
    let _permit = match shared.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return PushResult::Failed(ProtocolError::Transport(
                "replication pool is shut down".into(),
            ))
        }
    };

    // the deadline starts once a permit is held; on expiry the call is
    // dropped and the permit goes back to the pool
    match tokio::time::timeout(shared.push_timeout, send(&shared, &node, &payload)).await {
        Ok(result) => result,
        Err(_) => PushResult::TimedOut,
    }
}

async fn send(shared: &Shared, node: &NodeManifest, payload: &Payload) -> PushResult {
    match payload {
        Payload::Manifest(manifest) => match shared.client.push_manifest(node, manifest).await {
            Ok(()) => PushResult::Stored(None),
            Err(e) => PushResult::Failed(e),
        },
        Payload::Atom { guid, data } => {
            let request = AtomPush::new(data.clone()).with_guid(*guid);
            match shared.client.push_atom(node, request).await {
                Ok(receipt) if receipt.guid == *guid => PushResult::Stored(Some(receipt)),
                Ok(receipt) => PushResult::Failed(ProtocolError::Decode(format!(
                    "receiver stored {} instead of {}",
                    receipt.guid, guid
                ))),
                Err(e) => PushResult::Failed(e),
            }
        }
    }
}
