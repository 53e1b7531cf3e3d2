use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use super::{Fault, MemoryNetwork, TestPeer};
use crate::manifest::NodeCapability;
use crate::sos::SosConfig;

/// A coordinator for multiple test peers
///
/// Owns the temp directory every peer is rooted in and the shared
/// [`MemoryNetwork`] they talk through.
pub struct TestNetwork {
    dir: TempDir,
    network: MemoryNetwork,
    /// All peers in the network, indexed by name
    peers: HashMap<String, TestPeer>,
    push_timeout: Duration,
    max_concurrent_pushes: Option<usize>,
    discovery_timeout: Duration,
}

impl TestNetwork {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            network: MemoryNetwork::new(),
            peers: HashMap::new(),
            push_timeout: Duration::from_secs(2),
            max_concurrent_pushes: None,
            discovery_timeout: Duration::from_secs(2),
        })
    }

    /// Deadline applied to every replication push of peers added afterwards
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    /// Size of the push pool of peers added afterwards
    pub fn with_max_concurrent_pushes(mut self, permits: usize) -> Self {
        self.max_concurrent_pushes = Some(permits);
        self
    }

    /// Deadline applied to remote node lookups of peers added afterwards
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Add a new peer to the network
    pub async fn add_peer(
        &mut self,
        name: impl Into<String>,
        capabilities: &[NodeCapability],
    ) -> Result<TestPeer> {
        let name = name.into();
        if self.peers.contains_key(&name) {
            return Err(anyhow::anyhow!("Peer '{}' already exists", name));
        }

        let push_timeout = self.push_timeout;
        let max_concurrent_pushes = self.max_concurrent_pushes;
        let discovery_timeout = self.discovery_timeout;
        let peer = TestPeer::new(
            name.clone(),
            &self.dir.path().join(&name),
            capabilities,
            &self.network,
            |config: &mut SosConfig| {
                config.push_timeout = push_timeout;
                if let Some(permits) = max_concurrent_pushes {
                    config.max_concurrent_pushes = permits;
                }
                config.discovery_timeout = discovery_timeout;
            },
        )
        .await?;

        self.peers.insert(name, peer.clone());
        Ok(peer)
    }

    /// Get a peer by name
    pub fn peer(&self, name: &str) -> Option<&TestPeer> {
        self.peers.get(name)
    }

    /// Get all peer names
    pub fn peer_names(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// Register every peer with every other peer, locally only
    pub async fn introduce_all_peers(&self) -> Result<()> {
        for peer in self.peers.values() {
            for other in self.peers.values() {
                if peer.guid() != other.guid() {
                    peer.register_node(other.node().clone(), true).await?;
                }
            }
        }
        tracing::debug!("introduced {} peers to each other", self.peers.len());
        Ok(())
    }

    pub fn set_fault(&self, name: &str, fault: Option<Fault>) -> Result<()> {
        let peer = self
            .peers
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no peer named '{}'", name))?;
        self.network.set_fault(peer.guid(), fault);
        Ok(())
    }

    /// Shutdown all peers in the network
    pub async fn shutdown(&mut self) -> Result<()> {
        for (name, peer) in self.peers.drain() {
            if let Err(e) = peer.shutdown().await {
                tracing::error!("Error stopping peer {}: {}", name, e);
            }
            self.network.detach(&peer.guid());
        }
        Ok(())
    }

    /// Poll a condition until it succeeds or times out
    pub async fn eventually<F, Fut>(&self, timeout: Duration, condition: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(20);

        loop {
            if condition().await {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(anyhow::anyhow!(
                    "Condition not met within timeout ({:?})",
                    timeout
                ));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
