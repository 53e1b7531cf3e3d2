use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use super::MemoryNetwork;
use crate::crypto::SecretKey;
use crate::discovery::MemoryNodeStore;
use crate::guid::Guid;
use crate::manifest::{NodeCapability, NodeManifest, NodeServices};
use crate::sos::{Sos, SosConfig};

/// A test node. Derefs to its [`Sos`]; clones share the node.
#[derive(Debug, Clone)]
pub struct TestPeer {
    /// The name of this peer (for debugging)
    pub name: String,
    sos: Arc<Sos>,
    secret: SecretKey,
}

impl TestPeer {
    /// Open a node rooted at `root` and attach it to `network`
    pub async fn new(
        name: impl Into<String>,
        root: &Path,
        capabilities: &[NodeCapability],
        network: &MemoryNetwork,
        configure: impl FnOnce(&mut SosConfig),
    ) -> Result<Self> {
        let name = name.into();
        let secret = SecretKey::generate()?;
        let node = NodeManifest::new(
            &secret.public(),
            name.clone(),
            0,
            NodeServices::with(capabilities.iter().copied()),
        );

        let mut config = SosConfig::new(root);
        configure(&mut config);

        let sos = Arc::new(
            Sos::open(
                config,
                node,
                Arc::new(MemoryNodeStore::new()),
                Arc::new(network.clone()),
            )
            .await?,
        );
        network.attach(&sos);
        tracing::debug!(peer = %name, guid = %sos.local_node().guid.short(), "test peer started");

        Ok(Self { name, sos, secret })
    }

    pub fn guid(&self) -> Guid {
        self.sos.local_node().guid
    }

    pub fn node(&self) -> &NodeManifest {
        self.sos.local_node()
    }

    pub fn sos(&self) -> &Arc<Sos> {
        &self.sos
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Drop the memory tier and every manifest file, keeping atom bytes
    pub async fn forget_manifests(&self) -> Result<()> {
        self.sos.directory().clear_cache();
        let mut entries = tokio::fs::read_dir(self.sos.storage().manifests_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            tokio::fs::remove_file(entry.path()).await?;
        }
        Ok(())
    }
}

impl Deref for TestPeer {
    type Target = Sos;

    fn deref(&self) -> &Self::Target {
        &self.sos
    }
}
