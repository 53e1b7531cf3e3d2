//! Node manifests: how to reach a peer and what it offers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ManifestType;
use crate::crypto::PublicKey;
use crate::guid::Guid;

/// A service a node can offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeCapability {
    Agent,
    Storage,
    /// Metadata (manifest) discovery
    Dds,
    /// Node discovery
    Nds,
    /// Metadata management
    Mms,
    /// Context management
    Cms,
    /// Role management
    Rms,
}

impl NodeCapability {
    pub const ALL: [NodeCapability; 7] = [
        NodeCapability::Agent,
        NodeCapability::Storage,
        NodeCapability::Dds,
        NodeCapability::Nds,
        NodeCapability::Mms,
        NodeCapability::Cms,
        NodeCapability::Rms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCapability::Agent => "agent",
            NodeCapability::Storage => "storage",
            NodeCapability::Dds => "dds",
            NodeCapability::Nds => "nds",
            NodeCapability::Mms => "mms",
            NodeCapability::Cms => "cms",
            NodeCapability::Rms => "rms",
        }
    }
}

impl fmt::Display for NodeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown node capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for NodeCapability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        NodeCapability::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// Capability flags as they appear on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeServices {
    pub agent: bool,
    pub storage: bool,
    pub dds: bool,
    pub nds: bool,
    pub mms: bool,
    pub cms: bool,
    pub rms: bool,
}

impl NodeServices {
    pub fn with(capabilities: impl IntoIterator<Item = NodeCapability>) -> Self {
        let mut services = Self::default();
        for capability in capabilities {
            services.set(capability, true);
        }
        services
    }

    pub fn has(&self, capability: NodeCapability) -> bool {
        match capability {
            NodeCapability::Agent => self.agent,
            NodeCapability::Storage => self.storage,
            NodeCapability::Dds => self.dds,
            NodeCapability::Nds => self.nds,
            NodeCapability::Mms => self.mms,
            NodeCapability::Cms => self.cms,
            NodeCapability::Rms => self.rms,
        }
    }

    pub fn set(&mut self, capability: NodeCapability, on: bool) {
        let flag = match capability {
            NodeCapability::Agent => &mut self.agent,
            NodeCapability::Storage => &mut self.storage,
            NodeCapability::Dds => &mut self.dds,
            NodeCapability::Nds => &mut self.nds,
            NodeCapability::Mms => &mut self.mms,
            NodeCapability::Cms => &mut self.cms,
            NodeCapability::Rms => &mut self.rms,
        };
        *flag = on;
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeCapability> + '_ {
        NodeCapability::ALL.into_iter().filter(|c| self.has(*c))
    }
}

/// A peer in the network. The GUID is the hash of its certificate, the
/// base64 Ed25519 public key the node signs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeManifest {
    pub guid: Guid,
    pub certificate: String,
    pub hostname: String,
    pub port: u16,
    #[serde(default)]
    pub services: NodeServices,
}

impl NodeManifest {
    pub fn new(
        public_key: &PublicKey,
        hostname: impl Into<String>,
        port: u16,
        services: NodeServices,
    ) -> Self {
        let certificate = public_key.to_base64();
        Self {
            guid: Guid::hash_str(&certificate),
            certificate,
            hostname: hostname.into(),
            port,
            services,
        }
    }

    pub fn has(&self, capability: NodeCapability) -> bool {
        self.services.has(capability)
    }

    /// `hostname:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        PublicKey::from_base64(&self.certificate).ok()
    }

    pub fn manifest_type(&self) -> ManifestType {
        ManifestType::Node
    }

    pub fn is_valid(&self) -> bool {
        self.guid.is_valid()
            && !self.hostname.is_empty()
            && self.public_key().is_some()
            && Guid::hash_str(&self.certificate) == self.guid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;

    #[test]
    fn test_capability_parse() {
        assert_eq!("STORAGE".parse::<NodeCapability>().unwrap(), NodeCapability::Storage);
        assert_eq!("nds".parse::<NodeCapability>().unwrap(), NodeCapability::Nds);
        assert!("teleport".parse::<NodeCapability>().is_err());
    }

    #[test]
    fn test_services_flags() {
        let services = NodeServices::with([NodeCapability::Storage, NodeCapability::Dds]);
        assert!(services.has(NodeCapability::Storage));
        assert!(!services.has(NodeCapability::Nds));
        assert_eq!(
            services.iter().collect::<Vec<_>>(),
            vec![NodeCapability::Storage, NodeCapability::Dds]
        );
    }

    #[test]
    fn test_node_guid_is_certificate_hash() {
        let key = SecretKey::generate().unwrap();
        let node = NodeManifest::new(&key.public(), "localhost", 8080, NodeServices::default());
        assert_eq!(node.guid, Guid::hash_str(&key.public().to_base64()));
        assert!(node.is_valid());
        assert_eq!(node.address(), "localhost:8080");

        let mut forged = node.clone();
        forged.certificate = SecretKey::generate().unwrap().public().to_base64();
        assert!(!forged.is_valid());
    }
}
