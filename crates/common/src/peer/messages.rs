//! Wire messages of the peer protocol that are not manifests themselves

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::guid::Guid;

/// Which nodes a receiver should replicate a pushed atom to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeSelection {
    /// Keep it here, replicate nowhere
    #[default]
    Local,
    /// Only the nodes listed in `refs`
    Specified,
    /// Any known storage node
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicationNodes {
    #[serde(rename = "type", default)]
    pub selection: NodeSelection,
    #[serde(default)]
    pub refs: Vec<Guid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationMetadata {
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
    #[serde(default)]
    pub replication_nodes: ReplicationNodes,
    #[serde(default)]
    pub protected_data: bool,
}

fn default_replication_factor() -> u32 {
    1
}

impl Default for ReplicationMetadata {
    fn default() -> Self {
        Self::local()
    }
}

impl ReplicationMetadata {
    /// Store on the receiver only. Pushes issued by the replication engine
    /// always use this so they never cascade.
    pub fn local() -> Self {
        Self {
            replication_factor: 1,
            replication_nodes: ReplicationNodes::default(),
            protected_data: false,
        }
    }

    /// Number of further copies the receiver should make
    pub fn onward_factor(&self) -> u32 {
        self.replication_factor.saturating_sub(1)
    }
}

/// Body of `POST /storage/atom`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
    #[serde(default)]
    pub metadata: ReplicationMetadata,
}

impl AtomPush {
    pub fn new(data: Bytes) -> Self {
        Self {
            guid: None,
            data,
            metadata: ReplicationMetadata::local(),
        }
    }

    pub fn with_guid(mut self, guid: Guid) -> Self {
        self.guid = Some(guid);
        self
    }

    pub fn with_metadata(mut self, metadata: ReplicationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64
            .decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
