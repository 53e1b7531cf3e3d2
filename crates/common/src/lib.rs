/**
 * Lock structures shared by the storage tiers:
 *  sharded maps and per-key async locks.
 */
pub mod concurrency;
/**
 * Cryptographic types and operations.
 *  - Ed25519 keys for nodes, users and roles
 *  - AES-GCM sealing of secure compound labels
 */
pub mod crypto;
/**
 * The three-tier manifest directory:
 *  memory cache, local disk, remote peers.
 */
pub mod directory;
/**
 * Known peers and how to find them.
 */
pub mod discovery;
/**
 * Content identity: SHA-256 GUIDs.
 */
pub mod guid;
/**
 * Version DAGs and HEAD tracking per asset.
 */
pub mod lineage;
/**
 * The manifest type family and its
 *  validity and signature contract.
 */
pub mod manifest;
/**
 * The peer protocol as a trait, plus its
 *  wire messages.
 */
pub mod peer;
/**
 * Background replication of manifests and
 *  atom bytes to other nodes.
 */
pub mod replication;
/**
 * The node facade tying every component together.
 */
pub mod sos;
/**
 * On-disk layout and atom byte storage.
 */
pub mod storage;
/**
 * In-process multi-node harness for tests.
 */
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::crypto::{PublicKey, SecretKey};
    pub use crate::directory::{DirectoryError, FindScope};
    pub use crate::guid::Guid;
    pub use crate::manifest::{
        AtomManifest, BundleKind, CompoundManifest, CompoundType, Content, Location,
        LocationBundle, Manifest, ManifestType, NodeCapability, NodeManifest, NodeServices,
        VersionManifest,
    };
    pub use crate::peer::{AtomPush, PeerClient, ProtocolError};
    pub use crate::replication::{ReplicationHandle, ReplicationOutcome, ReplicationReport};
    pub use crate::sos::{Sos, SosConfig, SosError, StorageContract};
    pub use crate::version::build_info;
}
