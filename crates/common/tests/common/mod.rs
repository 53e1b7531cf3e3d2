//! Shared utilities for the node integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use ::common::crypto::SecretKey;
use ::common::discovery::{MemoryNodeStore, NodeStore};
use ::common::manifest::{NodeCapability, NodeManifest, NodeServices};
use ::common::sos::{Sos, SosConfig};
use ::common::testkit::MemoryNetwork;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Open a standalone node outside a `TestNetwork`, e.g. to reopen a root
pub async fn open_node(
    root: &Path,
    key: &SecretKey,
    store: Arc<dyn NodeStore>,
    network: &MemoryNetwork,
) -> Arc<Sos> {
    let node = NodeManifest::new(
        &key.public(),
        "standalone",
        0,
        NodeServices::with([NodeCapability::Storage, NodeCapability::Dds]),
    );
    let sos = Arc::new(
        Sos::open(SosConfig::new(root), node, store, Arc::new(network.clone()))
            .await
            .unwrap(),
    );
    network.attach(&sos);
    sos
}

pub fn memory_store() -> Arc<dyn NodeStore> {
    Arc::new(MemoryNodeStore::new())
}
