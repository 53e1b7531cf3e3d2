use async_trait::async_trait;

use common::discovery::{NodeStore, NodeStoreError};
use common::prelude::{Guid, NodeManifest};

use super::{Database, NodeRecord};

fn backend(e: sqlx::Error) -> NodeStoreError {
    tracing::error!("node store query failed: {}", e);
    NodeStoreError::Backend(e.to_string())
}

#[async_trait]
impl NodeStore for Database {
    async fn upsert(&self, node: &NodeManifest) -> Result<(), NodeStoreError> {
        NodeRecord::upsert(node, self).await.map_err(backend)
    }

    async fn get(&self, guid: &Guid) -> Result<Option<NodeManifest>, NodeStoreError> {
        Ok(NodeRecord::get(guid, self)
            .await
            .map_err(backend)?
            .map(NodeManifest::from))
    }

    async fn list(&self) -> Result<Vec<NodeManifest>, NodeStoreError> {
        Ok(NodeRecord::list(self)
            .await
            .map_err(backend)?
            .into_iter()
            .map(NodeManifest::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use common::crypto::SecretKey;
    use common::prelude::{NodeCapability, NodeServices};

    use super::*;

    async fn setup_test_db() -> Database {
        Database::memory().await.unwrap()
    }

    fn node(hostname: &str, services: NodeServices) -> NodeManifest {
        let key = SecretKey::generate().unwrap();
        NodeManifest::new(&key.public(), hostname, 7000, services)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = setup_test_db().await;
        let alice = node("alice.local", NodeServices::with([NodeCapability::Storage]));

        db.upsert(&alice).await.unwrap();
        assert_eq!(db.get(&alice.guid).await.unwrap(), Some(alice.clone()));
        assert_eq!(db.get(&Guid::hash(b"nobody")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_record() {
        let db = setup_test_db().await;
        let mut alice = node("alice.local", NodeServices::default());
        db.upsert(&alice).await.unwrap();

        alice.hostname = "alice.example".to_string();
        alice.port = 9000;
        alice.services.set(NodeCapability::Dds, true);
        db.upsert(&alice).await.unwrap();

        let listed = db.list().await.unwrap();
        assert_eq!(listed, vec![alice]);
    }
}
