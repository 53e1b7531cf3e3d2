use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use url::Url;

use common::crypto::{KeyError, SecretKey};
use common::prelude::{NodeManifest, PeerClient, Sos, SosConfig, SosError};

use super::database::{Database, DatabaseSetupError};
use super::peer_client::HttpPeerClient;
use super::service_config::Config;

/// Main service state: the node, its peer registry and the HTTP peer client
#[derive(Clone)]
pub struct State {
    sos: Arc<Sos>,
    database: Database,
    client: HttpPeerClient,
    shutting_down: Arc<AtomicBool>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let database = match config.sqlite_path {
            Some(ref path) => {
                tracing::info!("Database path: {:?}", path);
                Database::open(path).await?
            }
            // otherwise just set up an in-memory database
            None => Database::memory().await?,
        };

        // 2. Setup node identity
        let node_secret = match config.node_secret.clone() {
            Some(secret) => secret,
            None => SecretKey::generate()?,
        };
        let node = NodeManifest::new(
            &node_secret.public(),
            config.hostname.clone(),
            config.api_port,
            config.services,
        );

        // 3. Open the node over the store directory
        let client = HttpPeerClient::new().map_err(StateSetupError::HttpClient)?;
        let sos_config = SosConfig {
            root: config.store_path.clone(),
            push_timeout: config.push_timeout,
            max_concurrent_pushes: config.max_concurrent_pushes,
            discovery_timeout: config.discovery_timeout,
            ..Default::default()
        };
        let sos = Sos::open(
            sos_config,
            node,
            Arc::new(database.clone()),
            Arc::new(client.clone()),
        )
        .await?;

        tracing::info!(
            "Node id: {} ({})",
            sos.local_node().guid,
            sos.local_node().address()
        );

        Ok(Self {
            sos: Arc::new(sos),
            database,
            client,
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn sos(&self) -> &Arc<Sos> {
        &self.sos
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn client(&self) -> &HttpPeerClient {
        &self.client
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn mark_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Learn each bootstrap node and register ourselves with it.
    ///
    /// Unreachable nodes are logged and skipped; returns how many answered.
    pub async fn bootstrap(&self, urls: &[Url]) -> usize {
        let local = self.sos.local_node().clone();
        let mut reached = 0;
        for url in urls {
            let node = match self.client.fetch_identity(url).await {
                Ok(node) => node,
                Err(e) => {
                    tracing::warn!(%url, "bootstrap node unreachable: {}", e);
                    continue;
                }
            };
            if node.guid == local.guid {
                continue;
            }
            if let Err(e) = self.sos.register_node(node.clone(), true).await {
                tracing::warn!(%url, "failed to record bootstrap node: {}", e);
                continue;
            }
            if let Err(e) = self.client.register_node(&node, &local).await {
                tracing::warn!(%url, "bootstrap node rejected our registration: {}", e);
                continue;
            }
            tracing::info!(%url, node = %node.guid, "bootstrapped");
            reached += 1;
        }
        reached
    }
}

impl AsRef<Database> for State {
    fn as_ref(&self) -> &Database {
        self.database()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database setup error")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Node key error: {0}")]
    Key(#[from] KeyError),
    #[error("HTTP client error: {0}")]
    HttpClient(reqwest::Error),
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}
