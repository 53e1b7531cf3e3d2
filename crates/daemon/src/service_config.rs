use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use common::discovery::DEFAULT_DISCOVERY_TIMEOUT;
use common::prelude::{NodeServices, SecretKey};
use common::replication::{DEFAULT_MAX_CONCURRENT_PUSHES, DEFAULT_PUSH_TIMEOUT};

#[derive(Debug)]
pub struct Config {
    // node configuration
    /// our node key,
    ///  if not set then a new secret will be generated
    pub node_secret: Option<SecretKey>,
    /// hostname advertised in our node manifest
    pub hostname: String,
    /// services advertised in our node manifest
    pub services: NodeServices,
    /// node root: manifests, atom data, head logs
    pub store_path: PathBuf,
    /// nodes to introduce ourselves to on startup
    pub bootstrap: Vec<Url>,

    // replication and discovery
    pub push_timeout: Duration,
    pub max_concurrent_pushes: usize,
    pub discovery_timeout: Duration,

    // http server configuration
    /// Port for the peer protocol and client API
    pub api_port: u16,

    // data store configuration
    /// a path to a sqlite database, if not set then an
    ///  in-memory database will be used
    pub sqlite_path: Option<PathBuf>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Defaults for a node rooted at `store_path`
    pub fn new(store_path: impl Into<PathBuf>, api_port: u16) -> Self {
        Self {
            node_secret: None,
            hostname: "localhost".to_string(),
            services: NodeServices::default(),
            store_path: store_path.into(),
            bootstrap: Vec::new(),
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            max_concurrent_pushes: DEFAULT_MAX_CONCURRENT_PUSHES,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            api_port,
            sqlite_path: None,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
