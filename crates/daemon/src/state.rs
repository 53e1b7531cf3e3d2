//! On-disk application state: the `~/.sos` directory
//!
//! ```text
//! ~/.sos/
//!   config.toml   node and daemon settings
//!   key.pem       Ed25519 node key
//!   db.sqlite     peer registry
//!   store/        manifests, atom data, head logs, dds index
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use common::crypto::{KeyError, SecretKey};
use common::manifest::{NodeCapability, NodeServices, UnknownCapability};

pub const APP_DIR_NAME: &str = ".sos";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const STORE_DIR_NAME: &str = "store";

pub const DEFAULT_API_PORT: u16 = 5001;
pub const DEFAULT_HOSTNAME: &str = "localhost";

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

fn default_capabilities() -> Vec<String> {
    vec![
        NodeCapability::Storage.to_string(),
        NodeCapability::Dds.to_string(),
        NodeCapability::Nds.to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port the peer protocol and client API listen on
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Hostname other nodes use to reach this one
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Default log level, overridden by `RUST_LOG`
    #[serde(default)]
    pub log_level: Option<String>,
    /// Services this node offers
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
    /// Base URLs of nodes to introduce ourselves to on startup
    #[serde(default)]
    pub bootstrap: Vec<Url>,
    /// Per-push replication deadline
    #[serde(default)]
    pub push_timeout_secs: Option<u64>,
    /// Deadline for asking peers about an unknown node
    #[serde(default)]
    pub discovery_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: DEFAULT_API_PORT,
            hostname: default_hostname(),
            log_level: None,
            capabilities: default_capabilities(),
            bootstrap: Vec::new(),
            push_timeout_secs: None,
            discovery_timeout_secs: None,
        }
    }
}

impl AppConfig {
    pub fn services(&self) -> Result<NodeServices, StateError> {
        let capabilities = self
            .capabilities
            .iter()
            .map(|c| c.parse::<NodeCapability>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NodeServices::with(capabilities))
    }

    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        match &self.log_level {
            Some(level) => level
                .parse()
                .map_err(|_| StateError::InvalidLogLevel(level.clone())),
            None => Ok(tracing::Level::INFO),
        }
    }

    pub fn push_timeout(&self) -> Option<Duration> {
        self.push_timeout_secs.map(Duration::from_secs)
    }

    pub fn discovery_timeout(&self) -> Option<Duration> {
        self.discovery_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine the home directory")]
    NoHomeDirectory,
    #[error("no sos directory at {0}, run `sos init` first")]
    NotInitialized(PathBuf),
    #[error("sos directory already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to write config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
    #[error("node key error: {0}")]
    Key(#[from] KeyError),
    #[error("config error: {0}")]
    Capability(#[from] UnknownCapability),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub sos_dir: PathBuf,
    pub config_path: PathBuf,
    pub key_path: PathBuf,
    pub db_path: PathBuf,
    pub store_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// The sos directory: `custom` if given, otherwise `~/.sos`
    pub fn sos_dir(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        match custom {
            Some(path) => Ok(path),
            None => dirs::home_dir()
                .map(|home| home.join(APP_DIR_NAME))
                .ok_or(StateError::NoHomeDirectory),
        }
    }

    fn at(sos_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            config_path: sos_dir.join(CONFIG_FILE_NAME),
            key_path: sos_dir.join(KEY_FILE_NAME),
            db_path: sos_dir.join(DB_FILE_NAME),
            store_path: sos_dir.join(STORE_DIR_NAME),
            sos_dir,
            config,
        }
    }

    /// Create the directory layout, a fresh node key and the config file
    pub fn init(custom: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let sos_dir = Self::sos_dir(custom)?;
        if sos_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized(sos_dir));
        }
        // reject a bad capability list before touching the disk
        config.services()?;

        let state = Self::at(sos_dir, config);
        std::fs::create_dir_all(&state.store_path)?;

        let key = SecretKey::generate()?;
        write_private(&state.key_path, key.to_pem().as_bytes())?;
        std::fs::write(&state.config_path, toml::to_string_pretty(&state.config)?)?;

        tracing::info!(dir = ?state.sos_dir, "initialized sos directory");
        Ok(state)
    }

    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let sos_dir = Self::sos_dir(custom)?;
        let config_path = sos_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(sos_dir));
        }
        let config: AppConfig = toml::from_str(&std::fs::read_to_string(&config_path)?)?;
        Ok(Self::at(sos_dir, config))
    }

    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let pem = std::fs::read_to_string(&self.key_path)?;
        Ok(SecretKey::from_pem(&pem)?)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sos");

        let created = AppState::init(Some(root.clone()), AppConfig::default()).unwrap();
        assert!(created.store_path.is_dir());
        assert!(created.key_path.is_file());

        let loaded = AppState::load(Some(root.clone())).unwrap();
        assert_eq!(loaded.config.api_port, DEFAULT_API_PORT);
        assert_eq!(
            loaded.load_key().unwrap().public(),
            created.load_key().unwrap().public()
        );

        assert!(matches!(
            AppState::init(Some(root), AppConfig::default()),
            Err(StateError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_config_defaults_and_services() {
        let config: AppConfig = toml::from_str("hostname = \"node-a\"\ncapabilities = [\"STORAGE\", \"nds\"]\n").unwrap();
        assert_eq!(config.api_port, DEFAULT_API_PORT);
        assert_eq!(config.hostname, "node-a");
        let services = config.services().unwrap();
        assert!(services.storage && services.nds && !services.dds);
        assert_eq!(config.log_level().unwrap(), tracing::Level::INFO);

        let bad = AppConfig {
            capabilities: vec!["teleport".into()],
            ..Default::default()
        };
        assert!(matches!(bad.services(), Err(StateError::Capability(_))));
    }
}
