use std::path::PathBuf;

use clap::Args;

use sos_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Override the advertised hostname (default from config)
    #[arg(long)]
    pub hostname: Option<String>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] sos_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Load state from config path (or default ~/.sos)
        let state = ctx.app_state()?;
        let secret_key = state.load_key()?;

        let api_port = self.api_port.unwrap_or(state.config.api_port);
        let mut config = ServiceConfig::new(state.store_path.clone(), api_port);
        config.node_secret = Some(secret_key);
        config.hostname = self
            .hostname
            .clone()
            .unwrap_or_else(|| state.config.hostname.clone());
        config.services = state.config.services()?;
        config.bootstrap = state.config.bootstrap.clone();
        if let Some(timeout) = state.config.push_timeout() {
            config.push_timeout = timeout;
        }
        if let Some(timeout) = state.config.discovery_timeout() {
            config.discovery_timeout = timeout;
        }
        config.sqlite_path = Some(state.db_path.clone());
        config.log_level = state.config.log_level()?;
        config.log_dir = self.log_dir.clone();

        spawn_service(&config).await;
        Ok("daemon ended".to_string())
    }
}
