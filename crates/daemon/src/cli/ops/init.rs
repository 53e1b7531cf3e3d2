use clap::Args;
use url::Url;

use sos_daemon::state::{AppConfig, AppState, StateError, DEFAULT_API_PORT};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port the node listens on
    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Hostname other nodes use to reach this one
    #[arg(long)]
    pub hostname: Option<String>,

    /// Services to offer, e.g. `--capability storage --capability dds`
    #[arg(long = "capability")]
    pub capabilities: Vec<String>,

    /// Base URL of a node to introduce ourselves to on startup (repeatable)
    #[arg(long)]
    pub bootstrap: Vec<Url>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            api_port: self.api_port,
            bootstrap: self.bootstrap.clone(),
            ..Default::default()
        };
        if let Some(hostname) = &self.hostname {
            config.hostname = hostname.clone();
        }
        if !self.capabilities.is_empty() {
            config.capabilities = self.capabilities.clone();
        }

        let state = AppState::init(ctx.config_path.clone(), config)?;
        let public = state.load_key()?.public();
        Ok(format!(
            "initialized {}\nnode key: {}",
            state.sos_dir.display(),
            public.to_base64()
        ))
    }
}
