use std::path::PathBuf;

use clap::{Args, Subcommand};

use common::prelude::Guid;
use sos_daemon::http_server::api::client::ApiError;
use sos_daemon::http_server::api::manifest::{AddManifestRequest, GetManifestRequest};
use sos_daemon::http_server::api::LookupScope;

#[derive(Args, Debug, Clone)]
pub struct Manifest {
    #[command(subcommand)]
    pub command: ManifestCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ManifestCommand {
    /// Print a manifest as JSON
    Get {
        #[arg(long)]
        guid: Guid,
        #[arg(long, value_enum, default_value_t = LookupScope::Local)]
        scope: LookupScope,
    },
    /// Store a manifest read from a JSON file
    Add {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest: {0}")]
    Manifest(#[from] common::manifest::ManifestError),
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("failed to render manifest: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Manifest {
    type Error = ManifestError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        match &self.command {
            ManifestCommand::Get { guid, scope } => {
                let request = GetManifestRequest {
                    guid: *guid,
                    scope: *scope,
                };
                let manifest = ctx.client.call(request).await?;
                Ok(serde_json::to_string_pretty(&manifest)?)
            }
            ManifestCommand::Add { file } => {
                let json = tokio::fs::read(file).await?;
                let manifest = common::prelude::Manifest::from_json(&json)?;
                let response = ctx.client.call(AddManifestRequest(manifest)).await?;
                Ok(response.guid.to_string())
            }
        }
    }
}
