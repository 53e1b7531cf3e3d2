use clap::{Args, Subcommand};

use common::prelude::{Guid, NodeCapability};
use sos_daemon::http_server::api::client::ApiError;
use sos_daemon::http_server::api::node::{GetNodeRequest, ServiceNodesRequest};
use sos_daemon::http_server::api::LookupScope;

#[derive(Args, Debug, Clone)]
pub struct Node {
    #[command(subcommand)]
    pub command: NodeCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NodeCommand {
    /// Print a node manifest as JSON
    Get {
        #[arg(long)]
        guid: Guid,
        #[arg(long, value_enum, default_value_t = LookupScope::Local)]
        scope: LookupScope,
    },
    /// List the known nodes offering a service
    List {
        #[arg(long)]
        service: NodeCapability,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("failed to render node: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Node {
    type Error = NodeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        match &self.command {
            NodeCommand::Get { guid, scope } => {
                let request = GetNodeRequest {
                    guid: *guid,
                    scope: *scope,
                };
                let node = ctx.client.call(request).await?;
                Ok(serde_json::to_string_pretty(&node)?)
            }
            NodeCommand::List { service } => {
                let request = ServiceNodesRequest {
                    capability: service.as_str().to_string(),
                };
                let nodes = ctx.client.call(request).await?;
                let lines: Vec<String> = nodes
                    .iter()
                    .map(|node| format!("{}  {}", node.guid, node.address()))
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }
}
