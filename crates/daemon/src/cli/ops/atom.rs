use std::path::PathBuf;

use bytes::Bytes;
use clap::{Args, Subcommand};

use common::peer::{AtomPush, NodeSelection, ReplicationMetadata, ReplicationNodes};
use common::prelude::Guid;
use sos_daemon::http_server::api::client::ApiError;
use sos_daemon::http_server::api::storage::{ChallengeRequest, DataRequest, PushAtomRequest};
use sos_daemon::http_server::api::LookupScope;

#[derive(Args, Debug, Clone)]
pub struct Atom {
    #[command(subcommand)]
    pub command: AtomCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AtomCommand {
    /// Push a file to the node as an atom
    Add {
        #[arg(long)]
        file: PathBuf,
        /// Copies to keep across the network, counting the node itself
        #[arg(long, default_value_t = 1)]
        replication_factor: u32,
    },
    /// Fetch an atom's bytes
    Cat {
        #[arg(long)]
        guid: Guid,
        #[arg(long, value_enum, default_value_t = LookupScope::Local)]
        scope: LookupScope,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Ask the node to prove it holds an atom
    Challenge {
        #[arg(long)]
        guid: Guid,
        #[arg(long)]
        challenge: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum AtomError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("api error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Atom {
    type Error = AtomError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        match &self.command {
            AtomCommand::Add {
                file,
                replication_factor,
            } => {
                let data = Bytes::from(tokio::fs::read(file).await?);
                let selection = if *replication_factor > 1 {
                    NodeSelection::Any
                } else {
                    NodeSelection::Local
                };
                let push = AtomPush::new(data).with_metadata(ReplicationMetadata {
                    replication_factor: *replication_factor,
                    replication_nodes: ReplicationNodes {
                        selection,
                        refs: Vec::new(),
                    },
                    protected_data: false,
                });
                let receipt = ctx.client.call(PushAtomRequest(push)).await?;
                Ok(receipt.guid().to_string())
            }
            AtomCommand::Cat { guid, scope, out } => {
                let request = DataRequest {
                    guid: *guid,
                    scope: *scope,
                };
                let data = ctx.client.call_bytes(request).await?;
                match out {
                    Some(path) => {
                        tokio::fs::write(path, &data).await?;
                        Ok(format!("wrote {} bytes to {}", data.len(), path.display()))
                    }
                    None => Ok(String::from_utf8_lossy(&data).into_owned()),
                }
            }
            AtomCommand::Challenge { guid, challenge } => {
                let request = ChallengeRequest {
                    guid: *guid,
                    challenge: challenge.clone(),
                };
                let response = ctx.client.call(request).await?;
                Ok(response.guid.to_string())
            }
        }
    }
}
