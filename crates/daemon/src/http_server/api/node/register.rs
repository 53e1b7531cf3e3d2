use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::discovery::DiscoveryError;
use common::prelude::{Guid, NodeManifest, SosError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

/// Body of `POST /node`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterNodeRequest(pub NodeManifest);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeResponse {
    pub guid: Guid,
}

/// Registrations received from peers are never forwarded again
pub async fn handler(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<impl IntoResponse, RegisterNodeError> {
    let node: NodeManifest = serde_json::from_slice(&body)?;
    let guid = node.guid;
    state.sos().register_node(node, true).await?;
    Ok((http::StatusCode::OK, Json(RegisterNodeResponse { guid })).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterNodeError {
    #[error("Malformed node manifest: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}

impl IntoResponse for RegisterNodeError {
    fn into_response(self) -> Response {
        match self {
            RegisterNodeError::Malformed(_)
            | RegisterNodeError::Sos(SosError::Discovery(DiscoveryError::Registration(_))) => {
                (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            RegisterNodeError::Sos(e) => {
                tracing::error!("failed to register node: {}", e);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to register node: {}", e),
                )
                    .into_response()
            }
        }
    }
}

impl ApiRequest for RegisterNodeRequest {
    type Response = RegisterNodeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/node")?;
        Ok(client.post(full_url).json(&self))
    }
}
