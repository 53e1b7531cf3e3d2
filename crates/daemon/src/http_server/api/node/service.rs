use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::manifest::UnknownCapability;
use common::prelude::{NodeCapability, NodeManifest};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNodesRequest {
    /// `storage`, `dds`, `nds`, `mms`, `cms`, `rms` or `agent`
    pub capability: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(capability): Path<String>,
) -> Result<impl IntoResponse, ServiceNodesError> {
    let capability: NodeCapability = capability.parse()?;
    let nodes = state.sos().nodes_by_capability(capability);
    Ok((http::StatusCode::OK, Json(nodes)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceNodesError {
    #[error("{0}")]
    UnknownCapability(#[from] UnknownCapability),
}

impl IntoResponse for ServiceNodesError {
    fn into_response(self) -> Response {
        match self {
            ServiceNodesError::UnknownCapability(e) => {
                (http::StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
        }
    }
}

impl ApiRequest for ServiceNodesRequest {
    type Response = Vec<NodeManifest>;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/node/service/{}", self.capability))?;
        Ok(client.get(full_url))
    }
}
