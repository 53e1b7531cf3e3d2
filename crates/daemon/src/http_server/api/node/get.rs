use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::discovery::DiscoveryError;
use common::prelude::{Guid, NodeManifest, SosError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::{LookupScope, ScopeQuery};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNodeRequest {
    pub guid: Guid,
    #[serde(default)]
    pub scope: LookupScope,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(guid): Path<Guid>,
    Query(query): Query<ScopeQuery>,
) -> Result<impl IntoResponse, GetNodeError> {
    let node = match query.scope {
        LookupScope::Local => state
            .sos()
            .known_node(&guid)
            .ok_or(GetNodeError::NotFound(guid))?,
        LookupScope::Any => state.sos().get_node(&guid).await?,
    };
    Ok((http::StatusCode::OK, Json(node)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum GetNodeError {
    #[error("Node not found: {0}")]
    NotFound(Guid),
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}

impl IntoResponse for GetNodeError {
    fn into_response(self) -> Response {
        match self {
            GetNodeError::NotFound(guid)
            | GetNodeError::Sos(SosError::Discovery(DiscoveryError::NotFound(guid))) => (
                http::StatusCode::NOT_FOUND,
                format!("Node not found: {}", guid),
            )
                .into_response(),
            GetNodeError::Sos(e) => {
                tracing::error!("node lookup failed: {}", e);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Node lookup failed: {}", e),
                )
                    .into_response()
            }
        }
    }
}

impl ApiRequest for GetNodeRequest {
    type Response = NodeManifest;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/node/guid/{}", self.guid))?;
        Ok(client.get(full_url).query(&ScopeQuery { scope: self.scope }))
    }
}
