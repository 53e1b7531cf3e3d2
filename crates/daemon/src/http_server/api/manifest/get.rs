use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{DirectoryError, Guid, Manifest, SosError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::{LookupScope, ScopeQuery};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetManifestRequest {
    pub guid: Guid,
    #[serde(default)]
    pub scope: LookupScope,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(guid): Path<Guid>,
    Query(query): Query<ScopeQuery>,
) -> Result<impl IntoResponse, GetManifestError> {
    let manifest = state.sos().find_manifest(&guid, query.scope.into()).await?;
    Ok((http::StatusCode::OK, Json(manifest)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum GetManifestError {
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}

impl IntoResponse for GetManifestError {
    fn into_response(self) -> Response {
        match self {
            GetManifestError::Sos(SosError::Directory(DirectoryError::NotFound(guid))) => (
                http::StatusCode::NOT_FOUND,
                format!("Manifest not found: {}", guid),
            )
                .into_response(),
            GetManifestError::Sos(e) => {
                tracing::error!("manifest lookup failed: {}", e);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Manifest lookup failed: {}", e),
                )
                    .into_response()
            }
        }
    }
}

impl ApiRequest for GetManifestRequest {
    type Response = Manifest;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/manifest/guid/{}", self.guid))?;
        Ok(client.get(full_url).query(&ScopeQuery { scope: self.scope }))
    }
}
