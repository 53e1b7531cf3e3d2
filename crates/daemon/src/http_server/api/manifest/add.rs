use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::manifest::ManifestError;
use common::prelude::{DirectoryError, Guid, Manifest, ManifestType, SosError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

/// Body of `POST /manifest`: any manifest variant, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddManifestRequest(pub Manifest);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddManifestResponse {
    pub guid: Guid,
    #[serde(rename = "type")]
    pub manifest_type: ManifestType,
}

pub async fn handler(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<impl IntoResponse, AddManifestError> {
    let manifest = Manifest::from_json(&body)?;
    let manifest_type = manifest.manifest_type();
    if !manifest.is_valid() {
        return Err(AddManifestError::Invalid(manifest_type, manifest.guid()));
    }

    let guid = state.sos().add_manifest(manifest).await?;
    Ok((
        http::StatusCode::CREATED,
        Json(AddManifestResponse {
            guid,
            manifest_type,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum AddManifestError {
    #[error("Malformed manifest: {0}")]
    Malformed(#[from] ManifestError),
    #[error("Invalid {0} manifest: {1}")]
    Invalid(ManifestType, Guid),
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}

impl IntoResponse for AddManifestError {
    fn into_response(self) -> Response {
        match self {
            AddManifestError::Malformed(_)
            | AddManifestError::Invalid(..)
            | AddManifestError::Sos(SosError::Directory(DirectoryError::Integrity(_))) => {
                (http::StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            AddManifestError::Sos(e) => {
                tracing::error!("failed to add manifest: {}", e);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to add manifest: {}", e),
                )
                    .into_response()
            }
        }
    }
}

impl ApiRequest for AddManifestRequest {
    type Response = AddManifestResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/manifest")?;
        Ok(client.post(full_url).json(&self))
    }
}
