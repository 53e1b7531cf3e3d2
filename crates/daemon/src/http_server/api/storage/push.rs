use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::peer::AtomPush;
use common::prelude::{Manifest, SosError};

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

/// Body of `POST /storage/atom`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushAtomRequest(pub AtomPush);

pub async fn handler(
    State(state): State<ServiceState>,
    body: Bytes,
) -> Result<impl IntoResponse, PushAtomError> {
    let push: AtomPush = serde_json::from_slice(&body)?;
    tracing::debug!(
        size = push.data.len(),
        factor = push.metadata.replication_factor,
        "received atom push"
    );

    let receipt = state.sos().receive_atom(push).await?;
    Ok((http::StatusCode::CREATED, Json(Manifest::from(receipt))).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum PushAtomError {
    #[error("Invalid atom push: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}

impl IntoResponse for PushAtomError {
    fn into_response(self) -> Response {
        match self {
            PushAtomError::InvalidBody(e) => (
                http::StatusCode::BAD_REQUEST,
                format!("Invalid atom push: {}", e),
            )
                .into_response(),
            PushAtomError::Sos(e @ SosError::GuidMismatch { .. }) => {
                (http::StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            PushAtomError::Sos(e) => {
                tracing::error!("failed to store pushed atom: {}", e);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to store atom: {}", e),
                )
                    .into_response()
            }
        }
    }
}

// Client implementation - builds request for this operation
impl ApiRequest for PushAtomRequest {
    type Response = Manifest;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/storage/atom")?;
        Ok(client.post(full_url).json(&self))
    }
}
