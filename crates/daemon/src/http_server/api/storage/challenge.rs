use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{Guid, SosError};
use common::storage::AtomStoreError;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub guid: Guid,
    pub challenge: String,
}

/// Hash of the atom's bytes followed by the challenge,
/// `INVALID` when the atom is not held here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub guid: Guid,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path((guid, challenge)): Path<(Guid, String)>,
) -> Result<impl IntoResponse, ChallengeError> {
    let proof = state.sos().challenge(&guid, &challenge).await?;
    Ok((http::StatusCode::OK, Json(ChallengeResponse { guid: proof })).into_response())
}

/// The route without a challenge segment
pub async fn missing_handler(Path(_guid): Path<Guid>) -> ChallengeError {
    ChallengeError::EmptyChallenge
}

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("Challenge must not be empty")]
    EmptyChallenge,
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}

impl IntoResponse for ChallengeError {
    fn into_response(self) -> Response {
        match self {
            ChallengeError::EmptyChallenge
            | ChallengeError::Sos(SosError::AtomStore(AtomStoreError::EmptyChallenge)) => (
                http::StatusCode::BAD_REQUEST,
                "Challenge must not be empty",
            )
                .into_response(),
            ChallengeError::Sos(e) => {
                tracing::error!("challenge failed: {}", e);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Challenge failed: {}", e),
                )
                    .into_response()
            }
        }
    }
}

impl ApiRequest for ChallengeRequest {
    type Response = ChallengeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let mut full_url = base_url.join(&format!("/storage/atom/guid/{}/challenge/", self.guid))?;
        full_url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(&self.challenge);
        Ok(client.get(full_url))
    }
}
