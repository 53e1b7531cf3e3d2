use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::{DirectoryError, FindScope, Guid, SosError};
use common::storage::AtomStoreError;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::http_server::api::{LookupScope, ScopeQuery};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRequest {
    pub guid: Guid,
    #[serde(default)]
    pub scope: LookupScope,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Path(guid): Path<Guid>,
    Query(query): Query<ScopeQuery>,
) -> Result<impl IntoResponse, DataError> {
    let bytes = match FindScope::from(query.scope) {
        FindScope::Local => state.sos().serve_atom_data(&guid).await?,
        FindScope::Any => state.sos().get_atom_content(&guid).await?,
    };
    Ok((
        http::StatusCode::OK,
        [(http::header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Node error: {0}")]
    Sos(#[from] SosError),
}

impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        match self {
            DataError::Sos(SosError::AtomStore(AtomStoreError::NotFound(guid)))
            | DataError::Sos(SosError::Directory(DirectoryError::NotFound(guid))) => (
                http::StatusCode::NOT_FOUND,
                format!("Atom not found: {}", guid),
            )
                .into_response(),
            DataError::Sos(SosError::AtomStore(AtomStoreError::InvalidGuid)) => {
                (http::StatusCode::NOT_FOUND, "Atom not found").into_response()
            }
            DataError::Sos(e) => {
                tracing::error!("failed to read atom data: {}", e);
                (
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to read atom: {}", e),
                )
                    .into_response()
            }
        }
    }
}

impl ApiRequest for DataRequest {
    type Response = bytes::Bytes;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join(&format!("/storage/data/guid/{}", self.guid))?;
        Ok(client.get(full_url).query(&ScopeQuery { scope: self.scope }))
    }
}
