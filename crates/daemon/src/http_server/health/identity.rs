use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::prelude::NodeManifest;

use crate::http_server::api::client::{ApiError, ApiRequest};
use crate::ServiceState;

/// This node's own manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityRequest;

pub async fn handler(State(state): State<ServiceState>) -> Response {
    (
        http::StatusCode::OK,
        Json(state.sos().local_node().clone()),
    )
        .into_response()
}

impl ApiRequest for IdentityRequest {
    type Response = NodeManifest;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError> {
        let full_url = base_url.join("/_status/identity")?;
        Ok(client.get(full_url))
    }
}
