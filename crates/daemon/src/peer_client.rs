//! The peer protocol over HTTP
//!
//! Each call builds the request through the same [`ApiRequest`] impls the
//! CLI uses, against `http://<hostname>:<port>` of the target node.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use url::Url;

use common::peer::{AtomPush, PeerClient, ProtocolError};
use common::prelude::{AtomManifest, Guid, Manifest, NodeCapability, NodeManifest};

use crate::http_server::api::client::{ApiClient, ApiError};
use crate::http_server::api::manifest::{AddManifestRequest, GetManifestRequest};
use crate::http_server::api::node::{GetNodeRequest, RegisterNodeRequest, ServiceNodesRequest};
use crate::http_server::api::storage::{ChallengeRequest, DataRequest, PushAtomRequest};
use crate::http_server::api::LookupScope;
use crate::http_server::health::IdentityRequest;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: Client,
}

impl HttpPeerClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    fn api(&self, node: &NodeManifest) -> Result<ApiClient, ProtocolError> {
        let base = Url::parse(&format!("http://{}/", node.address()))
            .map_err(|e| ProtocolError::Transport(format!("bad node address: {}", e)))?;
        Ok(ApiClient::with_client(&base, self.client.clone()))
    }

    /// Ask the node serving `base` for its own manifest
    pub async fn fetch_identity(&self, base: &Url) -> Result<NodeManifest, ProtocolError> {
        let api = ApiClient::with_client(base, self.client.clone());
        let node = api
            .call(IdentityRequest)
            .await
            .map_err(|e| protocol_error(e, Guid::Invalid))?;
        if !node.is_valid() {
            return Err(ProtocolError::Decode(format!(
                "{} answered with an invalid node manifest",
                base
            )));
        }
        Ok(node)
    }
}

fn protocol_error(e: ApiError, guid: Guid) -> ProtocolError {
    if e.is_not_found() {
        return ProtocolError::NotFound(guid);
    }
    match e {
        ApiError::HttpStatus(status, body) => ProtocolError::Status(status.as_u16(), body),
        ApiError::Reqwest(e) if e.is_decode() => ProtocolError::Decode(e.to_string()),
        ApiError::Reqwest(e) => ProtocolError::Transport(e.to_string()),
        ApiError::UrlParse(e) => ProtocolError::Transport(e.to_string()),
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn push_atom(
        &self,
        node: &NodeManifest,
        push: AtomPush,
    ) -> Result<AtomManifest, ProtocolError> {
        let claimed = push.guid.unwrap_or_default();
        let manifest = self
            .api(node)?
            .call(PushAtomRequest(push))
            .await
            .map_err(|e| protocol_error(e, claimed))?;
        manifest
            .into_atom()
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    async fn fetch_atom_data(
        &self,
        node: &NodeManifest,
        guid: Guid,
    ) -> Result<Bytes, ProtocolError> {
        let request = DataRequest {
            guid,
            scope: LookupScope::Local,
        };
        self.api(node)?
            .call_bytes(request)
            .await
            .map_err(|e| protocol_error(e, guid))
    }

    async fn challenge(
        &self,
        node: &NodeManifest,
        guid: Guid,
        challenge: &str,
    ) -> Result<Guid, ProtocolError> {
        let request = ChallengeRequest {
            guid,
            challenge: challenge.to_string(),
        };
        let response = self
            .api(node)?
            .call(request)
            .await
            .map_err(|e| protocol_error(e, guid))?;
        Ok(response.guid)
    }

    async fn push_manifest(
        &self,
        node: &NodeManifest,
        manifest: &Manifest,
    ) -> Result<(), ProtocolError> {
        let guid = manifest.guid();
        self.api(node)?
            .call(AddManifestRequest(manifest.clone()))
            .await
            .map_err(|e| protocol_error(e, guid))?;
        Ok(())
    }

    async fn fetch_manifest(
        &self,
        node: &NodeManifest,
        guid: Guid,
    ) -> Result<Manifest, ProtocolError> {
        let request = GetManifestRequest {
            guid,
            scope: LookupScope::Local,
        };
        self.api(node)?
            .call(request)
            .await
            .map_err(|e| protocol_error(e, guid))
    }

    async fn register_node(
        &self,
        node: &NodeManifest,
        registration: &NodeManifest,
    ) -> Result<(), ProtocolError> {
        self.api(node)?
            .call(RegisterNodeRequest(registration.clone()))
            .await
            .map_err(|e| protocol_error(e, registration.guid))?;
        Ok(())
    }

    async fn fetch_node(
        &self,
        node: &NodeManifest,
        guid: Guid,
    ) -> Result<NodeManifest, ProtocolError> {
        let request = GetNodeRequest {
            guid,
            scope: LookupScope::Local,
        };
        self.api(node)?
            .call(request)
            .await
            .map_err(|e| protocol_error(e, guid))
    }

    async fn nodes_by_capability(
        &self,
        node: &NodeManifest,
        capability: NodeCapability,
    ) -> Result<Vec<NodeManifest>, ProtocolError> {
        let request = ServiceNodesRequest {
            capability: capability.as_str().to_string(),
        };
        self.api(node)?
            .call(request)
            .await
            .map_err(|e| protocol_error(e, node.guid))
    }

    async fn fetch_url(&self, url: &Url) -> Result<Bytes, ProtocolError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProtocolError::Status(status.as_u16(), url.to_string()));
        }
        response
            .bytes()
            .await
            .map_err(|e| ProtocolError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let guid = Guid::hash(b"missing");
        assert_eq!(
            protocol_error(
                ApiError::HttpStatus(StatusCode::NOT_FOUND, String::new()),
                guid
            ),
            ProtocolError::NotFound(guid)
        );
        assert_eq!(
            protocol_error(
                ApiError::HttpStatus(StatusCode::BAD_REQUEST, "bad".into()),
                guid
            ),
            ProtocolError::Status(400, "bad".into())
        );
    }
}
