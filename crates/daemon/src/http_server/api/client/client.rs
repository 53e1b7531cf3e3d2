use bytes::Bytes;
use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::ApiError;
use super::ApiRequest;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self::with_client(remote, client))
    }

    /// Reuse an existing connection pool against another remote
    pub fn with_client(remote: &Url, client: Client) -> Self {
        Self {
            remote: remote.clone(),
            client,
        }
    }

    pub async fn call<T>(&self, request: T) -> Result<T::Response, ApiError>
    where
        T: ApiRequest,
        T::Response: DeserializeOwned,
    {
        let response = self.send(request).await?;
        Ok(response.json::<T::Response>().await?)
    }

    /// Call a route that answers with raw bytes instead of JSON
    pub async fn call_bytes<T: ApiRequest>(&self, request: T) -> Result<Bytes, ApiError> {
        let response = self.send(request).await?;
        Ok(response.bytes().await?)
    }

    async fn send<T: ApiRequest>(&self, request: T) -> Result<reqwest::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
