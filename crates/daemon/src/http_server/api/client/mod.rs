mod client;
mod error;

use reqwest::{Client, RequestBuilder};
use url::Url;

pub use client::ApiClient;
pub use error::ApiError;

/// A request against the node API. Each route's handler module implements
/// this for its request type, so the CLI and peers share one definition.
pub trait ApiRequest {
    type Response;

    fn build_request(self, base_url: &Url, client: &Client) -> Result<RequestBuilder, ApiError>;
}
