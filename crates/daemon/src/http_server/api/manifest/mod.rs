use axum::routing::{get, post};
use axum::Router;

pub mod add;
pub mod get;

pub use add::{AddManifestRequest, AddManifestResponse};
pub use get::GetManifestRequest;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", post(add::handler))
        .route("/guid/:guid", get(get::handler))
        .with_state(state)
}
