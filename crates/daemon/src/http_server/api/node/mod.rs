use axum::routing::{get, post};
use axum::Router;

pub mod get;
pub mod register;
pub mod service;

pub use get::GetNodeRequest;
pub use register::{RegisterNodeRequest, RegisterNodeResponse};
pub use service::ServiceNodesRequest;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", post(register::handler))
        .route("/guid/:guid", get(get::handler))
        .route("/service/:capability", get(service::handler))
        .with_state(state)
}
