use axum::routing::get;
use axum::Router;

mod data_source;
pub mod identity;
mod livez;
mod readyz;

pub use identity::IdentityRequest;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/livez", get(livez::handler))
        .route("/readyz", get(readyz::handler))
        .route("/identity", get(identity::handler))
        .with_state(state)
}
