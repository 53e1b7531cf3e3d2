use axum::routing::{get, post};
use axum::Router;

pub mod challenge;
pub mod data;
pub mod push;

pub use challenge::{ChallengeRequest, ChallengeResponse};
pub use data::DataRequest;
pub use push::PushAtomRequest;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/atom", post(push::handler))
        .route(
            "/atom/guid/:guid/challenge/:challenge",
            get(challenge::handler),
        )
        .route("/atom/guid/:guid/challenge", get(challenge::missing_handler))
        .route("/atom/guid/:guid/challenge/", get(challenge::missing_handler))
        .route("/data/guid/:guid", get(data::handler))
        .with_state(state)
}
