use axum::Router;
use serde::{Deserialize, Serialize};

use common::prelude::FindScope;

pub mod client;
pub mod manifest;
pub mod node;
pub mod storage;

use crate::ServiceState;

/// How far a lookup route may go before answering 404.
///
/// Peers always ask with `local` so a lookup never fans out recursively.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LookupScope {
    /// Only what this node holds or knows
    #[default]
    Local,
    /// Ask other nodes on a local miss
    Any,
}

impl From<LookupScope> for FindScope {
    fn from(scope: LookupScope) -> Self {
        match scope {
            LookupScope::Local => FindScope::Local,
            LookupScope::Any => FindScope::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    pub scope: LookupScope,
}

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/storage", storage::router(state.clone()))
        .nest("/manifest", manifest::router(state.clone()))
        .nest("/node", node::router(state.clone()))
        .with_state(state)
}
