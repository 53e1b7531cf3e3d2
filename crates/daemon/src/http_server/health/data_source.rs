use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::ServiceState;

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("one or more dependencies aren't available")]
    DependencyFailure,
    #[error("service is shutting down")]
    ShuttingDown,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Clone)]
pub struct StateDataSource(Arc<dyn DataSource>);

impl StateDataSource {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self(source)
    }
}

impl std::fmt::Debug for StateDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StateDataSource")
    }
}

impl Deref for StateDataSource {
    type Target = Arc<dyn DataSource>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<ServiceState> for StateDataSource {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        Ok(StateDataSource::new(Arc::new(state.clone())))
    }
}

#[async_trait]
impl DataSource for ServiceState {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        if self.is_shutting_down() {
            return Err(DataSourceError::ShuttingDown);
        }
        sqlx::query("SELECT 1")
            .execute(&**self.database())
            .await
            .map_err(|e| {
                tracing::warn!("readiness check failed on database: {}", e);
                DataSourceError::DependencyFailure
            })?;
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub enum MockReadiness {
        Ready,
        DependencyFailure,
        ShuttingDown,
    }

    #[async_trait]
    impl DataSource for MockReadiness {
        async fn is_ready(&self) -> Result<(), DataSourceError> {
            match self {
                MockReadiness::Ready => Ok(()),
                MockReadiness::DependencyFailure => Err(DataSourceError::DependencyFailure),
                MockReadiness::ShuttingDown => Err(DataSourceError::ShuttingDown),
            }
        }
    }
}
