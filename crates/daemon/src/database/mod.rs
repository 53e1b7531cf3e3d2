//! The node's peer registry in sqlite
//!
//! Only [`NodeRecord`]s live here; manifests and atom bytes stay in the
//! store directory.

pub mod models;
mod node_store;
mod sqlite;
mod types;

use std::ops::Deref;
use std::path::Path;

use sqlx::SqlitePool;
use url::Url;

pub use models::NodeRecord;

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Database {
    /// Connect to `database_url` and bring its schema up to date
    pub async fn connect(database_url: &Url) -> Result<Self, DatabaseSetupError> {
        if database_url.scheme() != "sqlite" {
            return Err(DatabaseSetupError::UnknownDbType(
                database_url.scheme().to_string(),
            ));
        }
        let pool = sqlite::connect_sqlite(database_url).await?;
        sqlite::migrate_sqlite(&pool).await?;
        Ok(Database(pool))
    }

    /// A database file at `path`, created if missing.
    /// Its parent directory must already exist.
    pub async fn open(path: &Path) -> Result<Self, DatabaseSetupError> {
        if path
            .parent()
            .is_some_and(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        {
            return Err(DatabaseSetupError::MissingDirectory(path.to_path_buf()));
        }
        let url = Url::parse(&format!("sqlite://{}", path.display()))
            .map_err(|_| DatabaseSetupError::InvalidPath(path.to_path_buf()))?;
        Self::connect(&url).await
    }

    /// A private in-memory database, gone when the last handle drops
    pub async fn memory() -> Result<Self, DatabaseSetupError> {
        let url = Url::parse("sqlite::memory:")
            .map_err(|_| DatabaseSetupError::UnknownDbType("sqlite::memory:".to_string()))?;
        Self::connect(&url).await
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),

    #[error("requested database type was not recognized: {0}")]
    UnknownDbType(String),

    #[error("database directory does not exist for {0}")]
    MissingDirectory(std::path::PathBuf),

    #[error("database path is not usable as a sqlite url: {0}")]
    InvalidPath(std::path::PathBuf),
}
