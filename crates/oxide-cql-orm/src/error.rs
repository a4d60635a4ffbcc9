//! Error types for the model manager.

use oxide_cql_core::CqlError;
use oxide_cql_migrate::error::MigrateError;
use oxide_cql_migrate::executor::DriverError;
use thiserror::Error;

/// Model manager errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Statement building or validation error.
    #[error(transparent)]
    Cql(#[from] CqlError),

    /// Schema synchronization error.
    #[error(transparent)]
    Migrate(#[from] MigrateError),

    /// Error reported by the driver while running a statement.
    #[error("database error: {0}")]
    Database(#[from] DriverError),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, OrmError>;
