//! Error types for schema synchronization.

use std::fmt;

use oxide_cql_core::CqlError;

use crate::executor::DriverError;

/// The step of a synchronization run a failed statement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Creating the table.
    TableCreate,
    /// Dropping the table.
    DbDrop,
    /// Altering a column.
    DbAlter,
    /// Creating an index or custom index.
    DbIndexCreate,
    /// Dropping an index.
    DbIndexDrop,
    /// Creating a materialized view.
    MatviewCreate,
    /// Dropping a materialized view.
    MatviewDrop,
    /// Reading the catalog.
    DbSchemaQuery,
}

impl MigrationPhase {
    /// Returns the phase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TableCreate => "table-create",
            Self::DbDrop => "db-drop",
            Self::DbAlter => "db-alter",
            Self::DbIndexCreate => "db-index-create",
            Self::DbIndexDrop => "db-index-drop",
            Self::MatviewCreate => "matview-create",
            Self::MatviewDrop => "matview-drop",
            Self::DbSchemaQuery => "db-schema-query",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while synchronizing a table.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The declared schema is invalid.
    #[error(transparent)]
    Schema(#[from] CqlError),

    /// The live table differs and the migration policy does not allow
    /// changing it.
    #[error("Schema mismatch: table \"{0}\" does not match the declared schema")]
    SchemaMismatch(String),

    /// A statement failed.
    #[error("Error during {phase}: {source}")]
    Execution {
        /// Step the statement belonged to.
        phase: MigrationPhase,
        /// Driver error.
        #[source]
        source: DriverError,
    },

    /// A catalog row could not be interpreted.
    #[error("Malformed catalog row: {0}")]
    Catalog(String),

    /// The confirmation prompt failed.
    #[error("Confirmation prompt failed: {0}")]
    Prompt(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error (reading schema or config files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// Wraps a driver error with the phase it occurred in.
    #[must_use]
    pub const fn execution(phase: MigrationPhase, source: DriverError) -> Self {
        Self::Execution { phase, source }
    }
}

/// Result type for synchronization.
pub type Result<T> = std::result::Result<T, MigrateError>;
