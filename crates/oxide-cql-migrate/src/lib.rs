//! Schema synchronization for Cassandra-family databases.
//!
//! `oxide-cql-migrate` compares a table's declared schema with what the
//! database catalog reports and applies the difference:
//!
//! - **Catalog** - reads columns, indexes and views from `system_schema`
//! - **Engine** - decides between creating, altering and recreating
//! - **Prompt** - confirms destructive changes with the operator
//! - **Executor** - the statement interface a driver implements
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_cql_migrate::prelude::*;
//!
//! let config = MigrationConfig::new("app").migration(MigrationMode::Alter);
//! let schema = load_schema_file("schemas/users.json")?;
//! let outcome = SchemaSynchronizer::new(&session, &StdinPrompt, &config)
//!     .sync("users", &schema)
//!     .await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the definition statements of a schema
//! oxide-cql-migrate ddl schemas/users.json
//!
//! # Compare a schema with a dump of the live schema
//! oxide-cql-migrate diff schemas/users.json live/users.json
//!
//! # Translate a filter object
//! oxide-cql-migrate query schemas/users.json '{"age": {"$gte": 18}}'
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod prompt;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::{CatalogReader, LiveSchema};
    pub use crate::config::{load_schema_file, Environment, MigrationConfig, MigrationMode};
    pub use crate::engine::{SchemaSynchronizer, SyncOutcome};
    pub use crate::error::{MigrateError, MigrationPhase, Result};
    pub use crate::executor::{
        Consistency, DriverError, QueryOptions, RowSet, StatementExecutor, UNCONFIGURED_TABLE,
    };
    pub use crate::prompt::{
        AllowList, AutoConfirm, ChangeKind, ConfirmationPrompt, ConfirmationRequest, DenyAll,
        StdinPrompt,
    };
}
