//! # oxide-cql-orm
//!
//! Table models for Cassandra-family databases.
//!
//! A [`Model`] owns a table's declared schema and runs reads and writes
//! through a host-provided executor:
//!
//! - the table is synchronized before the first statement
//! - a statement that hits a missing table triggers one resync and one retry
//! - rows come back as clean [`Record`]s, or raw JSON objects with `find_raw`
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use oxide_cql_orm::prelude::*;
//! use serde_json::json;
//!
//! let schema = SchemaDescription::from_json(&json!({
//!     "fields": {"id": "uuid", "name": "text", "age": "int"},
//!     "key": ["id"]
//! }))?;
//! let config = MigrationConfig::new("app").migration(MigrationMode::Alter);
//! let users = Model::new("users", schema, Arc::new(session), config)?;
//!
//! let mut alice = Record::with_values(json!({"id": id, "name": "alice"}).as_object().cloned().unwrap());
//! users.save(&mut alice, InsertOptions::default()).await?;
//!
//! let adults = users
//!     .find(json!({"age": {"$gte": 18}}).as_object().unwrap(), &FindOptions::new())
//!     .await?;
//! ```

pub mod error;
pub mod model;

pub use error::{OrmError, Result};
pub use model::Model;
pub use oxide_cql_core::Record;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{OrmError, Result};
    pub use crate::model::Model;
    pub use oxide_cql_core::{
        FindOptions, InsertOptions, Record, SchemaDescription, Statement, UpdateOptions,
    };
    pub use oxide_cql_migrate::prelude::{
        ConfirmationPrompt, MigrationConfig, MigrationMode, QueryOptions, RowSet, StatementExecutor,
        SyncOutcome,
    };
}
