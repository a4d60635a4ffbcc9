//! The statement execution interface.
//!
//! The migration engine and the model manager never talk to a driver
//! directly. They send statements through a [`StatementExecutor`], which a
//! host application implements on top of its driver session.

use async_trait::async_trait;
use oxide_cql_core::{BindValue, Statement};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server error code for a query against a table that does not exist.
pub const UNCONFIGURED_TABLE: i32 = 0x2200;

/// Rows returned by a statement, one JSON object per row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Rows keyed by column name.
    pub rows: Vec<Map<String, Value>>,
}

impl RowSet {
    /// Creates an empty result.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a result from rows.
    #[must_use]
    pub const fn new(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows }
    }

    /// Returns true if no rows were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// An error reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    /// Server error code, when the server sent one.
    pub code: Option<i32>,
    /// Error message.
    pub message: String,
}

impl DriverError {
    /// Creates an error without a server code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Sets the server error code.
    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Returns true if the statement targeted a table that does not exist.
    #[must_use]
    pub fn is_undefined_table(&self) -> bool {
        self.code == Some(UNCONFIGURED_TABLE)
    }
}

/// Consistency level of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// A write is accepted once any node, hints included, has stored it.
    Any,
    /// One replica.
    One,
    /// Two replicas.
    Two,
    /// Three replicas.
    Three,
    /// A majority of replicas across all datacenters.
    Quorum,
    /// Every replica.
    All,
    /// A majority of replicas in the local datacenter.
    LocalQuorum,
    /// A majority of replicas in each datacenter.
    EachQuorum,
    /// One replica in the local datacenter.
    LocalOne,
    /// Linearizable read across all datacenters.
    Serial,
    /// Linearizable read in the local datacenter.
    LocalSerial,
}

/// Per-statement driver options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Use a prepared statement.
    pub prepare: bool,
    /// Page size for reads.
    pub fetch_size: Option<u32>,
    /// Consistency level; the session default when `None`.
    pub consistency: Option<Consistency>,
    /// Log the batch before applying it.
    pub logged: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            prepare: true,
            fetch_size: None,
            consistency: None,
            logged: true,
        }
    }
}

impl QueryOptions {
    /// Options for schema definition statements, which are never prepared.
    #[must_use]
    pub fn definition() -> Self {
        Self {
            prepare: false,
            ..Self::default()
        }
    }

    /// Sets the page size.
    #[must_use]
    pub const fn fetch_size(mut self, size: u32) -> Self {
        self.fetch_size = Some(size);
        self
    }

    /// Sets the consistency level.
    #[must_use]
    pub const fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Sends batches unlogged.
    #[must_use]
    pub const fn unlogged(mut self) -> Self {
        self.logged = false;
        self
    }
}

/// Renders a batch of statements as one `BEGIN BATCH ... APPLY BATCH;`
/// statement with concatenated parameters.
#[must_use]
pub fn batch_statement(statements: &[Statement], logged: bool) -> Statement {
    let mut query = String::from(if logged { "BEGIN BATCH " } else { "BEGIN UNLOGGED BATCH " });
    let mut params = Vec::new();
    for statement in statements {
        query.push_str(&statement.query);
        query.push(' ');
        params.extend(statement.params.iter().cloned());
    }
    query.push_str("APPLY BATCH;");
    Statement::new(query).with_params(params)
}

/// Sends statements to the database.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Executes one statement.
    async fn execute(
        &self,
        query: &str,
        params: &[BindValue],
        options: &QueryOptions,
    ) -> Result<RowSet, DriverError>;

    /// Executes statements atomically.
    ///
    /// The default sends them as a single batch statement; drivers with a
    /// native batch call should override it.
    async fn batch(&self, statements: &[Statement], options: &QueryOptions) -> Result<(), DriverError> {
        let batch = batch_statement(statements, options.logged);
        self.execute(&batch.query, &batch.params, options).await?;
        Ok(())
    }
}
