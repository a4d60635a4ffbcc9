//! The model manager.
//!
//! A [`Model`] binds one table to its declared schema and runs every
//! statement through the host's [`StatementExecutor`]. The table is
//! synchronized before the first statement and again, once, when the
//! driver reports that the table does not exist.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use oxide_cql_core::{
    check_table_name, ddl, delete_statement, find_statement, insert_statement, update_statement,
    FindOptions, InsertOptions, Record, SchemaDescription, Statement, UpdateOptions,
};
use oxide_cql_migrate::config::MigrationConfig;
use oxide_cql_migrate::engine::{SchemaSynchronizer, SyncOutcome};
use oxide_cql_migrate::executor::{DriverError, QueryOptions, RowSet, StatementExecutor};
use oxide_cql_migrate::prompt::{ConfirmationPrompt, StdinPrompt};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{OrmError, Result};

enum Operation<'a> {
    Execute(&'a Statement, &'a QueryOptions),
    Batch(&'a [Statement], &'a QueryOptions),
}

/// A table with its schema, executor and migration settings.
///
/// # Example
///
/// ```ignore
/// let users = Model::new("users", schema, session, config)?;
/// users.sync().await?;
///
/// let mut alice = Record::with_values(values);
/// users.save(&mut alice, InsertOptions::default()).await?;
///
/// let adults = users.find(&filter, &FindOptions::new()).await?;
/// ```
pub struct Model {
    table: String,
    schema: SchemaDescription,
    executor: Arc<dyn StatementExecutor>,
    prompt: Arc<dyn ConfirmationPrompt>,
    config: MigrationConfig,
    ready: AtomicBool,
    sync_lock: Mutex<()>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.table)
            .field("keyspace", &self.config.keyspace)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Creates a model that confirms destructive changes on the terminal.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Cql`] if the table name or the schema is invalid.
    pub fn new(
        table: impl Into<String>,
        schema: SchemaDescription,
        executor: Arc<dyn StatementExecutor>,
        config: MigrationConfig,
    ) -> Result<Self> {
        let table = table.into();
        check_table_name(&table)?;
        schema.validate()?;
        Ok(Self {
            table,
            schema,
            executor,
            prompt: Arc::new(StdinPrompt),
            config,
            ready: AtomicBool::new(false),
            sync_lock: Mutex::new(()),
        })
    }

    /// Replaces the confirmation prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn ConfirmationPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the keyspace name.
    #[must_use]
    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }

    /// Returns the declared schema.
    #[must_use]
    pub const fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    /// Returns true once the table has been synchronized.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Synchronizes the table with the declared schema.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Migrate`] if the engine refuses or fails.
    pub async fn sync(&self) -> Result<SyncOutcome> {
        let _guard = self.sync_lock.lock().await;
        self.sync_locked().await
    }

    async fn sync_locked(&self) -> Result<SyncOutcome> {
        let outcome = SchemaSynchronizer::new(self.executor.as_ref(), self.prompt.as_ref(), &self.config)
            .sync(&self.table, &self.schema)
            .await?;
        self.ready.store(true, Ordering::Release);
        info!(table = %self.table, outcome = ?outcome, "Table ready");
        Ok(outcome)
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let _guard = self.sync_lock.lock().await;
        if !self.is_ready() {
            self.sync_locked().await?;
        }
        Ok(())
    }

    async fn dispatch(&self, operation: &Operation<'_>) -> std::result::Result<RowSet, DriverError> {
        match operation {
            Operation::Execute(statement, options) => {
                self.executor
                    .execute(&statement.query, &statement.params, options)
                    .await
            }
            Operation::Batch(statements, options) => {
                self.executor.batch(statements, options).await?;
                Ok(RowSet::empty())
            }
        }
    }

    async fn run(&self, operation: Operation<'_>) -> Result<RowSet> {
        self.ensure_ready().await?;
        match self.dispatch(&operation).await {
            Ok(rows) => Ok(rows),
            Err(error) if error.is_undefined_table() => {
                warn!(table = %self.table, error = %error, "Table missing, synchronizing again");
                self.ready.store(false, Ordering::Release);
                self.sync().await?;
                Ok(self.dispatch(&operation).await?)
            }
            Err(error) => Err(OrmError::Database(error)),
        }
    }

    /// Runs a statement, synchronizing the table first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Database`] if the driver fails, including a
    /// second "undefined table" after a resynchronization.
    pub async fn execute(&self, statement: &Statement, options: &QueryOptions) -> Result<RowSet> {
        debug!(table = %self.table, query = %statement.query, "Executing");
        self.run(Operation::Execute(statement, options)).await
    }

    /// Runs statements as one batch.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn execute_batch(&self, statements: &[Statement], options: &QueryOptions) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        debug!(table = %self.table, count = statements.len(), "Executing batch");
        self.run(Operation::Batch(statements, options)).await?;
        Ok(())
    }

    /// Reads rows matching a query object as clean records.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Cql`] for an invalid query object, before any
    /// statement runs.
    pub async fn find(&self, query: &Map<String, Value>, options: &FindOptions) -> Result<Vec<Record>> {
        let rows = self.find_raw(query, options).await?;
        Ok(rows.into_iter().map(Record::from_row).collect())
    }

    /// Reads rows matching a query object as plain JSON objects.
    ///
    /// # Errors
    ///
    /// See [`Self::find`].
    pub async fn find_raw(
        &self,
        query: &Map<String, Value>,
        options: &FindOptions,
    ) -> Result<Vec<Map<String, Value>>> {
        let statement = find_statement(&self.schema, &self.table, query, options)?;
        Ok(self.execute(&statement, &QueryOptions::default()).await?.rows)
    }

    /// Reads the first row matching a query object.
    ///
    /// # Errors
    ///
    /// See [`Self::find`].
    pub async fn find_one(&self, query: &Map<String, Value>, options: &FindOptions) -> Result<Option<Record>> {
        let mut query = query.clone();
        query.insert("$limit".to_string(), Value::from(1));
        Ok(self.find(&query, options).await?.into_iter().next())
    }

    /// Updates rows matching a query object. Conditional updates return
    /// the `[applied]` row.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Cql`] for invalid queries or values.
    pub async fn update(
        &self,
        query: &Map<String, Value>,
        updates: &Map<String, Value>,
        options: &UpdateOptions,
    ) -> Result<RowSet> {
        let statement = update_statement(&self.schema, &self.table, query, updates, options)?;
        self.execute(&statement, &QueryOptions::default()).await
    }

    /// Deletes rows matching a query object.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Cql`] for an invalid query object.
    pub async fn delete(&self, query: &Map<String, Value>) -> Result<()> {
        let statement = delete_statement(&self.schema, &self.table, query)?;
        self.execute(&statement, &QueryOptions::default()).await?;
        Ok(())
    }

    /// Inserts a record and marks it clean.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Cql`] for missing keys, missing required values
    /// or invalid values. The record stays dirty on failure.
    pub async fn save(&self, record: &mut Record, options: InsertOptions) -> Result<RowSet> {
        let values = record.persisted_values(&self.schema);
        let statement = insert_statement(&self.schema, &self.table, &values, options)?;
        let rows = self.execute(&statement, &QueryOptions::default()).await?;
        record.clear_dirty();
        Ok(rows)
    }

    /// Removes every row of the table.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn truncate(&self) -> Result<()> {
        let statement = Statement::new(ddl::truncate_table(&self.table));
        self.execute(&statement, &QueryOptions::definition()).await?;
        Ok(())
    }
}
