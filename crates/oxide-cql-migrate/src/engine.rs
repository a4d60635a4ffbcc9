//! Schema synchronization.
//!
//! [`SchemaSynchronizer::sync`] brings one table in line with its declared
//! schema:
//!
//! 1. Read the live schema from the catalog.
//! 2. If the table is missing, create it with its indexes and views.
//! 3. If the normalized live and declared schemas are equal, do nothing.
//! 4. Otherwise act on the effective [`MigrationMode`]: refuse (safe),
//!    drop and recreate (drop), or alter column by column (alter, only
//!    when the primary key and clustering order are unchanged).
//! 5. After altering, reconcile indexes, custom indexes and views by
//!    structural identity.
//!
//! Every change except creating a missing table is confirmed through the
//! [`ConfirmationPrompt`]. A refusal ends the run with
//! [`MigrateError::SchemaMismatch`].

use std::collections::BTreeSet;

use oxide_cql_core::{
    check_table_name, ddl::added_column_type, diff_fields, type_change_policy, CqlError, DdlOperation,
    FieldChange, FieldDiff, IndexTarget, NormalizedField, NormalizedSchema, SchemaDescription,
    StructuralDiff, TypeChangePolicy,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogReader, LiveSchema};
use crate::config::{MigrationConfig, MigrationMode};
use crate::error::{MigrateError, MigrationPhase, Result};
use crate::executor::{QueryOptions, StatementExecutor};
use crate::prompt::{is_accepted, ChangeKind, ConfirmationPrompt, ConfirmationRequest};

/// How a synchronization run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The table did not exist and was created.
    Created,
    /// The table already matched.
    Unchanged,
    /// Columns, indexes or views were changed in place.
    Altered,
    /// The table was dropped and created again.
    Recreated,
}

#[derive(Debug, Clone, Copy)]
enum SyncState {
    Idle,
    SchemaFetched,
    NoChange,
    NeedsConfirmation,
    Altering,
    Recreating,
    DefinitionApplied,
    IndexesReconciled,
    ViewsReconciled,
    Ready,
    SchemaMismatch,
}

impl SyncState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SchemaFetched => "schema-fetched",
            Self::NoChange => "no-change",
            Self::NeedsConfirmation => "needs-confirmation",
            Self::Altering => "altering",
            Self::Recreating => "recreating",
            Self::DefinitionApplied => "definition-applied",
            Self::IndexesReconciled => "indexes-reconciled",
            Self::ViewsReconciled => "views-reconciled",
            Self::Ready => "ready",
            Self::SchemaMismatch => "schema-mismatch",
        }
    }
}

/// Synchronizes declared schemas with the database.
pub struct SchemaSynchronizer<'a> {
    executor: &'a dyn StatementExecutor,
    prompt: &'a dyn ConfirmationPrompt,
    config: &'a MigrationConfig,
}

impl<'a> SchemaSynchronizer<'a> {
    /// Creates a synchronizer.
    #[must_use]
    pub fn new(
        executor: &'a dyn StatementExecutor,
        prompt: &'a dyn ConfirmationPrompt,
        config: &'a MigrationConfig,
    ) -> Self {
        Self {
            executor,
            prompt,
            config,
        }
    }

    /// Brings `table` in line with `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Schema`] for an invalid schema or table name,
    /// [`MigrateError::SchemaMismatch`] when the table differs and the mode
    /// or the operator does not allow the change, and
    /// [`MigrateError::Execution`] when a statement fails. Failed steps are
    /// not retried.
    pub async fn sync(&self, table: &str, schema: &SchemaDescription) -> Result<SyncOutcome> {
        check_table_name(table)?;
        schema.validate()?;
        let declared = NormalizedSchema::from_schema(schema)?;
        self.transition(table, SyncState::Idle);

        let live = CatalogReader::new(self.executor, &self.config.keyspace)
            .read_table(table)
            .await?;
        self.transition(table, SyncState::SchemaFetched);

        let Some(live) = live else {
            info!(table = %table, "Creating table");
            self.create_all(table, schema).await?;
            self.transition(table, SyncState::Ready);
            return Ok(SyncOutcome::Created);
        };

        let live_normalized = NormalizedSchema::from_schema(&live.schema)?;
        if live_normalized == declared {
            self.transition(table, SyncState::NoChange);
            self.transition(table, SyncState::Ready);
            return Ok(SyncOutcome::Unchanged);
        }

        let mode = self.config.effective_mode();
        info!(
            table = %table,
            mode = ?mode,
            environment = %self.config.environment,
            "Live table differs from declared schema"
        );
        self.transition(table, SyncState::NeedsConfirmation);

        let outcome = match mode {
            MigrationMode::Safe => return Err(self.mismatch(table)),
            MigrationMode::Drop => self.recreate(table, schema, &live_normalized, false).await?,
            MigrationMode::Alter if live_normalized.same_key(&declared) => {
                self.alter(table, schema, &declared, &live, live_normalized).await?
            }
            MigrationMode::Alter => {
                info!(table = %table, "Primary key changed, table must be recreated");
                self.recreate(table, schema, &live_normalized, false).await?
            }
        };
        self.transition(table, SyncState::Ready);
        Ok(outcome)
    }

    fn transition(&self, table: &str, state: SyncState) {
        debug!(table = %table, state = state.as_str(), "Migration state");
    }

    fn mismatch(&self, table: &str) -> MigrateError {
        self.transition(table, SyncState::SchemaMismatch);
        warn!(table = %table, "Schema mismatch, table left unchanged");
        MigrateError::SchemaMismatch(table.to_string())
    }

    async fn confirm(&self, table: &str, kind: ChangeKind, message: String) -> Result<bool> {
        if self.config.disable_tty_confirmation {
            debug!(table = %table, kind = ?kind, "Confirmation disabled, accepting");
            return Ok(true);
        }
        let answer = self
            .prompt
            .ask(&ConfirmationRequest::new(table, kind, message))
            .await?;
        let accepted = is_accepted(&answer);
        if !accepted {
            warn!(table = %table, kind = ?kind, "Schema change refused");
        }
        Ok(accepted)
    }

    async fn require(&self, table: &str, kind: ChangeKind, message: String) -> Result<()> {
        if self.confirm(table, kind, message).await? {
            Ok(())
        } else {
            Err(self.mismatch(table))
        }
    }

    async fn apply(&self, operation: DdlOperation, phase: MigrationPhase) -> Result<()> {
        let cql = operation.to_cql();
        info!(operation = %operation, "Applying schema change");
        debug!(cql = %cql, phase = %phase, "Executing definition statement");
        self.executor
            .execute(&cql, &[], &QueryOptions::definition())
            .await
            .map_err(|e| MigrateError::execution(phase, e))?;
        Ok(())
    }

    // ========================================================================
    // Create and recreate
    // ========================================================================

    async fn create_all(&self, table: &str, schema: &SchemaDescription) -> Result<()> {
        self.apply(DdlOperation::create_table(table, schema), MigrationPhase::TableCreate)
            .await?;
        self.transition(table, SyncState::DefinitionApplied);

        for target in &schema.indexes {
            let operation = DdlOperation::CreateIndex {
                table: table.to_string(),
                target: target.clone(),
            };
            self.apply(operation, MigrationPhase::DbIndexCreate).await?;
        }
        for index in &schema.custom_indexes {
            let operation = DdlOperation::CreateCustomIndex {
                table: table.to_string(),
                index: index.clone(),
            };
            self.apply(operation, MigrationPhase::DbIndexCreate).await?;
        }
        self.transition(table, SyncState::IndexesReconciled);

        for (name, view) in &schema.materialized_views {
            let operation = DdlOperation::CreateMaterializedView {
                table: table.to_string(),
                name: name.clone(),
                view: view.clone(),
            };
            self.apply(operation, MigrationPhase::MatviewCreate).await?;
        }
        self.transition(table, SyncState::ViewsReconciled);
        Ok(())
    }

    async fn recreate(
        &self,
        table: &str,
        schema: &SchemaDescription,
        live: &NormalizedSchema,
        confirmed: bool,
    ) -> Result<SyncOutcome> {
        if !confirmed {
            self.require(
                table,
                ChangeKind::RecreateTable,
                format!(
                    "Migration: model schema changed for table \"{table}\", drop table & recreate? \
                     (data will be lost!) (y/n): "
                ),
            )
            .await?;
        }
        self.transition(table, SyncState::Recreating);

        for name in live.materialized_views.keys() {
            let operation = DdlOperation::DropMaterializedView { name: name.clone() };
            self.apply(operation, MigrationPhase::MatviewDrop).await?;
        }
        let operation = DdlOperation::DropTable {
            table: table.to_string(),
        };
        self.apply(operation, MigrationPhase::DbDrop).await?;

        self.create_all(table, schema).await?;
        Ok(SyncOutcome::Recreated)
    }

    // ========================================================================
    // Alter
    // ========================================================================

    async fn alter(
        &self,
        table: &str,
        schema: &SchemaDescription,
        declared: &NormalizedSchema,
        live_schema: &LiveSchema,
        mut live: NormalizedSchema,
    ) -> Result<SyncOutcome> {
        self.transition(table, SyncState::Altering);
        let mut rebuilt = BTreeSet::new();

        for diff in diff_fields(&live, declared) {
            let field = diff.field.as_str();
            if rebuilt.contains(field) {
                continue;
            }
            match &diff.change {
                FieldChange::Added { .. } => {
                    self.require(
                        table,
                        ChangeKind::AddColumn,
                        format!(
                            "Migration: model schema for table \"{table}\" has added field \"{field}\", \
                             alter table to add column? (y/n): "
                        ),
                    )
                    .await?;
                    self.add_column(table, &diff, declared).await?;
                }
                FieldChange::Deleted { .. } => {
                    self.require(
                        table,
                        ChangeKind::DropColumn,
                        format!(
                            "Migration: model schema for table \"{table}\" has removed field \"{field}\", \
                             alter table to drop column? (column data will be lost & dependent \
                             indexes/views will be recreated!) (y/n): "
                        ),
                    )
                    .await?;
                    self.remove_column(table, field, &mut live, live_schema).await?;
                }
                FieldChange::TypeChanged { before, after } => {
                    match type_change_policy(&declared.key, field, before, after) {
                        TypeChangePolicy::AlterInPlace => {
                            self.require(
                                table,
                                ChangeKind::AlterColumnType,
                                format!(
                                    "Migration: model schema for table \"{table}\" has new type for field \
                                     \"{field}\", alter table to update column type? (y/n): "
                                ),
                            )
                            .await?;
                            self.alter_column_type(table, &diff, declared).await?;
                        }
                        TypeChangePolicy::RecreateTable => {
                            return self.recreate_for_key_column(table, field, schema, &live).await;
                        }
                        TypeChangePolicy::RecreateColumn => {
                            self.recreate_column(table, &diff, declared, &mut live, live_schema)
                                .await?;
                            rebuilt.insert(field.to_string());
                        }
                    }
                }
                FieldChange::TypeDefChanged { .. } | FieldChange::StaticChanged { .. } => {
                    if declared.key.contains(field) {
                        return self.recreate_for_key_column(table, field, schema, &live).await;
                    }
                    self.recreate_column(table, &diff, declared, &mut live, live_schema)
                        .await?;
                    rebuilt.insert(field.to_string());
                }
            }
        }
        self.transition(table, SyncState::DefinitionApplied);

        self.reconcile(table, schema, declared, &live, live_schema).await?;
        Ok(SyncOutcome::Altered)
    }

    async fn recreate_for_key_column(
        &self,
        table: &str,
        field: &str,
        schema: &SchemaDescription,
        live: &NormalizedSchema,
    ) -> Result<SyncOutcome> {
        self.require(
            table,
            ChangeKind::RecreateTable,
            format!(
                "Migration: model schema for table \"{table}\" has new incompatible type for primary key \
                 field \"{field}\", proceed to recreate table? (y/n): "
            ),
        )
        .await?;
        self.recreate(table, schema, live, true).await
    }

    async fn recreate_column(
        &self,
        table: &str,
        diff: &FieldDiff,
        declared: &NormalizedSchema,
        live: &mut NormalizedSchema,
        live_schema: &LiveSchema,
    ) -> Result<()> {
        let field = diff.field.as_str();
        self.require(
            table,
            ChangeKind::RecreateColumn,
            format!(
                "Migration: model schema for table \"{table}\" has new incompatible type for field \
                 \"{field}\", drop column and recreate? (column data will be lost & dependent \
                 indexes/views will be recreated!) (y/n): "
            ),
        )
        .await?;
        self.remove_column(table, field, live, live_schema).await?;
        self.add_column(table, diff, declared).await
    }

    async fn add_column(&self, table: &str, diff: &FieldDiff, declared: &NormalizedSchema) -> Result<()> {
        let field = declared_field(declared, &diff.field)?;
        let operation = DdlOperation::AddColumn {
            table: table.to_string(),
            column: diff.field.clone(),
            cql_type: added_column_type(diff, field),
            is_static: field.is_static,
        };
        self.apply(operation, MigrationPhase::DbAlter).await
    }

    async fn alter_column_type(
        &self,
        table: &str,
        diff: &FieldDiff,
        declared: &NormalizedSchema,
    ) -> Result<()> {
        let field = declared_field(declared, &diff.field)?;
        let operation = DdlOperation::AlterColumnType {
            table: table.to_string(),
            column: diff.field.clone(),
            cql_type: added_column_type(diff, field),
        };
        self.apply(operation, MigrationPhase::DbAlter).await
    }

    /// Drops a column after the views and indexes that depend on it, and
    /// removes them from the live snapshot so reconciliation can recreate
    /// them from the declared schema.
    async fn remove_column(
        &self,
        table: &str,
        field: &str,
        live: &mut NormalizedSchema,
        live_schema: &LiveSchema,
    ) -> Result<()> {
        let views = live.dependent_views(field);
        let mut index_names = Vec::new();
        for identity in live.dependent_indexes(field) {
            match live_schema.index_name(&identity) {
                Some(name) => index_names.push(name.to_string()),
                None => warn!(table = %table, index = %identity, "No live name for index"),
            }
        }
        for index in live.dependent_custom_indexes(field) {
            match live_schema.index_name(&index.identity()) {
                Some(name) => index_names.push(name.to_string()),
                None => warn!(table = %table, index = %index.on, "No live name for custom index"),
            }
        }

        live.indexes.retain(|identity| IndexTarget::parse(identity).column != field);
        live.custom_indexes.retain(|index| index.on != field);
        for name in &views {
            live.materialized_views.remove(name);
        }

        for name in views {
            self.apply(DdlOperation::DropMaterializedView { name }, MigrationPhase::MatviewDrop)
                .await?;
        }
        for name in index_names {
            self.apply(DdlOperation::DropIndex { name }, MigrationPhase::DbIndexDrop)
                .await?;
        }
        let operation = DdlOperation::DropColumn {
            table: table.to_string(),
            column: field.to_string(),
        };
        self.apply(operation, MigrationPhase::DbAlter).await?;
        live.fields.remove(field);
        Ok(())
    }

    // ========================================================================
    // Reconcile
    // ========================================================================

    async fn reconcile(
        &self,
        table: &str,
        schema: &SchemaDescription,
        declared: &NormalizedSchema,
        live: &NormalizedSchema,
        live_schema: &LiveSchema,
    ) -> Result<()> {
        let structure = StructuralDiff::between(live, declared);

        let mut removed_index_names = Vec::new();
        for identity in &structure.removed_indexes {
            match live_schema.index_name(identity) {
                Some(name) => removed_index_names.push(name.to_string()),
                None => warn!(table = %table, index = %identity, "No live name for index"),
            }
        }
        for index in &structure.removed_custom_indexes {
            match live_schema.index_name(&index.identity()) {
                Some(name) => removed_index_names.push(name.to_string()),
                None => warn!(table = %table, index = %index.on, "No live name for custom index"),
            }
        }

        if !structure.removed_views.is_empty() {
            self.require(
                table,
                ChangeKind::DropViews,
                format!(
                    "Migration: model schema for table \"{table}\" has removed materialized_views: {}, \
                     drop them? (y/n): ",
                    serde_json::to_string(&structure.removed_views)?
                ),
            )
            .await?;
        }
        if !removed_index_names.is_empty() {
            self.require(
                table,
                ChangeKind::DropIndexes,
                format!(
                    "Migration: model schema for table \"{table}\" has removed indexes: {}, \
                     drop them? (y/n): ",
                    serde_json::to_string(&removed_index_names)?
                ),
            )
            .await?;
        }

        for name in &structure.removed_views {
            let operation = DdlOperation::DropMaterializedView { name: name.clone() };
            self.apply(operation, MigrationPhase::MatviewDrop).await?;
        }
        for name in removed_index_names {
            self.apply(DdlOperation::DropIndex { name }, MigrationPhase::DbIndexDrop)
                .await?;
        }

        for target in &structure.added_indexes {
            let operation = DdlOperation::CreateIndex {
                table: table.to_string(),
                target: target.clone(),
            };
            self.apply(operation, MigrationPhase::DbIndexCreate).await?;
        }
        for index in &structure.added_custom_indexes {
            let operation = DdlOperation::CreateCustomIndex {
                table: table.to_string(),
                index: index.clone(),
            };
            self.apply(operation, MigrationPhase::DbIndexCreate).await?;
        }
        self.transition(table, SyncState::IndexesReconciled);

        for name in &structure.added_views {
            let Some(view) = schema.materialized_views.get(name) else {
                continue;
            };
            let operation = DdlOperation::CreateMaterializedView {
                table: table.to_string(),
                name: name.clone(),
                view: view.clone(),
            };
            self.apply(operation, MigrationPhase::MatviewCreate).await?;
        }
        self.transition(table, SyncState::ViewsReconciled);
        Ok(())
    }
}

fn declared_field<'d>(declared: &'d NormalizedSchema, field: &str) -> Result<&'d NormalizedField> {
    declared.fields.get(field).ok_or_else(|| {
        MigrateError::Schema(CqlError::InvalidSchema(format!(
            "field \"{field}\" is not declared"
        )))
    })
}
