//! Schema definition statements.
//!
//! Every schema change the migration engine can make is a [`DdlOperation`];
//! [`DdlOperation::to_cql`] renders it. The free functions render single
//! statements directly. Identifiers are double-quoted; values never appear
//! in definition statements.

use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;

use crate::diff::{FieldChange, FieldDiff};
use crate::normalize::NormalizedField;
use crate::schema::{ClusteringOrder, CustomIndex, IndexTarget, KeySpec, MaterializedViewSpec, SchemaDescription};

/// Quotes an identifier.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{name}\"")
}

fn quoted_list<'a>(names: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    names.into_iter().map(|n| quote_identifier(n)).collect()
}

fn primary_key_clause(key: &KeySpec) -> String {
    let partition = quoted_list(&key.partition).join(",");
    if key.clustering.is_empty() {
        format!("PRIMARY KEY(({partition}))")
    } else {
        format!(
            "PRIMARY KEY(({partition}),{})",
            quoted_list(&key.clustering).join(",")
        )
    }
}

fn clustering_order_clause(
    key: &KeySpec,
    order: &std::collections::BTreeMap<String, ClusteringOrder>,
) -> String {
    let order_of = |column: &String| order.get(column).copied().unwrap_or_default();
    if !key.clustering.iter().any(|c| order_of(c) == ClusteringOrder::Desc) {
        return String::new();
    }
    let columns: Vec<String> = key
        .clustering
        .iter()
        .map(|c| format!("{} {}", quote_identifier(c), order_of(c).as_str()))
        .collect();
    format!(" WITH CLUSTERING ORDER BY ({})", columns.join(","))
}

/// `CREATE TABLE IF NOT EXISTS` for a schema. Virtual fields are skipped.
#[must_use]
pub fn create_table(table: &str, schema: &SchemaDescription) -> String {
    let mut rows: Vec<String> = schema
        .persisted_fields()
        .map(|field| {
            let mut row = format!("{} {}", quote_identifier(&field.name), field.full_type());
            if field.is_static {
                row.push_str(" STATIC");
            }
            row
        })
        .collect();
    rows.push(primary_key_clause(&schema.key));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}){};",
        quote_identifier(table),
        rows.join(" , "),
        clustering_order_clause(&schema.key, &schema.clustering_order)
    )
}

/// `CREATE MATERIALIZED VIEW IF NOT EXISTS` over a base table.
#[must_use]
pub fn create_materialized_view(table: &str, view_name: &str, view: &MaterializedViewSpec) -> String {
    let select: Vec<String> = view
        .select
        .iter()
        .map(|c| if c == "*" { c.clone() } else { quote_identifier(c) })
        .collect();
    let not_null: Vec<String> = view
        .key
        .columns()
        .map(|c| format!("{} IS NOT NULL", quote_identifier(c)))
        .collect();

    format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {} AS SELECT {} FROM {} WHERE {} {}{};",
        quote_identifier(view_name),
        select.join(" , "),
        quote_identifier(table),
        not_null.join(" AND "),
        primary_key_clause(&view.key),
        clustering_order_clause(&view.key, &view.clustering_order)
    )
}

/// `CREATE INDEX IF NOT EXISTS` on a target such as `name` or `keys(attrs)`.
#[must_use]
pub fn create_index(table: &str, target: &str) -> String {
    let target = IndexTarget::parse(target);
    let column = quote_identifier(&target.column);
    let indexed = match target.function {
        Some(function) => format!("{function}({column})"),
        None => column,
    };
    format!(
        "CREATE INDEX IF NOT EXISTS ON {} ({indexed});",
        quote_identifier(table)
    )
}

/// `CREATE CUSTOM INDEX IF NOT EXISTS`.
#[must_use]
pub fn create_custom_index(table: &str, index: &CustomIndex) -> String {
    let column = IndexTarget::parse(&index.on).column;
    let mut cql = format!(
        "CREATE CUSTOM INDEX IF NOT EXISTS ON {} ({}) USING '{}'",
        quote_identifier(table),
        quote_identifier(&column),
        index.using
    );
    if !index.options.is_empty() {
        let options: Vec<String> = index
            .options
            .iter()
            .map(|(key, value)| format!("'{key}': '{value}'"))
            .collect();
        let _ = write!(cql, " WITH OPTIONS = {{{}}}", options.join(", "));
    }
    cql.push(';');
    cql
}

/// `ALTER TABLE ... ADD`.
#[must_use]
pub fn add_column(table: &str, column: &str, cql_type: &str, is_static: bool) -> String {
    let modifier = if is_static { " STATIC" } else { "" };
    format!(
        "ALTER TABLE {} ADD {} {cql_type}{modifier};",
        quote_identifier(table),
        quote_identifier(column)
    )
}

/// `ALTER TABLE ... ALTER ... TYPE`.
#[must_use]
pub fn alter_column_type(table: &str, column: &str, cql_type: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER {} TYPE {cql_type};",
        quote_identifier(table),
        quote_identifier(column)
    )
}

/// `ALTER TABLE ... DROP`.
#[must_use]
pub fn drop_column(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP {};",
        quote_identifier(table),
        quote_identifier(column)
    )
}

/// `DROP TABLE IF EXISTS`.
#[must_use]
pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_identifier(table))
}

/// `DROP INDEX IF EXISTS`.
#[must_use]
pub fn drop_index(index_name: &str) -> String {
    format!("DROP INDEX IF EXISTS {};", quote_identifier(index_name))
}

/// `DROP MATERIALIZED VIEW IF EXISTS`.
#[must_use]
pub fn drop_materialized_view(view_name: &str) -> String {
    format!("DROP MATERIALIZED VIEW IF EXISTS {};", quote_identifier(view_name))
}

/// `TRUNCATE TABLE`.
#[must_use]
pub fn truncate_table(table: &str) -> String {
    format!("TRUNCATE TABLE {};", quote_identifier(table))
}

/// Returns the type to use when (re-)adding a column for a field diff.
///
/// A full `Added` entry carries the whole definition. Partial diffs take the
/// changed attribute from the diff and the rest from the declared field.
#[must_use]
pub fn added_column_type(diff: &FieldDiff, declared: &NormalizedField) -> String {
    match &diff.change {
        FieldChange::Added { field } => field.full_type(),
        FieldChange::TypeChanged { after, .. } => {
            format!("{after}{}", declared.type_def.as_deref().unwrap_or_default())
        }
        FieldChange::TypeDefChanged { after, .. } => {
            format!("{}{}", declared.field_type, after.as_deref().unwrap_or_default())
        }
        FieldChange::Deleted { .. } | FieldChange::StaticChanged { .. } => declared.full_type(),
    }
}

/// A schema change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum DdlOperation {
    /// Create a table.
    CreateTable {
        /// Table name.
        table: String,
        /// Rendered statement.
        cql: String,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },
    /// Add a column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Full CQL type.
        cql_type: String,
        /// Static column.
        is_static: bool,
    },
    /// Change a column type in place.
    AlterColumnType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// New type.
        cql_type: String,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Create a secondary index.
    CreateIndex {
        /// Table name.
        table: String,
        /// Index target.
        target: String,
    },
    /// Create a custom index.
    CreateCustomIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: CustomIndex,
    },
    /// Drop an index by name.
    DropIndex {
        /// Index name.
        name: String,
    },
    /// Create a materialized view.
    CreateMaterializedView {
        /// Base table.
        table: String,
        /// View name.
        name: String,
        /// View definition.
        view: MaterializedViewSpec,
    },
    /// Drop a materialized view.
    DropMaterializedView {
        /// View name.
        name: String,
    },
}

impl DdlOperation {
    /// Creates a table operation from a schema.
    #[must_use]
    pub fn create_table(table: impl Into<String>, schema: &SchemaDescription) -> Self {
        let table = table.into();
        let cql = create_table(&table, schema);
        Self::CreateTable { table, cql }
    }

    /// Renders the statement.
    #[must_use]
    pub fn to_cql(&self) -> String {
        match self {
            Self::CreateTable { cql, .. } => cql.clone(),
            Self::DropTable { table } => drop_table(table),
            Self::AddColumn {
                table,
                column,
                cql_type,
                is_static,
            } => add_column(table, column, cql_type, *is_static),
            Self::AlterColumnType {
                table,
                column,
                cql_type,
            } => alter_column_type(table, column, cql_type),
            Self::DropColumn { table, column } => drop_column(table, column),
            Self::CreateIndex { table, target } => create_index(table, target),
            Self::CreateCustomIndex { table, index } => create_custom_index(table, index),
            Self::DropIndex { name } => drop_index(name),
            Self::CreateMaterializedView { table, name, view } => {
                create_materialized_view(table, name, view)
            }
            Self::DropMaterializedView { name } => drop_materialized_view(name),
        }
    }
}

impl fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, .. } => write!(f, "create table {table}"),
            Self::DropTable { table } => write!(f, "drop table {table}"),
            Self::AddColumn { table, column, .. } => write!(f, "add column {table}.{column}"),
            Self::AlterColumnType {
                table,
                column,
                cql_type,
            } => write!(f, "alter column {table}.{column} to {cql_type}"),
            Self::DropColumn { table, column } => write!(f, "drop column {table}.{column}"),
            Self::CreateIndex { table, target } => write!(f, "create index on {table}({target})"),
            Self::CreateCustomIndex { table, index } => {
                write!(f, "create custom index on {table}({})", index.on)
            }
            Self::DropIndex { name } => write!(f, "drop index {name}"),
            Self::CreateMaterializedView { name, .. } => write!(f, "create materialized view {name}"),
            Self::DropMaterializedView { name } => write!(f, "drop materialized view {name}"),
        }
    }
}
