//! Reading a table's live schema from the `system_schema` catalog.

use std::collections::{BTreeMap, HashMap};

use oxide_cql_core::{
    extract_type, extract_type_def, BindValue, ClusteringOrder, CustomIndex, FieldSpec, IndexTarget,
    KeySpec, MaterializedViewSpec, SchemaDescription,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{MigrateError, MigrationPhase, Result};
use crate::executor::{QueryOptions, RowSet, StatementExecutor};

/// Columns of one table.
pub const COLUMNS_QUERY: &str =
    "SELECT * FROM system_schema.columns WHERE table_name = ? AND keyspace_name = ?;";

/// Indexes of one table.
pub const INDEXES_QUERY: &str =
    "SELECT * FROM system_schema.indexes WHERE table_name = ? AND keyspace_name = ?;";

/// Views of a keyspace.
pub const VIEWS_QUERY: &str =
    "SELECT view_name,base_table_name FROM system_schema.views WHERE keyspace_name=?;";

/// Columns of a set of views.
pub const VIEW_COLUMNS_QUERY: &str =
    "SELECT * FROM system_schema.columns WHERE keyspace_name=? and table_name IN ?;";

/// A table as it exists in the database.
#[derive(Debug, Clone)]
pub struct LiveSchema {
    /// The table in declared-schema form.
    pub schema: SchemaDescription,
    /// Live index names, keyed by normalized index target for secondary
    /// indexes and by [`CustomIndex::identity`] for custom indexes.
    pub index_names: HashMap<String, String>,
}

impl LiveSchema {
    /// Returns the live name of a secondary index.
    #[must_use]
    pub fn index_name(&self, identity: &str) -> Option<&str> {
        self.index_names.get(identity).map(String::as_str)
    }
}

/// Reads live schemas through a [`StatementExecutor`].
pub struct CatalogReader<'a> {
    executor: &'a dyn StatementExecutor,
    keyspace: &'a str,
}

impl<'a> CatalogReader<'a> {
    /// Creates a reader for a keyspace.
    #[must_use]
    pub fn new(executor: &'a dyn StatementExecutor, keyspace: &'a str) -> Self {
        Self { executor, keyspace }
    }

    async fn query(&self, query: &str, params: Vec<Value>) -> Result<RowSet> {
        let params: Vec<BindValue> = params.into_iter().map(BindValue::Value).collect();
        self.executor
            .execute(query, &params, &QueryOptions::default())
            .await
            .map_err(|e| MigrateError::execution(MigrationPhase::DbSchemaQuery, e))
    }

    /// Reads a table, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Execution`] in the `db-schema-query` phase
    /// when a catalog query fails and [`MigrateError::Catalog`] for rows
    /// that cannot be interpreted.
    pub async fn read_table(&self, table: &str) -> Result<Option<LiveSchema>> {
        let columns = self
            .query(COLUMNS_QUERY, vec![json!(table), json!(self.keyspace)])
            .await?;
        if columns.is_empty() {
            debug!(table = %table, keyspace = %self.keyspace, "Table not found in catalog");
            return Ok(None);
        }

        let mut schema = SchemaDescription::new().table_name(table);
        let shape = ColumnShape::from_rows(&columns.rows)?;
        for column in &shape.columns {
            let mut field = FieldSpec::new(column.name.clone(), extract_type(&column.cql_type));
            let type_def = extract_type_def(&column.cql_type);
            if !type_def.is_empty() {
                field = field.type_def(type_def);
            }
            if column.kind == "static" {
                field = field.static_column();
            }
            schema = schema.field(field);
        }
        schema.key = shape.key;
        schema.clustering_order = shape.clustering_order;

        let mut index_names = HashMap::new();
        let indexes = self
            .query(INDEXES_QUERY, vec![json!(table), json!(self.keyspace)])
            .await?;
        for row in &indexes.rows {
            let Some(name) = row.get("index_name").and_then(Value::as_str) else {
                continue;
            };
            let mut options = string_map(row.get("options"));
            let target: String = options
                .remove("target")
                .ok_or_else(|| MigrateError::Catalog(format!("index '{name}' has no target")))?
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '"')
                .collect();

            if str_field(row, "kind")? == "CUSTOM" {
                let using = options.remove("class_name").ok_or_else(|| {
                    MigrateError::Catalog(format!("custom index '{name}' has no class_name"))
                })?;
                let index = CustomIndex {
                    on: target,
                    using,
                    options,
                };
                index_names.insert(index.identity(), name.to_string());
                schema.custom_indexes.push(index);
            } else {
                index_names.insert(IndexTarget::parse(&target).normalized(), name.to_string());
                schema.indexes.push(target);
            }
        }

        let views = self.query(VIEWS_QUERY, vec![json!(self.keyspace)]).await?;
        let view_names: Vec<String> = views
            .rows
            .iter()
            .filter(|row| row.get("base_table_name").and_then(Value::as_str) == Some(table))
            .filter_map(|row| row.get("view_name").and_then(Value::as_str).map(str::to_string))
            .collect();
        if !view_names.is_empty() {
            let view_columns = self
                .query(VIEW_COLUMNS_QUERY, vec![json!(self.keyspace), json!(view_names)])
                .await?;
            for view_name in &view_names {
                let rows: Vec<Map<String, Value>> = view_columns
                    .rows
                    .iter()
                    .filter(|row| row.get("table_name").and_then(Value::as_str) == Some(view_name))
                    .cloned()
                    .collect();
                let shape = ColumnShape::from_rows(&rows)?;
                let mut view = MaterializedViewSpec::new(
                    shape.columns.iter().map(|c| c.name.clone()),
                    shape.key,
                );
                view.clustering_order = shape.clustering_order;
                schema.materialized_views.insert(view_name.clone(), view);
            }
        }

        debug!(
            table = %table,
            fields = schema.fields.len(),
            indexes = schema.indexes.len(),
            custom_indexes = schema.custom_indexes.len(),
            views = schema.materialized_views.len(),
            "Read live schema"
        );
        Ok(Some(LiveSchema {
            schema,
            index_names,
        }))
    }
}

struct CatalogColumn {
    name: String,
    cql_type: String,
    kind: String,
}

struct ColumnShape {
    columns: Vec<CatalogColumn>,
    key: KeySpec,
    clustering_order: BTreeMap<String, ClusteringOrder>,
}

impl ColumnShape {
    fn from_rows(rows: &[Map<String, Value>]) -> Result<Self> {
        let mut columns = Vec::with_capacity(rows.len());
        let mut partition = Vec::new();
        let mut clustering = Vec::new();
        let mut clustering_order = BTreeMap::new();

        for row in rows {
            let name = str_field(row, "column_name")?.to_string();
            let kind = str_field(row, "kind")?.to_string();
            let position = row.get("position").and_then(Value::as_i64).unwrap_or(-1);
            match kind.as_str() {
                "partition_key" => partition.push((position, name.clone())),
                "clustering" => {
                    clustering.push((position, name.clone()));
                    let order = row
                        .get("clustering_order")
                        .and_then(Value::as_str)
                        .and_then(ClusteringOrder::parse)
                        .unwrap_or_default();
                    clustering_order.insert(name.clone(), order);
                }
                _ => {}
            }
            columns.push(CatalogColumn {
                name,
                cql_type: str_field(row, "type")?.to_string(),
                kind,
            });
        }

        partition.sort();
        clustering.sort();
        let mut key = KeySpec::new(partition.into_iter().map(|(_, name)| name));
        key.clustering = clustering.into_iter().map(|(_, name)| name).collect();

        Ok(Self {
            columns,
            key,
            clustering_order,
        })
    }
}

fn str_field<'r>(row: &'r Map<String, Value>, name: &str) -> Result<&'r str> {
    row.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| MigrateError::Catalog(format!("missing text column '{name}'")))
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| {
                    let text = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                    (key.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}
