#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use oxide_cql_core::{
    BindValue, ClusteringOrder, CustomIndex, FieldSpec, KeySpec, MaterializedViewSpec,
    SchemaDescription,
};
use oxide_cql_migrate::catalog::{COLUMNS_QUERY, INDEXES_QUERY, VIEWS_QUERY, VIEW_COLUMNS_QUERY};
use oxide_cql_migrate::prelude::*;
use serde_json::{json, Map, Value};

// ============================================================================
// Fake cluster
// ============================================================================

#[derive(Debug, Clone)]
struct Column {
    name: String,
    cql_type: String,
    kind: &'static str,
    position: i64,
    order: ClusteringOrder,
}

#[derive(Debug, Clone)]
struct Index {
    table: String,
    name: String,
    kind: &'static str,
    options: Map<String, Value>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<Column>>,
    views: BTreeMap<String, (String, Vec<Column>)>,
    indexes: Vec<Index>,
    log: Vec<String>,
}

/// An in-memory cluster that applies the definition statements the
/// synchronizer generates and answers its catalog queries.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

fn unquote(name: &str) -> String {
    name.trim().trim_matches('"').to_string()
}

fn unquote_list(list: &str) -> Vec<String> {
    list.split(',').filter(|s| !s.trim().is_empty()).map(unquote).collect()
}

/// Splits `PRIMARY KEY((...),...)` into partition and clustering columns.
fn parse_primary_key(clause: &str) -> (Vec<String>, Vec<String>) {
    let inner = clause
        .trim()
        .strip_prefix("PRIMARY KEY((")
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or_else(|| panic!("bad primary key clause: {clause}"));
    match inner.split_once("),") {
        Some((partition, clustering)) => (unquote_list(partition), unquote_list(clustering)),
        None => (unquote_list(inner.trim_end_matches(')')), Vec::new()),
    }
}

fn parse_order(order: &str) -> BTreeMap<String, ClusteringOrder> {
    order
        .split(',')
        .filter_map(|item| item.trim().split_once(' '))
        .map(|(column, order)| {
            (unquote(column), ClusteringOrder::parse(order).unwrap_or_default())
        })
        .collect()
}

fn split_order(statement: &str) -> (&str, BTreeMap<String, ClusteringOrder>) {
    match statement.split_once(" WITH CLUSTERING ORDER BY (") {
        Some((head, order)) => (head, parse_order(order.trim_end_matches(')'))),
        None => (statement, BTreeMap::new()),
    }
}

fn key_columns(
    partition: &[String],
    clustering: &[String],
    order: &BTreeMap<String, ClusteringOrder>,
    type_of: impl Fn(&str) -> String,
) -> Vec<Column> {
    let mut columns = Vec::new();
    for (i, name) in partition.iter().enumerate() {
        columns.push(Column {
            name: name.clone(),
            cql_type: type_of(name),
            kind: "partition_key",
            position: i64::try_from(i).unwrap_or_default(),
            order: ClusteringOrder::Asc,
        });
    }
    for (i, name) in clustering.iter().enumerate() {
        columns.push(Column {
            name: name.clone(),
            cql_type: type_of(name),
            kind: "clustering",
            position: i64::try_from(i).unwrap_or_default(),
            order: order.get(name).copied().unwrap_or_default(),
        });
    }
    columns
}

/// Catalog type strings put a space after commas.
fn catalog_type(cql_type: &str) -> String {
    cql_type.replace(',', ", ")
}

fn column_row(table: &str, column: &Column) -> Map<String, Value> {
    let order = match column.kind {
        "clustering" => column.order.as_str().to_lowercase(),
        _ => "none".to_string(),
    };
    let row = json!({
        "keyspace_name": "app",
        "table_name": table,
        "column_name": column.name,
        "type": column.cql_type,
        "kind": column.kind,
        "position": column.position,
        "clustering_order": order,
    });
    row.as_object().cloned().unwrap_or_default()
}

impl State {
    fn apply(&mut self, cql: &str) {
        let statement = cql.strip_suffix(';').unwrap_or(cql);
        if let Some(rest) = statement.strip_prefix("CREATE TABLE IF NOT EXISTS ") {
            self.create_table(rest);
        } else if let Some(rest) = statement.strip_prefix("CREATE MATERIALIZED VIEW IF NOT EXISTS ") {
            self.create_view(rest);
        } else if let Some(rest) = statement.strip_prefix("CREATE CUSTOM INDEX IF NOT EXISTS ON ") {
            self.create_custom_index(rest);
        } else if let Some(rest) = statement.strip_prefix("CREATE INDEX IF NOT EXISTS ON ") {
            self.create_index(rest);
        } else if let Some(rest) = statement.strip_prefix("DROP TABLE IF EXISTS ") {
            let table = unquote(rest);
            self.tables.remove(&table);
            self.indexes.retain(|index| index.table != table);
        } else if let Some(rest) = statement.strip_prefix("DROP MATERIALIZED VIEW IF EXISTS ") {
            self.views.remove(&unquote(rest));
        } else if let Some(rest) = statement.strip_prefix("DROP INDEX IF EXISTS ") {
            let name = unquote(rest);
            self.indexes.retain(|index| index.name != name);
        } else if let Some(rest) = statement.strip_prefix("ALTER TABLE ") {
            self.alter_table(rest);
        }
    }

    fn create_table(&mut self, rest: &str) {
        let (head, order) = split_order(rest);
        let (name, body) = head.split_once(" (").unwrap_or_else(|| panic!("bad table: {head}"));
        let body = body.strip_suffix(')').unwrap_or(body);
        let rows: Vec<&str> = body.split(" , ").collect();
        let (primary_key, definitions) = rows.split_last().unwrap_or_else(|| panic!("no rows: {body}"));

        let mut types = BTreeMap::new();
        let mut statics = Vec::new();
        for &definition in definitions {
            let (column, rest) = definition.split_once(' ').unwrap_or((definition, ""));
            let (cql_type, is_static) = match rest.strip_suffix(" STATIC") {
                Some(cql_type) => (cql_type, true),
                None => (rest, false),
            };
            types.insert(unquote(column), catalog_type(cql_type));
            if is_static {
                statics.push(unquote(column));
            }
        }

        let (partition, clustering) = parse_primary_key(primary_key);
        let mut columns = key_columns(&partition, &clustering, &order, |c| {
            types.get(c).cloned().unwrap_or_default()
        });
        for (column, cql_type) in &types {
            if partition.contains(column) || clustering.contains(column) {
                continue;
            }
            columns.push(Column {
                name: column.clone(),
                cql_type: cql_type.clone(),
                kind: if statics.contains(column) { "static" } else { "regular" },
                position: -1,
                order: ClusteringOrder::Asc,
            });
        }
        self.tables.insert(unquote(name), columns);
    }

    fn create_view(&mut self, rest: &str) {
        let (head, order) = split_order(rest);
        let (name, rest) = head.split_once(" AS SELECT ").unwrap_or_else(|| panic!("bad view: {head}"));
        let (select, rest) = rest.split_once(" FROM ").unwrap_or_else(|| panic!("bad view: {rest}"));
        let (base, rest) = rest.split_once(" WHERE ").unwrap_or_else(|| panic!("bad view: {rest}"));
        let (_, primary_key) = rest.split_once(" PRIMARY KEY").unwrap_or_else(|| panic!("bad view: {rest}"));
        let (partition, clustering) = parse_primary_key(&format!("PRIMARY KEY{primary_key}"));

        let base = unquote(base);
        let base_columns = self.tables.get(&base).cloned().unwrap_or_default();
        let type_of = |c: &str| {
            base_columns
                .iter()
                .find(|column| column.name == c)
                .map(|column| column.cql_type.clone())
                .unwrap_or_default()
        };
        let selected: Vec<String> = if select.trim() == "*" {
            base_columns.iter().map(|c| c.name.clone()).collect()
        } else {
            select.split(" , ").map(unquote).collect()
        };

        let mut columns = key_columns(&partition, &clustering, &order, &type_of);
        for column in selected {
            if partition.contains(&column) || clustering.contains(&column) {
                continue;
            }
            columns.push(Column {
                cql_type: type_of(&column),
                name: column,
                kind: "regular",
                position: -1,
                order: ClusteringOrder::Asc,
            });
        }
        self.views.insert(unquote(name), (base, columns));
    }

    fn is_collection(&self, table: &str, column: &str) -> bool {
        self.tables.get(table).is_some_and(|columns| {
            columns.iter().any(|c| {
                c.name == column
                    && (c.cql_type.starts_with("set<")
                        || c.cql_type.starts_with("list<")
                        || c.cql_type.starts_with("map<"))
            })
        })
    }

    fn create_index(&mut self, rest: &str) {
        let (table, target) = rest.split_once(" (").unwrap_or_else(|| panic!("bad index: {rest}"));
        let table = unquote(table);
        let target = target.strip_suffix(')').unwrap_or(target);
        let (function, column) = match target.split_once('(') {
            Some((function, column)) => (Some(function.to_string()), unquote(column.trim_end_matches(')'))),
            None => (None, unquote(target)),
        };
        let stored = match function {
            Some(function) => format!("{function}({column})"),
            None if self.is_collection(&table, &column) => format!("values({column})"),
            None => column.clone(),
        };
        let name = format!("{table}_{column}_idx");
        let mut options = Map::new();
        options.insert("target".to_string(), json!(stored));
        self.indexes.push(Index {
            table,
            name,
            kind: "COMPOSITES",
            options,
        });
    }

    fn create_custom_index(&mut self, rest: &str) {
        let (table, rest) = rest.split_once(" (").unwrap_or_else(|| panic!("bad index: {rest}"));
        let (column, rest) = rest.split_once(") USING '").unwrap_or_else(|| panic!("bad index: {rest}"));
        let (class_name, options) = match rest.split_once("' WITH OPTIONS = {") {
            Some((class_name, options)) => (class_name, options.trim_end_matches('}')),
            None => (rest.trim_end_matches('\''), ""),
        };

        let table = unquote(table);
        let column = unquote(column);
        let mut stored = Map::new();
        stored.insert("target".to_string(), json!(column));
        stored.insert("class_name".to_string(), json!(class_name));
        for pair in options.split(", ").filter(|p| !p.is_empty()) {
            if let Some((key, value)) = pair.split_once(": ") {
                stored.insert(key.trim_matches('\'').to_string(), json!(value.trim_matches('\'')));
            }
        }
        self.indexes.push(Index {
            name: format!("{table}_{column}_idx"),
            table,
            kind: "CUSTOM",
            options: stored,
        });
    }

    fn alter_table(&mut self, rest: &str) {
        let (table, rest) = rest.split_once(' ').unwrap_or_else(|| panic!("bad alter: {rest}"));
        let columns = self
            .tables
            .get_mut(&unquote(table))
            .unwrap_or_else(|| panic!("alter on missing table {table}"));
        if let Some(rest) = rest.strip_prefix("ADD ") {
            let (column, rest) = rest.split_once(' ').unwrap_or_else(|| panic!("bad add: {rest}"));
            let (cql_type, kind) = match rest.strip_suffix(" STATIC") {
                Some(cql_type) => (cql_type, "static"),
                None => (rest, "regular"),
            };
            columns.push(Column {
                name: unquote(column),
                cql_type: catalog_type(cql_type),
                kind,
                position: -1,
                order: ClusteringOrder::Asc,
            });
        } else if let Some(rest) = rest.strip_prefix("ALTER ") {
            let (column, cql_type) = rest.split_once(" TYPE ").unwrap_or_else(|| panic!("bad alter: {rest}"));
            let column = unquote(column);
            if let Some(existing) = columns.iter_mut().find(|c| c.name == column) {
                existing.cql_type = catalog_type(cql_type);
            }
        } else if let Some(rest) = rest.strip_prefix("DROP ") {
            let column = unquote(rest);
            columns.retain(|c| c.name != column);
        }
    }

    fn answer(&self, query: &str, params: &[BindValue]) -> RowSet {
        let text = |i: usize| {
            params
                .get(i)
                .and_then(BindValue::as_value)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        match query {
            COLUMNS_QUERY => {
                let table = text(0);
                let rows = self
                    .tables
                    .get(&table)
                    .map(|columns| columns.iter().map(|c| column_row(&table, c)).collect())
                    .unwrap_or_default();
                RowSet::new(rows)
            }
            INDEXES_QUERY => {
                let table = text(0);
                let rows = self
                    .indexes
                    .iter()
                    .filter(|index| index.table == table)
                    .map(|index| {
                        let row = json!({
                            "table_name": index.table,
                            "index_name": index.name,
                            "kind": index.kind,
                            "options": index.options,
                        });
                        row.as_object().cloned().unwrap_or_default()
                    })
                    .collect();
                RowSet::new(rows)
            }
            VIEWS_QUERY => RowSet::new(
                self.views
                    .iter()
                    .map(|(name, (base, _))| {
                        let row = json!({"view_name": name, "base_table_name": base});
                        row.as_object().cloned().unwrap_or_default()
                    })
                    .collect(),
            ),
            VIEW_COLUMNS_QUERY => {
                let names: Vec<String> = params
                    .get(1)
                    .and_then(BindValue::as_value)
                    .and_then(Value::as_array)
                    .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                let rows = self
                    .views
                    .iter()
                    .filter(|(name, _)| names.contains(name))
                    .flat_map(|(name, (_, columns))| columns.iter().map(move |c| column_row(name, c)))
                    .collect();
                RowSet::new(rows)
            }
            _ => RowSet::empty(),
        }
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Statements other than catalog reads.
    pub fn ddl(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| !s.contains("system_schema"))
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.state.lock().unwrap().indexes.iter().map(|i| i.name.clone()).collect()
    }

    pub fn view_names(&self) -> Vec<String> {
        self.state.lock().unwrap().views.keys().cloned().collect()
    }

    pub fn column_type(&self, table: &str, column: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)?
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.cql_type.clone())
    }
}

#[async_trait]
impl StatementExecutor for FakeCluster {
    async fn execute(
        &self,
        query: &str,
        params: &[BindValue],
        _options: &QueryOptions,
    ) -> std::result::Result<RowSet, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(query.to_string());
        if query.starts_with("SELECT") {
            return Ok(state.answer(query, params));
        }
        state.apply(query);
        Ok(RowSet::empty())
    }
}

// ============================================================================
// Recording prompt
// ============================================================================

/// Accepts or refuses every question and records what was asked.
#[derive(Debug, Default)]
pub struct RecordingPrompt {
    accept: bool,
    asked: Mutex<Vec<ConfirmationRequest>>,
}

impl RecordingPrompt {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        Self {
            accept: false,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn kinds(&self) -> Vec<ChangeKind> {
        self.asked.lock().unwrap().iter().map(|r| r.kind).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.asked.lock().unwrap().iter().map(|r| r.message.clone()).collect()
    }
}

#[async_trait]
impl ConfirmationPrompt for RecordingPrompt {
    async fn ask(&self, request: &ConfirmationRequest) -> oxide_cql_migrate::error::Result<String> {
        self.asked.lock().unwrap().push(request.clone());
        Ok(if self.accept { "Y" } else { "n" }.to_string())
    }
}

// ============================================================================
// Schemas
// ============================================================================

pub fn alter_config() -> MigrationConfig {
    MigrationConfig::new("app").migration(MigrationMode::Alter)
}

/// Creates `table` from `schema` and clears the statement log.
pub async fn seed(cluster: &FakeCluster, table: &str, schema: &SchemaDescription) {
    let config = alter_config();
    SchemaSynchronizer::new(cluster, &AutoConfirm, &config)
        .sync(table, schema)
        .await
        .unwrap_or_else(|e| panic!("seeding {table} failed: {e}"));
    cluster.clear_log();
}

pub fn users() -> SchemaDescription {
    SchemaDescription::new()
        .field(FieldSpec::new("id", "uuid"))
        .field(FieldSpec::new("name", "text"))
        .field(FieldSpec::new("age", "int"))
        .field(FieldSpec::new("tags", "set").type_def("<text>"))
        .key(KeySpec::new(["id"]))
}

pub fn posts() -> SchemaDescription {
    SchemaDescription::new()
        .field(FieldSpec::new("author", "uuid"))
        .field(FieldSpec::new("posted", "timestamp"))
        .field(FieldSpec::new("title", "text"))
        .field(FieldSpec::new("category", "text"))
        .field(FieldSpec::new("attrs", "map").type_def("<text,text>"))
        .field(FieldSpec::new("blog", "text").static_column())
        .key(KeySpec::new(["author"]).clustering("posted"))
        .order("posted", ClusteringOrder::Desc)
        .index("category")
        .index("keys(attrs)")
        .custom_index(
            CustomIndex::new("title", "org.apache.cassandra.index.sasi.SASIIndex")
                .option("mode", "CONTAINS"),
        )
        .materialized_view(
            "posts_by_category",
            MaterializedViewSpec::new(
                ["category", "title"],
                KeySpec::new(["category"]).clustering("author").clustering("posted"),
            )
            .order("posted", ClusteringOrder::Desc),
        )
}
