//! Data statements: `SELECT`, `INSERT`, `UPDATE`, `DELETE`.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ddl::quote_identifier;
use crate::error::{CqlError, Result};
use crate::query::{if_clause, where_clause};
use crate::schema::SchemaDescription;
use crate::types::resolve_field_type;
use crate::validation::{first_failure, validators_for};
use crate::value::{
    build_value_expression, collection_assignment, is_unset, plain_assignment, BindValue, CollectionOp,
};

/// A statement with its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    /// CQL text with `?` placeholders.
    pub query: String,
    /// Parameters in placeholder order.
    pub params: Vec<BindValue>,
}

impl Statement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: Vec<BindValue>) -> Self {
        self.params = params;
        self
    }
}

/// Options of a `SELECT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Projection; empty selects `*`.
    pub select: Vec<String>,
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// Read from this materialized view instead of the table.
    pub materialized_view: Option<String>,
    /// Append `ALLOW FILTERING`.
    pub allow_filtering: bool,
}

impl FindOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the projection.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Selects distinct rows.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Reads from a materialized view.
    #[must_use]
    pub fn materialized_view(mut self, view: impl Into<String>) -> Self {
        self.materialized_view = Some(view.into());
        self
    }

    /// Allows filtering.
    #[must_use]
    pub const fn allow_filtering(mut self) -> Self {
        self.allow_filtering = true;
        self
    }
}

/// Options of an `UPDATE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// `USING TTL`.
    pub ttl: Option<u32>,
    /// `IF <conditions>` query object.
    pub conditions: Option<Map<String, Value>>,
    /// `IF EXISTS` (ignored when conditions are given).
    pub if_exists: bool,
}

/// Options of an `INSERT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// `IF NOT EXISTS`.
    pub if_not_exists: bool,
    /// `USING TTL`.
    pub ttl: Option<u32>,
}

fn select_expression(item: &str) -> String {
    let column = |name: &str| if name == "*" { name.to_string() } else { quote_identifier(name) };
    let tokens: Vec<&str> = item
        .split(['(', ')', ' '])
        .filter(|token| !token.is_empty())
        .collect();
    match tokens.as_slice() {
        [name] => column(name),
        [function, name] => format!("{function}({})", column(name)),
        [function, name, keyword, alias] => format!("{function}({}) {keyword} {alias}", column(name)),
        [name, keyword, alias] => format!("{} {keyword} {alias}", column(name)),
        _ => "*".to_string(),
    }
}

fn order_by_clause(order: &Value) -> Result<String> {
    let object = order
        .as_object()
        .ok_or_else(|| CqlError::InvalidOrder("$orderby must be an object".to_string()))?;

    let mut parts = Vec::new();
    for (direction, columns) in object {
        let direction = match direction.to_lowercase().as_str() {
            "$asc" => "ASC",
            "$desc" => "DESC",
            _ => return Err(CqlError::InvalidOrderType(direction.clone())),
        };
        let columns: Vec<&str> = match columns {
            Value::String(column) => vec![column.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| CqlError::InvalidOrder("order columns must be strings".to_string()))
                })
                .collect::<Result<_>>()?,
            _ => {
                return Err(CqlError::InvalidOrder(
                    "order value must be a column name or an array of names".to_string(),
                ));
            }
        };
        for column in columns {
            parts.push(format!("{} {direction}", quote_identifier(column)));
        }
    }
    Ok(parts.join(","))
}

/// Builds a `SELECT` from a query object.
///
/// `$orderby` (`{"$asc" | "$desc": column | [columns]}`) and `$limit` are
/// read from the query object; every other key filters.
///
/// # Errors
///
/// Returns translation errors from the query object and
/// [`CqlError::InvalidOrder`], [`CqlError::InvalidOrderType`] or
/// [`CqlError::InvalidLimit`] for malformed directives.
pub fn find_statement(
    schema: &SchemaDescription,
    table: &str,
    query: &Map<String, Value>,
    options: &FindOptions,
) -> Result<Statement> {
    let mut order_by = String::new();
    let mut limit = None;
    for (key, value) in query {
        match key.to_lowercase().as_str() {
            "$orderby" => order_by = order_by_clause(value)?,
            "$limit" => limit = parse_limit(value)?,
            _ => {}
        }
    }

    let filter = where_clause(schema, query)?;
    let projection = if options.select.is_empty() {
        "*".to_string()
    } else {
        options
            .select
            .iter()
            .map(|item| select_expression(item))
            .collect::<Vec<_>>()
            .join(",")
    };
    let source = options.materialized_view.as_deref().unwrap_or(table);

    let mut cql = String::from("SELECT ");
    if options.distinct {
        cql.push_str("DISTINCT ");
    }
    cql.push_str(&projection);
    cql.push_str(" FROM ");
    cql.push_str(&quote_identifier(source));
    if !filter.is_empty() {
        cql.push(' ');
        cql.push_str(&filter.text);
    }
    if !order_by.is_empty() {
        cql.push_str(" ORDER BY ");
        cql.push_str(&order_by);
    }
    if let Some(limit) = limit {
        let _ = write!(cql, " LIMIT {limit}");
    }
    if options.allow_filtering {
        cql.push_str(" ALLOW FILTERING");
    }
    cql.push(';');

    Ok(Statement {
        query: cql,
        params: filter.params,
    })
}

/// Reads a `$limit` value. Any whole non-negative number is accepted; zero
/// means no limit.
fn parse_limit(value: &Value) -> Result<Option<u64>> {
    let limit = match value.as_u64() {
        Some(limit) => limit,
        None => {
            let number = value.as_f64().ok_or(CqlError::InvalidLimit)?;
            if !number.is_finite() || number < 0.0 || number.fract() != 0.0 || number > u64::MAX as f64 {
                return Err(CqlError::InvalidLimit);
            }
            number as u64
        }
    };
    Ok((limit > 0).then_some(limit))
}

fn check_presence(schema: &SchemaDescription, field: &str) -> Result<()> {
    if schema.key.contains(field) {
        return Err(CqlError::UnsetKey(field.to_string()));
    }
    if schema.get_field(field).is_some_and(|f| f.is_required()) {
        return Err(CqlError::UnsetRequired(field.to_string()));
    }
    Ok(())
}

/// Builds an `UPDATE` from a query object and new values.
///
/// Keys that are not declared, or are virtual, are ignored. Collection
/// fields accept `$add`, `$append`, `$prepend`, `$replace` and `$remove`
/// envelopes.
///
/// # Errors
///
/// Returns [`CqlError::UnsetKey`] or [`CqlError::UnsetRequired`] when a key
/// or required column is nulled, [`CqlError::UnsupportedOperation`] for
/// unsupported mutations or an empty assignment list, and validation or
/// translation errors.
pub fn update_statement(
    schema: &SchemaDescription,
    table: &str,
    query: &Map<String, Value>,
    updates: &Map<String, Value>,
    options: &UpdateOptions,
) -> Result<Statement> {
    let mut assignments = Vec::new();
    let mut params = Vec::new();

    for (key, value) in updates {
        let Some(field) = schema.get_field(key) else {
            continue;
        };
        if field.is_virtual {
            continue;
        }
        if value.is_null() || is_unset(value) {
            check_presence(schema, key)?;
        }

        let (field_type, _) = resolve_field_type(schema, key)?;
        let assignment = match CollectionOp::from_envelope(value) {
            Some((op, operand)) => {
                collection_assignment(key, &field_type, op, build_value_expression(schema, key, operand)?)?
            }
            None => plain_assignment(key, build_value_expression(schema, key, value)?),
        };
        assignments.push(assignment.clause);
        params.extend(assignment.params);
    }

    if assignments.is_empty() {
        return Err(CqlError::UnsupportedOperation(
            "update has no assignable fields".to_string(),
        ));
    }

    let mut cql = format!("UPDATE {}", quote_identifier(table));
    if let Some(ttl) = options.ttl {
        let _ = write!(cql, " USING TTL {ttl}");
    }
    cql.push_str(" SET ");
    cql.push_str(&assignments.join(", "));

    let filter = where_clause(schema, query)?;
    if !filter.is_empty() {
        cql.push(' ');
        cql.push_str(&filter.text);
        params.extend(filter.params);
    }

    match &options.conditions {
        Some(conditions) => {
            let condition = if_clause(schema, conditions)?;
            if !condition.is_empty() {
                cql.push(' ');
                cql.push_str(&condition.text);
                params.extend(condition.params);
            }
        }
        None if options.if_exists => cql.push_str(" IF EXISTS"),
        None => {}
    }
    cql.push(';');

    Ok(Statement { query: cql, params })
}

/// Builds a `DELETE` from a query object.
///
/// # Errors
///
/// Returns translation errors from the query object.
pub fn delete_statement(schema: &SchemaDescription, table: &str, query: &Map<String, Value>) -> Result<Statement> {
    let filter = where_clause(schema, query)?;
    let mut cql = format!("DELETE FROM {}", quote_identifier(table));
    if !filter.is_empty() {
        cql.push(' ');
        cql.push_str(&filter.text);
    }
    cql.push(';');
    Ok(Statement {
        query: cql,
        params: filter.params,
    })
}

/// Builds an `INSERT` for a record's values.
///
/// Absent fields take their default; defaults are validated unless the rule
/// sets `ignore_default`. Absent fields without a default are skipped unless
/// they are key or required columns.
///
/// # Errors
///
/// Returns [`CqlError::UnsetKey`], [`CqlError::UnsetRequired`],
/// [`CqlError::InvalidDefaultValue`] and validation errors.
pub fn insert_statement(
    schema: &SchemaDescription,
    table: &str,
    values: &Map<String, Value>,
    options: InsertOptions,
) -> Result<Statement> {
    let mut columns = Vec::new();
    let mut segments = Vec::new();
    let mut params = Vec::new();

    for field in schema.persisted_fields() {
        let name = field.name.as_str();
        let value = match values.get(name) {
            Some(value) => value.clone(),
            None => match &field.default {
                Some(default) => {
                    let ignore_default = field.rule.as_ref().is_some_and(|rule| rule.ignore_default);
                    if !ignore_default {
                        let validators = validators_for(schema, name)?;
                        if first_failure(&validators, default).is_some() {
                            let (field_type, _) = resolve_field_type(schema, name)?;
                            return Err(CqlError::InvalidDefaultValue {
                                value: default.to_string(),
                                field: name.to_string(),
                                field_type,
                            });
                        }
                    }
                    default.clone()
                }
                None => {
                    check_presence(schema, name)?;
                    continue;
                }
            },
        };

        if value.is_null() || is_unset(&value) {
            check_presence(schema, name)?;
        }

        let (segment, param) = build_value_expression(schema, name, &value)?.into_parts();
        columns.push(quote_identifier(name));
        segments.push(segment);
        params.extend(param);
    }

    let mut cql = format!(
        "INSERT INTO {} ( {} ) VALUES ( {} )",
        quote_identifier(table),
        columns.join(" , "),
        segments.join(" , ")
    );
    if options.if_not_exists {
        cql.push_str(" IF NOT EXISTS");
    }
    if let Some(ttl) = options.ttl {
        let _ = write!(cql, " USING TTL {ttl}");
    }
    cql.push(';');

    Ok(Statement { query: cql, params })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{FieldSpec, KeySpec};
    use crate::validation::FieldRule;
    use crate::value::db_function;

    fn schema() -> SchemaDescription {
        SchemaDescription::new()
            .field(FieldSpec::new("id", "uuid"))
            .field(FieldSpec::new("created", "timestamp"))
            .field(FieldSpec::new("name", "text").rule(FieldRule::new().required()))
            .field(FieldSpec::new("age", "int").default_value(json!(0)))
            .field(FieldSpec::new("tags", "set").type_def("<text>"))
            .field(FieldSpec::new("views", "counter"))
            .field(FieldSpec::new("label", "text").virtual_field())
            .key(KeySpec::new(["id"]).clustering("created"))
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    const ID: &str = "0b6d9a2e-5f0c-4c1d-9d8e-3f1c2b4a5d6e";

    #[test]
    fn test_find_statement() {
        let statement = find_statement(
            &schema(),
            "events",
            &map(json!({"id": ID, "$orderby": {"$desc": "created"}, "$limit": 10})),
            &FindOptions::new().select(["name", "count(age) as total", "age as years"]),
        )
        .unwrap();
        assert_eq!(
            statement.query,
            "SELECT \"name\",count(\"age\") as total,\"age\" as years FROM \"events\" WHERE \"id\" = ? \
             ORDER BY \"created\" DESC LIMIT 10;"
        );
        assert_eq!(statement.params, vec![BindValue::Value(json!(ID))]);
    }

    #[test]
    fn test_find_options() {
        let statement = find_statement(
            &schema(),
            "events",
            &map(json!({"name": "bob"})),
            &FindOptions::new().distinct().materialized_view("events_by_name").allow_filtering(),
        )
        .unwrap();
        assert_eq!(
            statement.query,
            "SELECT DISTINCT * FROM \"events_by_name\" WHERE \"name\" = ? ALLOW FILTERING;"
        );
    }

    #[test]
    fn test_find_directive_errors() {
        let schema = schema();
        let options = FindOptions::new();
        assert!(matches!(
            find_statement(&schema, "t", &map(json!({"$orderby": "created"})), &options),
            Err(CqlError::InvalidOrder(_))
        ));
        assert!(matches!(
            find_statement(&schema, "t", &map(json!({"$orderby": {"$up": "created"}})), &options),
            Err(CqlError::InvalidOrderType(_))
        ));
        assert_eq!(
            find_statement(&schema, "t", &map(json!({"$limit": "ten"})), &options),
            Err(CqlError::InvalidLimit)
        );
        assert_eq!(
            find_statement(&schema, "t", &map(json!({"$limit": 2.5})), &options),
            Err(CqlError::InvalidLimit)
        );
        assert_eq!(
            find_statement(&schema, "t", &map(json!({"$limit": -3})), &options),
            Err(CqlError::InvalidLimit)
        );
    }

    #[test]
    fn test_find_zero_limit_is_omitted() {
        let statement = find_statement(&schema(), "t", &map(json!({"$limit": 0})), &FindOptions::new()).unwrap();
        assert_eq!(statement.query, "SELECT * FROM \"t\";");
    }

    #[test]
    fn test_find_whole_float_limit() {
        let statement = find_statement(&schema(), "t", &map(json!({"$limit": 10.0})), &FindOptions::new()).unwrap();
        assert_eq!(statement.query, "SELECT * FROM \"t\" LIMIT 10;");
    }

    #[test]
    fn test_update_with_collection_envelope() {
        let statement = update_statement(
            &schema(),
            "events",
            &map(json!({"id": ID})),
            &map(json!({"tags": {"$add": ["x"]}})),
            &UpdateOptions::default(),
        )
        .unwrap();
        assert_eq!(statement.query, "UPDATE \"events\" SET \"tags\" = \"tags\" + ? WHERE \"id\" = ?;");
        assert_eq!(
            statement.params,
            vec![BindValue::Value(json!(["x"])), BindValue::Value(json!(ID))]
        );
    }

    #[test]
    fn test_update_counter_ttl_and_conditions() {
        let statement = update_statement(
            &schema(),
            "events",
            &map(json!({"id": ID})),
            &map(json!({"views": -2, "label": "ignored", "unknown": 1})),
            &UpdateOptions {
                ttl: Some(60),
                conditions: Some(map(json!({"age": {"$gt": 3}}))),
                if_exists: true,
            },
        )
        .unwrap();
        assert_eq!(
            statement.query,
            "UPDATE \"events\" USING TTL 60 SET \"views\" = \"views\" - ? WHERE \"id\" = ? IF \"age\" > ?;"
        );
        assert_eq!(statement.params.len(), 3);

        let exists = update_statement(
            &schema(),
            "events",
            &map(json!({"id": ID})),
            &map(json!({"age": 4})),
            &UpdateOptions {
                if_exists: true,
                ..UpdateOptions::default()
            },
        )
        .unwrap();
        assert!(exists.query.ends_with(" IF EXISTS;"));
    }

    #[test]
    fn test_update_presence_errors() {
        let schema = schema();
        let query = map(json!({"id": ID}));
        let options = UpdateOptions::default();
        assert_eq!(
            update_statement(&schema, "t", &query, &map(json!({"created": null})), &options),
            Err(CqlError::UnsetKey("created".to_string()))
        );
        assert_eq!(
            update_statement(&schema, "t", &query, &map(json!({"name": {"$unset": true}})), &options),
            Err(CqlError::UnsetRequired("name".to_string()))
        );
        assert!(matches!(
            update_statement(&schema, "t", &query, &map(json!({"label": "x"})), &options),
            Err(CqlError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_delete_statement() {
        let statement = delete_statement(&schema(), "events", &map(json!({"id": ID}))).unwrap();
        assert_eq!(statement.query, "DELETE FROM \"events\" WHERE \"id\" = ?;");
    }

    #[test]
    fn test_insert_statement() {
        let statement = insert_statement(
            &schema(),
            "events",
            &map(json!({"id": ID, "created": db_function("toTimestamp(now())"), "name": "bob"})),
            InsertOptions {
                if_not_exists: true,
                ttl: Some(30),
            },
        )
        .unwrap();
        assert_eq!(
            statement.query,
            "INSERT INTO \"events\" ( \"id\" , \"created\" , \"name\" , \"age\" ) \
             VALUES ( ? , toTimestamp(now()) , ? , ? ) IF NOT EXISTS USING TTL 30;"
        );
        assert_eq!(
            statement.params,
            vec![
                BindValue::Value(json!(ID)),
                BindValue::Value(json!("bob")),
                BindValue::Value(json!(0))
            ]
        );
    }

    #[test]
    fn test_insert_presence_and_defaults() {
        let schema = schema();
        let options = InsertOptions::default();
        assert_eq!(
            insert_statement(&schema, "t", &map(json!({"id": ID, "name": "x"})), options),
            Err(CqlError::UnsetKey("created".to_string()))
        );
        assert_eq!(
            insert_statement(&schema, "t", &map(json!({"id": ID, "created": 1})), options),
            Err(CqlError::UnsetRequired("name".to_string()))
        );

        let bad_default = schema.clone().field(FieldSpec::new("score", "int").default_value(json!("high")));
        assert!(matches!(
            insert_statement(&bad_default, "t", &map(json!({"id": ID, "created": 1, "name": "x"})), options),
            Err(CqlError::InvalidDefaultValue { .. })
        ));
    }
}
