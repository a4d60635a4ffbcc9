//! Query-object translation.
//!
//! A query object is a JSON object whose keys are field names (or `$`-prefixed
//! directives) and whose values are either plain values (implicit equality)
//! or operator objects:
//!
//! ```json
//! {"age": {"$gte": 18}, "name": {"$in": ["a", "b"]}}
//! ```
//!
//! Key order is significant: it becomes the order of the `AND` chain and of
//! the bound parameters.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{CqlError, Result};
use crate::schema::SchemaDescription;
use crate::types::{resolve_field_type, CollectionKind};
use crate::value::{as_db_function, build_value_expression, is_unset, BindValue};

/// A relational operator of the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `$eq`
    Eq,
    /// `$ne`
    Ne,
    /// `$gt`
    Gt,
    /// `$lt`
    Lt,
    /// `$gte`
    Gte,
    /// `$lte`
    Lte,
    /// `$in`
    In,
    /// `$like`
    Like,
    /// `$token`
    Token,
    /// `$contains`
    Contains,
    /// `$contains_key`
    ContainsKey,
}

impl Operator {
    /// Parses an operator key, ignoring letter case.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let op = match key.to_lowercase().as_str() {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$lt" => Self::Lt,
            "$gte" => Self::Gte,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$like" => Self::Like,
            "$token" => Self::Token,
            "$contains" => Self::Contains,
            "$contains_key" => Self::ContainsKey,
            _ => return None,
        };
        Some(op)
    }

    /// Returns the CQL operator.
    #[must_use]
    pub const fn as_cql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::In => "IN",
            Self::Like => "LIKE",
            Self::Token => "TOKEN",
            Self::Contains => "CONTAINS",
            Self::ContainsKey => "CONTAINS KEY",
        }
    }

    const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Gt | Self::Lt | Self::Gte | Self::Lte
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cql())
    }
}

/// The relations and parameters produced from a query object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Relations in query-object order.
    pub relations: Vec<String>,
    /// Bound parameters in placeholder order.
    pub params: Vec<BindValue>,
}

impl ParsedQuery {
    fn push(&mut self, relation: String, param: Option<BindValue>) {
        self.relations.push(relation);
        self.params.extend(param);
    }
}

/// A rendered `WHERE` or `IF` clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clause {
    /// The clause text, empty when there are no relations.
    pub text: String,
    /// Bound parameters.
    pub params: Vec<BindValue>,
}

impl Clause {
    fn from_parsed(keyword: &str, parsed: ParsedQuery) -> Self {
        let text = if parsed.relations.is_empty() {
            String::new()
        } else {
            format!("{keyword} {}", parsed.relations.join(" AND "))
        };
        Self {
            text,
            params: parsed.params,
        }
    }

    /// Returns true if the clause has no relations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Translates a query object into relations and bound parameters.
///
/// `$orderby` and `$limit` are ignored here; the find builder reads them.
///
/// # Errors
///
/// Returns the translator errors of [`CqlError`] for malformed operators and
/// operands, and validation errors from the value expression builder.
pub fn parse_query_object(schema: &SchemaDescription, query: &Map<String, Value>) -> Result<ParsedQuery> {
    let mut parsed = ParsedQuery::default();

    for (key, value) in query {
        if key.starts_with('$') {
            match key.as_str() {
                "$expr" => parsed.relations.push(expr_relation(value)?),
                "$solr_query" => {
                    let text = value.as_str().ok_or(CqlError::InvalidSolrQuery)?;
                    parsed.relations.push(format!("solr_query={}", quote_literal(text)));
                }
                _ => {}
            }
            continue;
        }

        for (op, operand) in operator_clauses(value)? {
            match op {
                Operator::Token => token_relations(schema, key, operand, &mut parsed)?,
                Operator::Contains => contains_relation(schema, key, operand, &mut parsed)?,
                Operator::ContainsKey => {
                    let (field_type, _) = resolve_field_type(schema, key)?;
                    if CollectionKind::from_type(&field_type) != Some(CollectionKind::Map) {
                        return Err(CqlError::InvalidContainsKey(key.clone()));
                    }
                    parsed.push(
                        format!("\"{key}\" CONTAINS KEY ?"),
                        Some(BindValue::Value(operand.clone())),
                    );
                }
                Operator::In if !operand.is_array() => {
                    return Err(CqlError::InvalidInOperand(key.clone()));
                }
                _ => {
                    let (segment, param) = build_value_expression(schema, key, operand)?.into_parts();
                    parsed.push(format!("\"{key}\" {op} {segment}"), param);
                }
            }
        }
    }

    Ok(parsed)
}

/// Builds the `WHERE` clause of a query object.
///
/// # Errors
///
/// See [`parse_query_object`].
pub fn where_clause(schema: &SchemaDescription, query: &Map<String, Value>) -> Result<Clause> {
    Ok(Clause::from_parsed("WHERE", parse_query_object(schema, query)?))
}

/// Builds the `IF` clause of a conditional update or delete.
///
/// # Errors
///
/// See [`parse_query_object`].
pub fn if_clause(schema: &SchemaDescription, query: &Map<String, Value>) -> Result<Clause> {
    Ok(Clause::from_parsed("IF", parse_query_object(schema, query)?))
}

fn is_operator_object(value: &Value) -> bool {
    match value {
        Value::Object(object) => {
            !object.is_empty()
                && object.keys().all(|k| k.starts_with('$'))
                && as_db_function(value).is_none()
                && !is_unset(value)
        }
        _ => false,
    }
}

fn operator_clauses(value: &Value) -> Result<Vec<(Operator, &Value)>> {
    let objects: Vec<&Map<String, Value>> = match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(is_operator_object) => {
            items.iter().filter_map(Value::as_object).collect()
        }
        Value::Object(object) if is_operator_object(value) => vec![object],
        other => return Ok(vec![(Operator::Eq, other)]),
    };

    let mut clauses = Vec::new();
    for object in objects {
        for (key, operand) in object {
            let op = Operator::parse(key).ok_or_else(|| CqlError::InvalidOperator(key.clone()))?;
            clauses.push((op, operand));
        }
    }
    Ok(clauses)
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn expr_relation(value: &Value) -> Result<String> {
    let index = value.get("index").and_then(Value::as_str);
    let query = value.get("query").and_then(Value::as_str);
    match (index, query) {
        (Some(index), Some(query)) => Ok(format!("expr({index},{})", quote_literal(query))),
        _ => Err(CqlError::InvalidExpr),
    }
}

fn token_relations(
    schema: &SchemaDescription,
    key: &str,
    operand: &Value,
    parsed: &mut ParsedQuery,
) -> Result<()> {
    let Value::Object(comparisons) = operand else {
        return Err(CqlError::InvalidToken(format!(
            "$token of '{key}' requires an object operand"
        )));
    };

    let columns: Vec<&str> = key.split(',').map(str::trim).collect();
    let quoted_columns = columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(",");

    for (op_key, token_value) in comparisons {
        let op = Operator::parse(op_key)
            .filter(|op| op.is_comparison())
            .ok_or_else(|| CqlError::InvalidTokenOperator(op_key.clone()))?;

        let values: Vec<&Value> = match token_value {
            Value::Array(values) => values.iter().collect(),
            single => vec![single],
        };
        if values.len() != columns.len() {
            return Err(CqlError::InvalidToken(format!(
                "$token of '{key}' expects {} values, got {}",
                columns.len(),
                values.len()
            )));
        }

        let mut segments = Vec::with_capacity(values.len());
        for (column, value) in columns.iter().zip(values) {
            let (segment, param) = build_value_expression(schema, column, value)?.into_parts();
            segments.push(segment);
            parsed.params.extend(param);
        }
        parsed.relations.push(format!(
            "token({quoted_columns}) {op} token({})",
            segments.join(",")
        ));
    }
    Ok(())
}

fn contains_relation(
    schema: &SchemaDescription,
    key: &str,
    operand: &Value,
    parsed: &mut ParsedQuery,
) -> Result<()> {
    let (field_type, _) = resolve_field_type(schema, key)?;
    let kind = CollectionKind::from_type(&field_type).ok_or_else(|| CqlError::InvalidContains(key.to_string()))?;

    if kind == CollectionKind::Map {
        if let Some((entry_key, entry_value)) = operand
            .as_object()
            .filter(|entry| entry.len() == 1)
            .and_then(|entry| entry.iter().next())
        {
            parsed.relations.push(format!("\"{key}\"[?] = ?"));
            parsed.params.push(BindValue::Value(Value::String(entry_key.clone())));
            parsed.params.push(BindValue::Value(entry_value.clone()));
            return Ok(());
        }
    }

    parsed.push(
        format!("\"{key}\" CONTAINS ?"),
        Some(BindValue::Value(operand.clone())),
    );
    Ok(())
}
