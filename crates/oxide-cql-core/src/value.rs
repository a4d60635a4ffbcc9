//! Value expressions.
//!
//! Turns a field value into the statement fragment that stands for it and the
//! parameter bound to that fragment. Values are JSON; two object shapes act
//! as markers:
//!
//! - `{"$db_function": "now()"}` inlines a raw database expression,
//! - `{"$unset": true}` binds the driver's "leave unset" marker.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{CqlError, Result};
use crate::schema::SchemaDescription;
use crate::types::{binds_array_as_value, generic_validation_message, resolve_field_type, CollectionKind};
use crate::validation::{first_failure, validators_for};

/// Key of the raw database-function marker.
pub const DB_FUNCTION_KEY: &str = "$db_function";

/// Key of the unset marker.
pub const UNSET_KEY: &str = "$unset";

/// Wraps a raw database expression, e.g. `db_function("toTimestamp(now())")`.
#[must_use]
pub fn db_function(expression: impl Into<String>) -> Value {
    let expression: String = expression.into();
    json!({ DB_FUNCTION_KEY: expression })
}

/// The unset marker value.
#[must_use]
pub fn unset() -> Value {
    json!({ UNSET_KEY: true })
}

/// Returns the expression of a database-function marker.
#[must_use]
pub fn as_db_function(value: &Value) -> Option<&str> {
    value
        .as_object()
        .filter(|object| object.len() == 1)
        .and_then(|object| object.get(DB_FUNCTION_KEY))
        .and_then(Value::as_str)
}

/// Returns true for the unset marker.
#[must_use]
pub fn is_unset(value: &Value) -> bool {
    value
        .as_object()
        .filter(|object| object.len() == 1)
        .and_then(|object| object.get(UNSET_KEY))
        .is_some_and(|flag| flag == &Value::Bool(true))
}

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BindValue {
    /// A concrete value.
    Value(Value),
    /// Leave the column untouched.
    Unset,
}

impl BindValue {
    /// Returns the concrete value, if any.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Unset => None,
        }
    }
}

impl From<Value> for BindValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// The fragment standing for a value in a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpression {
    /// A fragment containing `?` placeholders plus the bound parameter.
    Bound {
        /// Statement fragment, usually `?`.
        segment: String,
        /// The parameter bound to the placeholder.
        param: BindValue,
    },
    /// A raw expression inlined verbatim.
    Raw(String),
}

impl ValueExpression {
    fn placeholder(param: BindValue) -> Self {
        Self::Bound {
            segment: "?".to_string(),
            param,
        }
    }

    /// Returns the statement fragment.
    #[must_use]
    pub fn segment(&self) -> &str {
        match self {
            Self::Bound { segment, .. } => segment,
            Self::Raw(expression) => expression,
        }
    }

    /// Splits into the fragment and the optional parameter.
    #[must_use]
    pub fn into_parts(self) -> (String, Option<BindValue>) {
        match self {
            Self::Bound { segment, param } => (segment, Some(param)),
            Self::Raw(expression) => (expression, None),
        }
    }
}

/// Builds the expression for assigning or comparing `value` against `field`.
///
/// Arrays given for non-array types are composite values (the right-hand
/// side of `IN` or a multi-column relation); each element is built on its own
/// and the bound values are collected into one array parameter.
///
/// # Errors
///
/// Returns [`CqlError::UnknownField`] if the field is not declared and
/// [`CqlError::InvalidValue`] if a validator rejects the value.
pub fn build_value_expression(
    schema: &SchemaDescription,
    field: &str,
    value: &Value,
) -> Result<ValueExpression> {
    if value.is_null() {
        return Ok(ValueExpression::placeholder(BindValue::Value(Value::Null)));
    }
    if is_unset(value) {
        return Ok(ValueExpression::placeholder(BindValue::Unset));
    }
    if let Some(expression) = as_db_function(value) {
        return Ok(ValueExpression::Raw(expression.to_string()));
    }

    let (field_type, _) = resolve_field_type(schema, field)?;

    if let Value::Array(items) = value {
        if !binds_array_as_value(&field_type) {
            let mut bound = Vec::with_capacity(items.len());
            for item in items {
                match build_value_expression(schema, field, item)? {
                    ValueExpression::Bound {
                        param: BindValue::Value(v),
                        ..
                    } => bound.push(v),
                    _ => {
                        return Err(CqlError::InvalidValue(format!(
                            "Invalid Value: composite value for Field: {field} may not contain unset or raw expressions"
                        )));
                    }
                }
            }
            return Ok(ValueExpression::placeholder(BindValue::Value(Value::Array(bound))));
        }
    }

    let validators = validators_for(schema, field)?;
    if let Some(failed) = first_failure(&validators, value) {
        return Err(CqlError::InvalidValue(failed.message_for(value, field, &field_type)));
    }

    if field_type == "counter" {
        let (increment, magnitude) = counter_delta(value).ok_or_else(|| {
            CqlError::InvalidValue(generic_validation_message(value, field, &field_type))
        })?;
        let operator = if increment { "+" } else { "-" };
        return Ok(ValueExpression::Bound {
            segment: format!("\"{field}\" {operator} ?"),
            param: BindValue::Value(magnitude),
        });
    }

    Ok(ValueExpression::placeholder(BindValue::Value(value.clone())))
}

fn counter_delta(value: &Value) -> Option<(bool, Value)> {
    if let Some(n) = value.as_i64() {
        return Some((n >= 0, json!(n.unsigned_abs())));
    }
    if let Some(n) = value.as_u64() {
        return Some((true, json!(n)));
    }
    let n: i128 = value.as_str()?.trim().parse().ok()?;
    Some((n >= 0, Value::String(n.unsigned_abs().to_string())))
}

/// A collection mutation requested through an update envelope such as
/// `{"$add": [...]}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOp {
    /// `"c" = "c" + ?`
    Add,
    /// `"c" = "c" + ?`
    Append,
    /// `"c" = ? + "c"` (lists only)
    Prepend,
    /// `"c"[?] = ?` (lists and maps)
    Replace,
    /// `"c" = "c" - ?`
    Remove,
}

impl CollectionOp {
    const ALL: [Self; 5] = [Self::Add, Self::Append, Self::Prepend, Self::Replace, Self::Remove];

    /// Returns the envelope key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Add => "$add",
            Self::Append => "$append",
            Self::Prepend => "$prepend",
            Self::Replace => "$replace",
            Self::Remove => "$remove",
        }
    }

    /// Finds the mutation requested by an update value, returning the
    /// operation and its operand.
    #[must_use]
    pub fn from_envelope(value: &Value) -> Option<(Self, &Value)> {
        let object = value.as_object()?;
        Self::ALL
            .into_iter()
            .find_map(|op| object.get(op.key()).map(|operand| (op, operand)))
    }
}

/// One `SET` assignment with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The assignment, e.g. `"tags" = "tags" + ?`.
    pub clause: String,
    /// Parameters in placeholder order.
    pub params: Vec<BindValue>,
}

/// Builds a plain `"field" = <expression>` assignment.
#[must_use]
pub fn plain_assignment(field: &str, expression: ValueExpression) -> Assignment {
    let (segment, param) = expression.into_parts();
    Assignment {
        clause: format!("\"{field}\" = {segment}"),
        params: param.into_iter().collect(),
    }
}

/// Builds the assignment for a collection mutation.
///
/// # Errors
///
/// Returns [`CqlError::UnsupportedOperation`] when the field type does not
/// support the mutation or the operand has the wrong shape.
pub fn collection_assignment(
    field: &str,
    field_type: &str,
    op: CollectionOp,
    expression: ValueExpression,
) -> Result<Assignment> {
    let unsupported =
        || CqlError::UnsupportedOperation(format!("{field_type} datatypes do not support {}", op.key()));
    let kind = CollectionKind::from_type(field_type).ok_or_else(unsupported)?;
    let (segment, param) = expression.into_parts();

    let assignment = match op {
        CollectionOp::Add | CollectionOp::Append => Assignment {
            clause: format!("\"{field}\" = \"{field}\" + {segment}"),
            params: param.into_iter().collect(),
        },
        CollectionOp::Prepend => {
            if kind != CollectionKind::List {
                return Err(CqlError::UnsupportedOperation(format!(
                    "{field_type} datatypes do not support $prepend, use $add instead"
                )));
            }
            Assignment {
                clause: format!("\"{field}\" = {segment} + \"{field}\""),
                params: param.into_iter().collect(),
            }
        }
        CollectionOp::Remove => {
            let param = match (kind, param) {
                (CollectionKind::Map, Some(BindValue::Value(Value::Object(entries)))) => {
                    Some(BindValue::Value(Value::Array(
                        entries.keys().cloned().map(Value::String).collect(),
                    )))
                }
                (_, param) => param,
            };
            Assignment {
                clause: format!("\"{field}\" = \"{field}\" - {segment}"),
                params: param.into_iter().collect(),
            }
        }
        CollectionOp::Replace => replace_assignment(field, field_type, kind, param)?,
    };
    Ok(assignment)
}

fn replace_assignment(
    field: &str,
    field_type: &str,
    kind: CollectionKind,
    param: Option<BindValue>,
) -> Result<Assignment> {
    let element_assignment = |key: Value, value: Value| Assignment {
        clause: format!("\"{field}\"[?] = ?"),
        params: vec![BindValue::Value(key), BindValue::Value(value)],
    };

    match (kind, param) {
        (CollectionKind::Map, Some(BindValue::Value(Value::Object(entries)))) if entries.len() == 1 => {
            let (key, value) = entries
                .into_iter()
                .next()
                .ok_or_else(|| CqlError::UnsupportedOperation("empty $replace".to_string()))?;
            Ok(element_assignment(Value::String(key), value))
        }
        (CollectionKind::Map, _) => Err(CqlError::UnsupportedOperation(
            "$replace in map does not support more than one item".to_string(),
        )),
        (CollectionKind::List, Some(BindValue::Value(Value::Array(pair)))) if pair.len() == 2 => {
            let mut pair = pair.into_iter();
            match (pair.next(), pair.next()) {
                (Some(index), Some(value)) => Ok(element_assignment(index, value)),
                _ => Err(CqlError::UnsupportedOperation(
                    "$replace in list should have exactly 2 items, first one as the index and the second one as the value"
                        .to_string(),
                )),
            }
        }
        (CollectionKind::List, _) => Err(CqlError::UnsupportedOperation(
            "$replace in list should have exactly 2 items, first one as the index and the second one as the value"
                .to_string(),
        )),
        (CollectionKind::Set, _) => Err(CqlError::UnsupportedOperation(format!(
            "{field_type} datatypes do not support $replace"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, KeySpec};

    fn schema() -> SchemaDescription {
        SchemaDescription::new()
            .field(FieldSpec::new("id", "uuid"))
            .field(FieldSpec::new("age", "int"))
            .field(FieldSpec::new("views", "counter"))
            .field(FieldSpec::new("tags", "set").type_def("<text>"))
            .field(FieldSpec::new("history", "list").type_def("<text>"))
            .field(FieldSpec::new("attrs", "map").type_def("<text,text>"))
            .key(KeySpec::new(["id"]))
    }

    fn bound(segment: &str, value: Value) -> ValueExpression {
        ValueExpression::Bound {
            segment: segment.to_string(),
            param: BindValue::Value(value),
        }
    }

    #[test]
    fn test_scalar_and_markers() {
        let schema = schema();
        assert_eq!(build_value_expression(&schema, "age", &json!(42)).unwrap(), bound("?", json!(42)));
        assert_eq!(build_value_expression(&schema, "age", &Value::Null).unwrap(), bound("?", Value::Null));
        assert_eq!(
            build_value_expression(&schema, "age", &unset()).unwrap(),
            ValueExpression::Bound {
                segment: "?".to_string(),
                param: BindValue::Unset
            }
        );
        assert_eq!(
            build_value_expression(&schema, "id", &db_function("uuid()")).unwrap(),
            ValueExpression::Raw("uuid()".to_string())
        );
    }

    #[test]
    fn test_invalid_value_message() {
        let err = build_value_expression(&schema(), "age", &json!("abc")).unwrap_err();
        assert_eq!(
            err,
            CqlError::InvalidValue("Invalid Value: \"abc\" for Field: age (Type: int)".to_string())
        );
    }

    #[test]
    fn test_composite_array() {
        let schema = schema();
        assert_eq!(
            build_value_expression(&schema, "age", &json!([1, 2, 3])).unwrap(),
            bound("?", json!([1, 2, 3]))
        );
        assert!(build_value_expression(&schema, "age", &json!([1, "x"])).is_err());
        assert!(build_value_expression(&schema, "age", &json!([1, {"$db_function": "now()"}])).is_err());
        assert_eq!(
            build_value_expression(&schema, "history", &json!(["a", "b"])).unwrap(),
            bound("?", json!(["a", "b"]))
        );
    }

    #[test]
    fn test_counter_expressions() {
        let schema = schema();
        assert_eq!(
            build_value_expression(&schema, "views", &json!(5)).unwrap(),
            bound("\"views\" + ?", json!(5))
        );
        assert_eq!(
            build_value_expression(&schema, "views", &json!(-3)).unwrap(),
            bound("\"views\" - ?", json!(3))
        );
    }

    #[test]
    fn test_collection_assignments() {
        let add = collection_assignment("tags", "set", CollectionOp::Add, bound("?", json!(["x"]))).unwrap();
        assert_eq!(add.clause, "\"tags\" = \"tags\" + ?");
        assert_eq!(add.params, vec![BindValue::Value(json!(["x"]))]);

        let prepend =
            collection_assignment("history", "list", CollectionOp::Prepend, bound("?", json!(["a"]))).unwrap();
        assert_eq!(prepend.clause, "\"history\" = ? + \"history\"");

        let remove =
            collection_assignment("attrs", "map", CollectionOp::Remove, bound("?", json!({"k": "v"}))).unwrap();
        assert_eq!(remove.clause, "\"attrs\" = \"attrs\" - ?");
        assert_eq!(remove.params, vec![BindValue::Value(json!(["k"]))]);

        let replace =
            collection_assignment("attrs", "map", CollectionOp::Replace, bound("?", json!({"k": "v"}))).unwrap();
        assert_eq!(replace.clause, "\"attrs\"[?] = ?");
        assert_eq!(replace.params, vec![BindValue::Value(json!("k")), BindValue::Value(json!("v"))]);

        let replace =
            collection_assignment("history", "list", CollectionOp::Replace, bound("?", json!([1, "b"]))).unwrap();
        assert_eq!(replace.params, vec![BindValue::Value(json!(1)), BindValue::Value(json!("b"))]);
    }

    #[test]
    fn test_unsupported_mutations() {
        assert!(matches!(
            collection_assignment("tags", "set", CollectionOp::Prepend, bound("?", json!(["x"]))),
            Err(CqlError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            collection_assignment("age", "int", CollectionOp::Add, bound("?", json!(1))),
            Err(CqlError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            collection_assignment("attrs", "map", CollectionOp::Replace, bound("?", json!({"a": 1, "b": 2}))),
            Err(CqlError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_envelope_detection() {
        let value = json!({"$prepend": ["a"]});
        assert_eq!(CollectionOp::from_envelope(&value), Some((CollectionOp::Prepend, &json!(["a"]))));
        assert_eq!(CollectionOp::from_envelope(&json!({"k": "v"})), None);
    }
}
