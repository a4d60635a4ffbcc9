//! CQL data types.
//!
//! Field types are kept as the lowercase names CQL uses (`text`, `map`,
//! `frozen`, ...). Parameterized types carry their parameters separately as a
//! type definition string such as `<text,int>`. This module splits catalog
//! type strings into those two parts, resolves declared field types, and
//! provides the built-in value check for every base type.

use std::net::IpAddr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::Value;

use crate::error::{CqlError, Result};
use crate::schema::SchemaDescription;

/// Every base type name CQL understands.
pub const KNOWN_TYPES: &[&str] = &[
    "ascii",
    "bigint",
    "blob",
    "boolean",
    "counter",
    "date",
    "decimal",
    "double",
    "duration",
    "float",
    "frozen",
    "inet",
    "int",
    "list",
    "map",
    "set",
    "smallint",
    "text",
    "time",
    "timestamp",
    "timeuuid",
    "tinyint",
    "tuple",
    "uuid",
    "varchar",
    "varint",
];

/// Returns true if `name` is a base CQL type.
#[must_use]
pub fn is_known_type(name: &str) -> bool {
    KNOWN_TYPES.contains(&name)
}

fn compact(type_string: &str) -> String {
    type_string.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Extracts the base type from a catalog type string.
///
/// `map<text, int>` yields `map`. A string without any known base type (a
/// user-defined type name) is returned whitespace-stripped.
#[must_use]
pub fn extract_type(type_string: &str) -> String {
    let compacted = compact(type_string);
    compacted
        .split(['<', ',', '>'])
        .find(|part| is_known_type(part))
        .map_or_else(|| compacted.clone(), str::to_string)
}

/// Extracts the angle-bracketed type definition from a catalog type string.
///
/// `map<text, int>` yields `<text,int>`. Returns an empty string when the
/// type has no parameters.
#[must_use]
pub fn extract_type_def(type_string: &str) -> String {
    let compacted = compact(type_string);
    compacted
        .find('<')
        .map_or_else(String::new, |start| compacted[start..].to_string())
}

/// The collection family of a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// `list<T>`
    List,
    /// `set<T>`
    Set,
    /// `map<K, V>`
    Map,
}

impl CollectionKind {
    /// Returns the collection kind of a base type, if it is a mutable
    /// collection.
    #[must_use]
    pub fn from_type(field_type: &str) -> Option<Self> {
        match field_type {
            "list" => Some(Self::List),
            "set" => Some(Self::Set),
            "map" => Some(Self::Map),
            _ => None,
        }
    }

    /// Returns the CQL type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
        }
    }
}

/// Returns true for types whose values are whole arrays (so an array value
/// is not an `IN` list of scalars).
#[must_use]
pub fn binds_array_as_value(field_type: &str) -> bool {
    matches!(field_type, "list" | "set" | "frozen" | "tuple")
}

/// Resolves the declared type of a field.
///
/// Returns the base type and its type definition (empty when the field has
/// none). A type written with inline parameters, such as `list<text>`, is
/// split the same way catalog types are.
///
/// # Errors
///
/// Returns [`CqlError::UnknownField`] if the schema does not declare the
/// field.
pub fn resolve_field_type(schema: &SchemaDescription, field: &str) -> Result<(String, String)> {
    let spec = schema
        .get_field(field)
        .ok_or_else(|| CqlError::UnknownField(field.to_string()))?;
    let declared = spec.field_type.trim().to_lowercase();
    match &spec.type_def {
        Some(type_def) => Ok((declared, compact(type_def))),
        None if declared.contains('<') => {
            Ok((extract_type(&declared), extract_type_def(&declared)))
        }
        None => Ok((declared, String::new())),
    }
}

/// A built-in value check.
pub type TypeCheck = fn(&Value) -> bool;

/// Returns the built-in check for a base type, or `None` for types that
/// accept anything (user-defined types).
#[must_use]
pub fn type_check(field_type: &str) -> Option<TypeCheck> {
    let check: TypeCheck = match field_type {
        "ascii" | "text" | "varchar" | "blob" => Value::is_string,
        "bigint" | "counter" | "varint" => is_long,
        "int" => is_int,
        "smallint" => is_smallint,
        "tinyint" => is_tinyint,
        "boolean" => Value::is_boolean,
        "decimal" => is_decimal,
        "double" | "float" => Value::is_number,
        "date" => is_date,
        "time" => is_time,
        "timestamp" => is_timestamp,
        "duration" => Value::is_string,
        "inet" => is_inet,
        "uuid" => is_uuid,
        "timeuuid" => is_timeuuid,
        "list" | "set" | "tuple" => Value::is_array,
        "map" => Value::is_object,
        "frozen" => is_frozen,
        _ => return None,
    };
    Some(check)
}

fn is_long(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i128>().is_ok(),
        _ => false,
    }
}

fn is_bounded(value: &Value, min: i64, max: i64) -> bool {
    value.as_i64().is_some_and(|n| (min..=max).contains(&n))
}

fn is_int(value: &Value) -> bool {
    is_bounded(value, i64::from(i32::MIN), i64::from(i32::MAX))
}

fn is_smallint(value: &Value) -> bool {
    is_bounded(value, i64::from(i16::MIN), i64::from(i16::MAX))
}

fn is_tinyint(value: &Value) -> bool {
    is_bounded(value, i64::from(i8::MIN), i64::from(i8::MAX))
}

fn is_frozen(value: &Value) -> bool {
    value.is_array() || value.is_object()
}

fn is_decimal(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn is_date(value: &Value) -> bool {
    match value {
        Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn is_time(value: &Value) -> bool {
    match value {
        Value::String(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok(),
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn is_timestamp(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            DateTime::parse_from_rfc3339(s).is_ok()
                || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
                || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        }
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn is_inet(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.parse::<IpAddr>().is_ok())
}

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
            .expect("Invalid uuid pattern regex")
    })
}

fn is_uuid(value: &Value) -> bool {
    value.as_str().is_some_and(|s| uuid_pattern().is_match(s))
}

fn is_timeuuid(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| uuid_pattern().is_match(s) && s.as_bytes()[14] == b'1')
}

/// Renders a value the way validation messages show it: strings bare,
/// everything else as JSON.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The message produced when a value fails its type's built-in check.
#[must_use]
pub fn generic_validation_message(value: &Value, field: &str, field_type: &str) -> String {
    format!(
        "Invalid Value: \"{}\" for Field: {} (Type: {})",
        display_value(value),
        field,
        field_type
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{FieldSpec, KeySpec};

    #[test]
    fn test_extract_type() {
        assert_eq!(extract_type("map<text, int>"), "map");
        assert_eq!(extract_type("frozen<address>"), "frozen");
        assert_eq!(extract_type("int"), "int");
        assert_eq!(extract_type("address"), "address");
    }

    #[test]
    fn test_extract_type_def() {
        assert_eq!(extract_type_def("map<text, int>"), "<text,int>");
        assert_eq!(extract_type_def("list<frozen<tuple<int, text>>>"), "<frozen<tuple<int,text>>>");
        assert_eq!(extract_type_def("int"), "");
    }

    #[test]
    fn test_resolve_field_type() {
        let schema = SchemaDescription::new()
            .field(FieldSpec::new("id", "uuid"))
            .field(FieldSpec::new("tags", "set").type_def("<text>"))
            .field(FieldSpec::new("scores", "map<text, int>"))
            .key(KeySpec::new(["id"]));

        assert_eq!(resolve_field_type(&schema, "id").unwrap(), ("uuid".to_string(), String::new()));
        assert_eq!(
            resolve_field_type(&schema, "tags").unwrap(),
            ("set".to_string(), "<text>".to_string())
        );
        assert_eq!(
            resolve_field_type(&schema, "scores").unwrap(),
            ("map".to_string(), "<text,int>".to_string())
        );
        assert_eq!(
            resolve_field_type(&schema, "missing"),
            Err(CqlError::UnknownField("missing".to_string()))
        );
    }

    #[test]
    fn test_type_checks() {
        let int = type_check("int").unwrap();
        assert!(int(&json!(42)));
        assert!(!int(&json!(4_294_967_296_i64)));
        assert!(!int(&json!("42")));

        let bigint = type_check("bigint").unwrap();
        assert!(bigint(&json!("9223372036854775807")));

        let uuid = type_check("uuid").unwrap();
        assert!(uuid(&json!("0b6d9a2e-5f0c-4c1d-9d8e-3f1c2b4a5d6e")));
        assert!(!uuid(&json!("not-a-uuid")));

        let timeuuid = type_check("timeuuid").unwrap();
        assert!(timeuuid(&json!("e5ad8b90-93e6-11ee-b9d1-0242ac120002")));
        assert!(!timeuuid(&json!("0b6d9a2e-5f0c-4c1d-9d8e-3f1c2b4a5d6e")));

        let timestamp = type_check("timestamp").unwrap();
        assert!(timestamp(&json!("2024-03-01T12:00:00Z")));
        assert!(timestamp(&json!(1_709_294_400_000_i64)));
        assert!(!timestamp(&json!(true)));

        assert!(type_check("inet").unwrap()(&json!("10.0.0.1")));
        assert!(type_check("address").is_none());
    }

    #[test]
    fn test_generic_validation_message() {
        assert_eq!(
            generic_validation_message(&json!("abc"), "age", "int"),
            "Invalid Value: \"abc\" for Field: age (Type: int)"
        );
    }
}
