//! Loading schema descriptions from JSON documents.
//!
//! ```json
//! {
//!   "table_name": "events",
//!   "fields": {
//!     "user_id": "uuid",
//!     "created": "timestamp",
//!     "tags": {"type": "set", "typeDef": "<text>"},
//!     "owner": {"type": "text", "static": true}
//!   },
//!   "key": [["user_id"], "created"],
//!   "clustering_order": {"created": "desc"},
//!   "indexes": ["tags"],
//!   "materialized_views": {
//!     "events_by_owner": {"select": ["*"], "key": ["owner", "user_id", "created"]}
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{ClusteringOrder, CustomIndex, FieldSpec, KeySpec, MaterializedViewSpec, SchemaDescription};
use crate::error::{CqlError, Result};
use crate::validation::FieldRule;

fn invalid(message: impl Into<String>) -> CqlError {
    CqlError::InvalidSchema(message.into())
}

impl SchemaDescription {
    /// Parses and validates a schema from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`CqlError::InvalidSchema`] if the document is malformed or
    /// the resulting schema fails [`SchemaDescription::validate`].
    pub fn from_json(document: &Value) -> Result<Self> {
        let object = document
            .as_object()
            .ok_or_else(|| invalid("schema must be an object"))?;

        let mut schema = Self::new();
        if let Some(name) = object.get("table_name") {
            let name = name
                .as_str()
                .ok_or_else(|| invalid("table_name must be a string"))?;
            schema.table_name = Some(name.to_string());
        }

        let fields = object
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid("schema must declare a `fields` object"))?;
        for (name, spec) in fields {
            schema.fields.push(parse_field(name, spec)?);
        }

        schema.key = parse_key(object.get("key").ok_or_else(|| invalid("schema must declare a `key`"))?)?;

        if let Some(order) = object.get("clustering_order") {
            schema.clustering_order = parse_clustering_order(order)?;
        }

        if let Some(indexes) = object.get("indexes") {
            schema.indexes = string_list(indexes, "indexes")?;
        }

        if let Some(index) = object.get("custom_index") {
            schema.custom_indexes.push(parse_custom_index(index)?);
        }
        if let Some(indexes) = object.get("custom_indexes") {
            let items = indexes
                .as_array()
                .ok_or_else(|| invalid("custom_indexes must be an array"))?;
            for item in items {
                schema.custom_indexes.push(parse_custom_index(item)?);
            }
        }

        if let Some(views) = object.get("materialized_views") {
            let views = views
                .as_object()
                .ok_or_else(|| invalid("materialized_views must be an object"))?;
            for (name, view) in views {
                schema
                    .materialized_views
                    .insert(name.clone(), parse_view(name, view)?);
            }
        }

        schema.validate()?;
        Ok(schema)
    }

    /// Parses a schema from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CqlError::InvalidSchema`] on malformed JSON or schemas.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| invalid(format!("malformed JSON: {e}")))?;
        Self::from_json(&document)
    }
}

fn parse_field(name: &str, spec: &Value) -> Result<FieldSpec> {
    let object = match spec {
        Value::String(field_type) => return Ok(FieldSpec::new(name, field_type.clone())),
        Value::Object(object) => object,
        _ => return Err(invalid(format!("field '{name}' must be a type name or an object"))),
    };

    let is_virtual = match object.get("virtual") {
        None | Some(Value::Bool(false) | Value::Null) => false,
        Some(_) => true,
    };
    let field_type = match object.get("type") {
        Some(Value::String(field_type)) => field_type.clone(),
        None if is_virtual => String::new(),
        _ => return Err(invalid(format!("field '{name}' must declare a string `type`"))),
    };

    let mut field = FieldSpec::new(name, field_type);
    field.is_virtual = is_virtual;
    if let Some(type_def) = object.get("typeDef") {
        let type_def = type_def
            .as_str()
            .ok_or_else(|| invalid(format!("typeDef of field '{name}' must be a string")))?;
        field.type_def = Some(type_def.to_string());
    }
    if let Some(is_static) = object.get("static") {
        field.is_static = is_static
            .as_bool()
            .ok_or_else(|| invalid(format!("static of field '{name}' must be a boolean")))?;
    }
    field.default = object.get("default").cloned();
    if let Some(rule) = object.get("rule") {
        field.rule = Some(FieldRule::from_json(name, rule)?);
    }
    Ok(field)
}

fn parse_key(value: &Value) -> Result<KeySpec> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| invalid("key must be a non-empty array"))?;

    let partition = match &items[0] {
        Value::String(column) => vec![column.clone()],
        composite @ Value::Array(_) => string_list(composite, "partition key")?,
        _ => return Err(invalid("partition key must be a column name or an array of names")),
    };
    let clustering = items[1..]
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid("clustering columns must be strings"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(KeySpec {
        partition,
        clustering,
    })
}

fn parse_clustering_order(value: &Value) -> Result<BTreeMap<String, ClusteringOrder>> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid("clustering_order must be an object"))?;
    object
        .iter()
        .map(|(column, order)| {
            order
                .as_str()
                .and_then(ClusteringOrder::parse)
                .map(|order| (column.clone(), order))
                .ok_or_else(|| invalid(format!("clustering order of '{column}' must be asc or desc")))
        })
        .collect()
}

fn parse_custom_index(value: &Value) -> Result<CustomIndex> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid("custom index must be an object"))?;
    let on = required_str(object, "on", "custom index")?;
    let using = required_str(object, "using", "custom index")?;

    let mut index = CustomIndex::new(on, using);
    if let Some(options) = object.get("options") {
        let options = options
            .as_object()
            .ok_or_else(|| invalid("custom index options must be an object"))?;
        for (key, option) in options {
            let rendered = match option {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            index.options.insert(key.clone(), rendered);
        }
    }
    Ok(index)
}

fn parse_view(name: &str, value: &Value) -> Result<MaterializedViewSpec> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid(format!("materialized view '{name}' must be an object")))?;
    let select = string_list(
        object
            .get("select")
            .ok_or_else(|| invalid(format!("materialized view '{name}' must declare `select`")))?,
        "select",
    )?;
    let key = parse_key(
        object
            .get("key")
            .ok_or_else(|| invalid(format!("materialized view '{name}' must declare `key`")))?,
    )?;
    let clustering_order = match object.get("clustering_order") {
        Some(order) => parse_clustering_order(order)?,
        None => BTreeMap::new(),
    };
    Ok(MaterializedViewSpec {
        select,
        key,
        clustering_order,
    })
}

fn required_str<'a>(object: &'a Map<String, Value>, key: &str, what: &str) -> Result<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("{what} must declare a string `{key}`")))
}

fn string_list(value: &Value, what: &str) -> Result<Vec<String>> {
    value
        .as_array()
        .ok_or_else(|| invalid(format!("{what} must be an array")))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("{what} entries must be strings")))
        })
        .collect()
}
