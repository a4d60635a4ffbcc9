//! # oxide-cql-core
//!
//! Schema model, query translation and statement generation for
//! Cassandra-family databases.
//!
//! Everything in this crate is synchronous and performs no I/O:
//!
//! - [`schema`]: declared table shapes, loadable from JSON
//! - [`types`] and [`validation`]: field type resolution and value checks
//! - [`value`] and [`query`]: value expressions and query-object translation
//! - [`statement`] and [`ddl`]: data and definition statements
//! - [`normalize`] and [`diff`]: schema comparison
//! - [`record`]: row values with dirty tracking
//!
//! ## Example
//!
//! ```rust
//! use oxide_cql_core::{ddl, parse_query_object, FieldSpec, KeySpec, SchemaDescription};
//! use serde_json::json;
//!
//! let schema = SchemaDescription::new()
//!     .field(FieldSpec::new("id", "uuid"))
//!     .field(FieldSpec::new("name", "text"))
//!     .field(FieldSpec::new("age", "int"))
//!     .key(KeySpec::new(["id"]));
//!
//! assert_eq!(
//!     ddl::create_table("users", &schema),
//!     r#"CREATE TABLE IF NOT EXISTS "users" ("id" uuid , "name" text , "age" int , PRIMARY KEY(("id")));"#
//! );
//!
//! let query = json!({"age": {"$gte": 18}, "name": {"$in": ["a", "b"]}});
//! let parsed = parse_query_object(&schema, query.as_object().unwrap()).unwrap();
//! assert_eq!(parsed.relations, vec![r#""age" >= ?"#, r#""name" IN ?"#]);
//! ```

pub mod ddl;
pub mod diff;
pub mod error;
pub mod normalize;
pub mod query;
pub mod record;
pub mod schema;
pub mod statement;
pub mod types;
pub mod validation;
pub mod value;

pub use ddl::DdlOperation;
pub use diff::{
    diff_fields, is_alterable_type_change, type_change_policy, DiffKind, FieldChange, FieldDiff,
    SchemaDiff, StructuralDiff, TypeChangePolicy,
};
pub use error::{CqlError, Result};
pub use normalize::{NormalizedField, NormalizedSchema, NormalizedView};
pub use query::{if_clause, parse_query_object, where_clause, Clause, Operator, ParsedQuery};
pub use record::Record;
pub use schema::{
    check_table_name, ClusteringOrder, CustomIndex, FieldSpec, IndexTarget, KeySpec,
    MaterializedViewSpec, SchemaDescription,
};
pub use statement::{
    delete_statement, find_statement, insert_statement, update_statement, FindOptions,
    InsertOptions, Statement, UpdateOptions,
};
pub use types::{extract_type, extract_type_def, resolve_field_type, CollectionKind};
pub use validation::{Check, FieldRule, ValidatorRule};
pub use value::{build_value_expression, db_function, unset, BindValue, CollectionOp, ValueExpression};
