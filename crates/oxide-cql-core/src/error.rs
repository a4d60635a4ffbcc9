//! Error types for schema handling, query translation and statement
//! generation.

/// Errors raised while interpreting a schema or building a statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CqlError {
    /// The schema description is structurally invalid.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// The table name does not start with a letter or contains characters
    /// other than letters, digits and underscores.
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    /// A validator rule attached to a field is malformed.
    #[error("Invalid validator rule for field '{field}': {message}")]
    InvalidValidatorRule {
        /// Field carrying the rule.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The field is not declared in the schema.
    #[error("Field '{0}' is not declared in the schema")]
    UnknownField(String),

    /// A value failed validation. The message is the validator's message.
    #[error("{0}")]
    InvalidValue(String),

    /// A query-object key starting with `$` is not a known operator.
    #[error("Invalid query operator: {0}")]
    InvalidOperator(String),

    /// `$in` was given something other than an array.
    #[error("$in operator for field '{0}' requires an array value")]
    InvalidInOperand(String),

    /// A `$token` relation is malformed.
    #[error("Invalid $token query: {0}")]
    InvalidToken(String),

    /// An operator inside `$token` is not a comparison operator.
    #[error("Invalid operator inside $token: {0}")]
    InvalidTokenOperator(String),

    /// `$contains` used on a field that is not a collection.
    #[error("$contains operator is only valid on collection fields, got '{0}'")]
    InvalidContains(String),

    /// `$contains_key` used on a field that is not a map.
    #[error("$contains_key operator is only valid on map fields, got '{0}'")]
    InvalidContainsKey(String),

    /// `$expr` is missing a string `index` or `query`.
    #[error("$expr requires string `index` and `query` properties")]
    InvalidExpr,

    /// `$solr_query` was given something other than a string.
    #[error("$solr_query requires a string value")]
    InvalidSolrQuery,

    /// `$orderby` is malformed.
    #[error("Invalid $orderby: {0}")]
    InvalidOrder(String),

    /// `$orderby` names a direction other than `$asc` or `$desc`.
    #[error("Invalid $orderby direction: {0}")]
    InvalidOrderType(String),

    /// `$limit` is not a non-negative integer.
    #[error("$limit requires a non-negative integer value")]
    InvalidLimit,

    /// The requested collection mutation or statement is not supported for
    /// the field.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A primary key column has no value.
    #[error("Primary key field '{0}' must have a value")]
    UnsetKey(String),

    /// A required column has no value.
    #[error("Required field '{0}' must have a value")]
    UnsetRequired(String),

    /// A field default does not pass the field's validators.
    #[error("Invalid default value {value} for field '{field}' (type: {field_type})")]
    InvalidDefaultValue {
        /// The rejected default, rendered as JSON.
        value: String,
        /// The field.
        field: String,
        /// The field type.
        field_type: String,
    },
}

/// Result type for schema and statement operations.
pub type Result<T> = std::result::Result<T, CqlError>;
