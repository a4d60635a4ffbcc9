//! Field validation rules.
//!
//! Every field is checked by the built-in check for its type, followed by any
//! validators attached through its [`FieldRule`]. Null values, unset markers
//! and database-function values are never validated.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{CqlError, Result};
use crate::schema::SchemaDescription;
use crate::types::{generic_validation_message, resolve_field_type, type_check, TypeCheck};
use crate::value::{as_db_function, is_unset};

/// A user-supplied check.
pub type CustomCheck = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A user-supplied message builder, called with the value, field name and
/// field type.
pub type MessageFn = Arc<dyn Fn(&Value, &str, &str) -> String + Send + Sync>;

/// The predicate of a validator.
#[derive(Clone)]
pub enum Check {
    /// Built-in type check.
    Type(TypeCheck),
    /// String must match the pattern.
    Pattern(Regex),
    /// String or array must have at least this many elements.
    MinLength(usize),
    /// String or array must have at most this many elements.
    MaxLength(usize),
    /// Number must be at least this value.
    Min(f64),
    /// Number must be at most this value.
    Max(f64),
    /// Value must equal one of these.
    OneOf(Vec<Value>),
    /// Arbitrary predicate.
    Custom(CustomCheck),
}

impl Check {
    /// Returns true if the value passes.
    #[must_use]
    pub fn passes(&self, value: &Value) -> bool {
        match self {
            Self::Type(check) => check(value),
            Self::Pattern(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
            Self::MinLength(min) => length_of(value).is_some_and(|len| len >= *min),
            Self::MaxLength(max) => length_of(value).is_some_and(|len| len <= *max),
            Self::Min(min) => value.as_f64().is_some_and(|n| n >= *min),
            Self::Max(max) => value.as_f64().is_some_and(|n| n <= *max),
            Self::OneOf(allowed) => allowed.contains(value),
            Self::Custom(check) => check(value),
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(_) => f.write_str("Type"),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::MinLength(n) => f.debug_tuple("MinLength").field(n).finish(),
            Self::MaxLength(n) => f.debug_tuple("MaxLength").field(n).finish(),
            Self::Min(n) => f.debug_tuple("Min").field(n).finish(),
            Self::Max(n) => f.debug_tuple("Max").field(n).finish(),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// The message reported when a validator fails.
#[derive(Clone)]
pub enum RuleMessage {
    /// `Invalid Value: "<value>" for Field: <field> (Type: <type>)`
    Generic,
    /// A fixed message.
    Text(String),
    /// A message computed from the failing value.
    Custom(MessageFn),
}

impl fmt::Debug for RuleMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => f.write_str("Generic"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// A check paired with its failure message.
#[derive(Debug, Clone)]
pub struct ValidatorRule {
    /// The predicate.
    pub check: Check,
    /// The failure message.
    pub message: RuleMessage,
}

impl ValidatorRule {
    /// Creates a validator reporting the generic message.
    #[must_use]
    pub const fn new(check: Check) -> Self {
        Self {
            check,
            message: RuleMessage::Generic,
        }
    }

    /// Creates a validator from a closure.
    #[must_use]
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::new(Check::Custom(Arc::new(check)))
    }

    /// Sets a fixed failure message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = RuleMessage::Text(message.into());
        self
    }

    /// Sets a computed failure message.
    #[must_use]
    pub fn with_message_fn<F>(mut self, message: F) -> Self
    where
        F: Fn(&Value, &str, &str) -> String + Send + Sync + 'static,
    {
        self.message = RuleMessage::Custom(Arc::new(message));
        self
    }

    /// Returns true if the value passes.
    #[must_use]
    pub fn passes(&self, value: &Value) -> bool {
        self.check.passes(value)
    }

    /// Builds the failure message for a value.
    #[must_use]
    pub fn message_for(&self, value: &Value, field: &str, field_type: &str) -> String {
        match &self.message {
            RuleMessage::Generic => generic_validation_message(value, field, field_type),
            RuleMessage::Text(text) => text.clone(),
            RuleMessage::Custom(build) => build(value, field, field_type),
        }
    }

    /// Parses a validator from its JSON form, e.g.
    /// `{"kind": "regex", "pattern": "^[a-z]+$", "message": "lowercase only"}`.
    ///
    /// Kinds are `regex` (with `pattern`), `min_length`, `max_length`, `min`,
    /// `max` (with `value`) and `one_of` (with `values`).
    ///
    /// # Errors
    ///
    /// Returns [`CqlError::InvalidValidatorRule`] for unknown kinds or
    /// missing and mistyped properties.
    pub fn from_json(field: &str, spec: &Value) -> Result<Self> {
        let invalid = |message: &str| CqlError::InvalidValidatorRule {
            field: field.to_string(),
            message: message.to_string(),
        };
        let object = spec
            .as_object()
            .ok_or_else(|| invalid("validator must be an object"))?;
        let kind = object
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("validator must declare a string `kind`"))?;
        let value = object.get("value");

        let check = match kind {
            "regex" => {
                let pattern = object
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("regex validator requires a string `pattern`"))?;
                Check::Pattern(Regex::new(pattern).map_err(|e| invalid(&e.to_string()))?)
            }
            "min_length" => Check::MinLength(
                value
                    .and_then(as_length)
                    .ok_or_else(|| invalid("min_length requires a non-negative integer `value`"))?,
            ),
            "max_length" => Check::MaxLength(
                value
                    .and_then(as_length)
                    .ok_or_else(|| invalid("max_length requires a non-negative integer `value`"))?,
            ),
            "min" => Check::Min(
                value
                    .and_then(Value::as_f64)
                    .ok_or_else(|| invalid("min requires a numeric `value`"))?,
            ),
            "max" => Check::Max(
                value
                    .and_then(Value::as_f64)
                    .ok_or_else(|| invalid("max requires a numeric `value`"))?,
            ),
            "one_of" => Check::OneOf(
                object
                    .get("values")
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| invalid("one_of requires an array `values`"))?,
            ),
            other => return Err(invalid(&format!("unknown validator kind '{other}'"))),
        };

        let rule = Self::new(check);
        match object.get("message") {
            None => Ok(rule),
            Some(Value::String(message)) => Ok(rule.with_message(message.clone())),
            Some(_) => Err(invalid("message must be a string")),
        }
    }
}

fn as_length(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|n| usize::try_from(n).ok())
}

/// Per-field rule: presence requirements plus extra validators.
#[derive(Debug, Clone, Default)]
pub struct FieldRule {
    /// The field must hold a non-null value on insert and update.
    pub required: bool,
    /// Skip validating the field's default value.
    pub ignore_default: bool,
    /// Validators run after the built-in type check.
    pub validators: Vec<ValidatorRule>,
}

impl FieldRule {
    /// Creates an empty rule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Skips validation of the field's default value.
    #[must_use]
    pub const fn ignore_default(mut self) -> Self {
        self.ignore_default = true;
        self
    }

    /// Adds a validator.
    #[must_use]
    pub fn validator(mut self, validator: ValidatorRule) -> Self {
        self.validators.push(validator);
        self
    }

    /// Parses a rule from its JSON form.
    ///
    /// Accepts `required`, `ignore_default`, a single `validator` object and
    /// a `validators` array.
    ///
    /// # Errors
    ///
    /// Returns [`CqlError::InvalidValidatorRule`] for malformed rules.
    pub fn from_json(field: &str, spec: &Value) -> Result<Self> {
        let invalid = |message: &str| CqlError::InvalidValidatorRule {
            field: field.to_string(),
            message: message.to_string(),
        };
        let object: &Map<String, Value> = spec
            .as_object()
            .ok_or_else(|| invalid("rule must be an object"))?;

        let mut rule = Self::new();
        for (key, value) in object {
            match key.as_str() {
                "required" => {
                    rule.required = value
                        .as_bool()
                        .ok_or_else(|| invalid("required must be a boolean"))?;
                }
                "ignore_default" => {
                    rule.ignore_default = value
                        .as_bool()
                        .ok_or_else(|| invalid("ignore_default must be a boolean"))?;
                }
                "validator" => rule.validators.push(ValidatorRule::from_json(field, value)?),
                "validators" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| invalid("validators must be an array"))?;
                    for item in items {
                        rule.validators.push(ValidatorRule::from_json(field, item)?);
                    }
                }
                other => return Err(invalid(&format!("unknown rule property '{other}'"))),
            }
        }
        Ok(rule)
    }
}

/// Returns the validators that apply to a field: the type check first, then
/// the rule's validators in declaration order.
///
/// # Errors
///
/// Returns [`CqlError::UnknownField`] if the field is not declared.
pub fn validators_for(schema: &SchemaDescription, field: &str) -> Result<Vec<ValidatorRule>> {
    let (field_type, _) = resolve_field_type(schema, field)?;
    let mut validators = Vec::new();
    if let Some(check) = type_check(&field_type) {
        validators.push(ValidatorRule::new(Check::Type(check)));
    }
    if let Some(rule) = schema.get_field(field).and_then(|spec| spec.rule.as_ref()) {
        validators.extend(rule.validators.iter().cloned());
    }
    Ok(validators)
}

/// Returns the first validator the value fails, if any.
#[must_use]
pub fn first_failure<'a>(validators: &'a [ValidatorRule], value: &Value) -> Option<&'a ValidatorRule> {
    if value.is_null() || is_unset(value) || as_db_function(value).is_some() {
        return None;
    }
    validators.iter().find(|validator| !validator.passes(value))
}

/// Validates a value for a field, returning the failure message as
/// [`CqlError::InvalidValue`].
///
/// # Errors
///
/// Returns [`CqlError::InvalidValue`] when a validator rejects the value and
/// [`CqlError::UnknownField`] when the field is not declared.
pub fn validate_field(schema: &SchemaDescription, field: &str, value: &Value) -> Result<()> {
    let validators = validators_for(schema, field)?;
    match first_failure(&validators, value) {
        None => Ok(()),
        Some(failed) => {
            let (field_type, _) = resolve_field_type(schema, field)?;
            Err(CqlError::InvalidValue(failed.message_for(value, field, &field_type)))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{FieldSpec, KeySpec};

    fn schema() -> SchemaDescription {
        SchemaDescription::new()
            .field(FieldSpec::new("id", "uuid"))
            .field(FieldSpec::new("age", "int").rule(
                FieldRule::new().validator(
                    ValidatorRule::custom(|v| v.as_i64().is_some_and(|n| n >= 0))
                        .with_message("age must not be negative"),
                ),
            ))
            .field(FieldSpec::new("nick", "text").rule(
                FieldRule::new().validator(ValidatorRule::new(Check::MaxLength(4)).with_message_fn(
                    |value, field, _| format!("{field} is too long: {}", value.as_str().unwrap_or_default()),
                )),
            ))
            .key(KeySpec::new(["id"]))
    }

    #[test]
    fn test_type_check_runs_first() {
        let err = validate_field(&schema(), "age", &json!("abc")).unwrap_err();
        assert_eq!(
            err,
            CqlError::InvalidValue("Invalid Value: \"abc\" for Field: age (Type: int)".to_string())
        );
    }

    #[test]
    fn test_rule_messages() {
        assert_eq!(
            validate_field(&schema(), "age", &json!(-3)).unwrap_err(),
            CqlError::InvalidValue("age must not be negative".to_string())
        );
        assert_eq!(
            validate_field(&schema(), "nick", &json!("bobby")).unwrap_err(),
            CqlError::InvalidValue("nick is too long: bobby".to_string())
        );
        assert!(validate_field(&schema(), "nick", &json!("bob")).is_ok());
    }

    #[test]
    fn test_markers_skip_validation() {
        let schema = schema();
        assert!(validate_field(&schema, "age", &Value::Null).is_ok());
        assert!(validate_field(&schema, "age", &json!({"$db_function": "now()"})).is_ok());
        assert!(validate_field(&schema, "age", &json!({"$unset": true})).is_ok());
    }

    #[test]
    fn test_rule_from_json() {
        let rule = FieldRule::from_json(
            "email",
            &json!({
                "required": true,
                "validators": [
                    {"kind": "regex", "pattern": "^[^@]+@[^@]+$", "message": "not an email"},
                    {"kind": "max_length", "value": 64}
                ]
            }),
        )
        .unwrap();
        assert!(rule.required);
        assert_eq!(rule.validators.len(), 2);
        assert!(!rule.validators[0].passes(&json!("nobody")));
        assert_eq!(
            rule.validators[0].message_for(&json!("nobody"), "email", "text"),
            "not an email"
        );
    }

    #[test]
    fn test_rule_from_json_rejects_malformed() {
        assert!(FieldRule::from_json("x", &json!({"validator": {}})).is_err());
        assert!(FieldRule::from_json("x", &json!({"validator": {"kind": "min"}})).is_err());
        assert!(FieldRule::from_json("x", &json!({"validator": {"kind": "regex", "pattern": "("}})).is_err());
        assert!(FieldRule::from_json("x", &json!({"validator": {"kind": "luhn"}})).is_err());
        assert!(FieldRule::from_json("x", &json!({"unknown": true})).is_err());
    }
}
