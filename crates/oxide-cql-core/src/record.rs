//! Records: field values plus a dirty-field set.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::schema::SchemaDescription;
use crate::validation::validate_field;

/// The values of one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: Map<String, Value>,
    dirty: BTreeSet<String>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record whose values are all dirty, for a new row.
    #[must_use]
    pub fn with_values(values: Map<String, Value>) -> Self {
        let dirty = values.keys().cloned().collect();
        Self { values, dirty }
    }

    /// Creates a clean record from a row read back from the database.
    #[must_use]
    pub fn from_row(values: Map<String, Value>) -> Self {
        Self {
            values,
            dirty: BTreeSet::new(),
        }
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Sets a value, marking the field dirty if the value changed.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        if self.values.get(&field) != Some(&value) {
            self.dirty.insert(field.clone());
        }
        self.values.insert(field, value);
    }

    /// Returns true if the field changed since the last write.
    #[must_use]
    pub fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    /// Returns the changed fields in name order.
    #[must_use]
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.dirty.iter().map(String::as_str).collect()
    }

    /// Forgets all changes, after a successful write.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Returns all values.
    #[must_use]
    pub const fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Consumes the record, returning its values.
    #[must_use]
    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// Returns the persisted values: virtual and undeclared fields dropped.
    #[must_use]
    pub fn persisted_values(&self, schema: &SchemaDescription) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(name, _)| schema.get_field(name).is_some_and(|f| !f.is_virtual))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Validates one field value against the schema.
    ///
    /// # Errors
    ///
    /// Returns the validator message as [`crate::CqlError::InvalidValue`].
    pub fn validate(&self, schema: &SchemaDescription, field: &str) -> Result<()> {
        validate_field(schema, field, self.values.get(field).unwrap_or(&Value::Null))
    }
}
