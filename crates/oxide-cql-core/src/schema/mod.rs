//! Schema description types.
//!
//! A [`SchemaDescription`] is the declared shape of one table: its fields,
//! primary key, clustering order, secondary indexes, custom indexes and
//! materialized views. The same type is built from the database catalog so
//! the two can be normalized and compared.

mod loader;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CqlError, Result};
use crate::validation::FieldRule;

/// Sort direction of a clustering column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusteringOrder {
    /// Ascending (the database default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl ClusteringOrder {
    /// Parses `asc`/`desc` in any letter case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }

    /// Returns `ASC` or `DESC`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Primary key of a table or view: partition columns followed by clustering
/// columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeySpec {
    /// Partition key columns, never empty in a valid schema.
    pub partition: Vec<String>,
    /// Clustering columns in order.
    pub clustering: Vec<String>,
}

impl KeySpec {
    /// Creates a key with the given partition columns.
    #[must_use]
    pub fn new<I, S>(partition: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            partition: partition.into_iter().map(Into::into).collect(),
            clustering: Vec::new(),
        }
    }

    /// Appends a clustering column.
    #[must_use]
    pub fn clustering(mut self, column: impl Into<String>) -> Self {
        self.clustering.push(column.into());
        self
    }

    /// Returns true if the column is part of the partition key.
    #[must_use]
    pub fn is_partition(&self, column: &str) -> bool {
        self.partition.iter().any(|c| c == column)
    }

    /// Returns true if the column is a clustering column.
    #[must_use]
    pub fn is_clustering(&self, column: &str) -> bool {
        self.clustering.iter().any(|c| c == column)
    }

    /// Returns true if the column is any part of the primary key.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.is_partition(column) || self.is_clustering(column)
    }

    /// Iterates over all key columns, partition first.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.partition.iter().chain(self.clustering.iter())
    }
}

/// A declared field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Column name.
    pub name: String,
    /// Base CQL type, e.g. `text` or `map`.
    pub field_type: String,
    /// Type parameters, e.g. `<text,int>`.
    pub type_def: Option<String>,
    /// Static column.
    pub is_static: bool,
    /// Virtual fields are never persisted.
    pub is_virtual: bool,
    /// Value used on insert when none is given.
    pub default: Option<Value>,
    /// Presence requirements and extra validators.
    pub rule: Option<FieldRule>,
}

impl FieldSpec {
    /// Creates a field of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            type_def: None,
            is_static: false,
            is_virtual: false,
            default: None,
            rule: None,
        }
    }

    /// Sets the type parameters.
    #[must_use]
    pub fn type_def(mut self, type_def: impl Into<String>) -> Self {
        self.type_def = Some(type_def.into());
        self
    }

    /// Marks the column static.
    #[must_use]
    pub const fn static_column(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Marks the field virtual.
    #[must_use]
    pub const fn virtual_field(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the field rule.
    #[must_use]
    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Returns true if the rule marks this field required.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.rule.as_ref().is_some_and(|rule| rule.required)
    }

    /// Returns the full CQL type, e.g. `map<text,int>`.
    #[must_use]
    pub fn full_type(&self) -> String {
        format!("{}{}", self.field_type, self.type_def.as_deref().unwrap_or_default())
    }
}

/// A custom (class-backed) secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomIndex {
    /// Indexed column.
    pub on: String,
    /// Index implementation class.
    pub using: String,
    /// Index options.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl CustomIndex {
    /// Creates a custom index on a column.
    #[must_use]
    pub fn new(on: impl Into<String>, using: impl Into<String>) -> Self {
        Self {
            on: on.into(),
            using: using.into(),
            options: BTreeMap::new(),
        }
    }

    /// Adds an index option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// A declared materialized view over the table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaterializedViewSpec {
    /// Selected columns, or `*`.
    pub select: Vec<String>,
    /// View primary key.
    pub key: KeySpec,
    /// Clustering order of the view.
    #[serde(default)]
    pub clustering_order: BTreeMap<String, ClusteringOrder>,
}

impl MaterializedViewSpec {
    /// Creates a view selecting the given columns.
    #[must_use]
    pub fn new<I, S>(select: I, key: KeySpec) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            select: select.into_iter().map(Into::into).collect(),
            key,
            clustering_order: BTreeMap::new(),
        }
    }

    /// Sets the order of a clustering column.
    #[must_use]
    pub fn order(mut self, column: impl Into<String>, order: ClusteringOrder) -> Self {
        self.clustering_order.insert(column.into(), order);
        self
    }

    /// Returns true if the view selects every column.
    #[must_use]
    pub fn selects_all(&self) -> bool {
        self.select.iter().any(|column| column == "*")
    }
}

/// A secondary index target such as `name`, `keys(attrs)` or
/// `entries(attrs)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexTarget {
    /// Collection index function, lowercased.
    pub function: Option<String>,
    /// Indexed column.
    pub column: String,
}

impl IndexTarget {
    /// Parses an index declaration or catalog target. Quotes and whitespace
    /// are ignored.
    #[must_use]
    pub fn parse(target: &str) -> Self {
        let cleaned: String = target
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '"')
            .collect();
        match cleaned.split_once('(') {
            Some((function, rest)) => Self {
                function: Some(function.to_lowercase()),
                column: rest.trim_end_matches(')').to_string(),
            },
            None => Self {
                function: None,
                column: cleaned,
            },
        }
    }

    /// Returns the identity used to compare declared and live indexes.
    ///
    /// `values(col)` is the implicit target for collections, so it compares
    /// equal to a plain `col`.
    #[must_use]
    pub fn normalized(&self) -> String {
        match self.function.as_deref() {
            None | Some("values") => self.column.clone(),
            Some(function) => format!("{function}({})", self.column),
        }
    }
}

/// The declared shape of a table.
#[derive(Debug, Clone, Default)]
pub struct SchemaDescription {
    /// Optional table name carried by schema files.
    pub table_name: Option<String>,
    /// Fields in declaration order.
    pub fields: Vec<FieldSpec>,
    /// Primary key.
    pub key: KeySpec,
    /// Clustering order by column.
    pub clustering_order: BTreeMap<String, ClusteringOrder>,
    /// Secondary index targets.
    pub indexes: Vec<String>,
    /// Custom indexes.
    pub custom_indexes: Vec<CustomIndex>,
    /// Materialized views by name.
    pub materialized_views: BTreeMap<String, MaterializedViewSpec>,
}

impl SchemaDescription {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table name.
    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn key(mut self, key: KeySpec) -> Self {
        self.key = key;
        self
    }

    /// Sets the order of a clustering column.
    #[must_use]
    pub fn order(mut self, column: impl Into<String>, order: ClusteringOrder) -> Self {
        self.clustering_order.insert(column.into(), order);
        self
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn index(mut self, target: impl Into<String>) -> Self {
        self.indexes.push(target.into());
        self
    }

    /// Adds a custom index.
    #[must_use]
    pub fn custom_index(mut self, index: CustomIndex) -> Self {
        self.custom_indexes.push(index);
        self
    }

    /// Adds a materialized view.
    #[must_use]
    pub fn materialized_view(mut self, name: impl Into<String>, view: MaterializedViewSpec) -> Self {
        self.materialized_views.insert(name.into(), view);
        self
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Iterates over fields that are stored in the table.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.is_virtual)
    }

    /// Returns the effective clustering order of a column.
    #[must_use]
    pub fn order_of(&self, column: &str) -> ClusteringOrder {
        self.clustering_order.get(column).copied().unwrap_or_default()
    }

    /// Checks the structural rules every schema must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`CqlError::InvalidSchema`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(CqlError::InvalidSchema(message));

        if self.fields.is_empty() {
            return invalid("schema must declare at least one field".to_string());
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return invalid(format!("field '{}' is declared twice", field.name));
            }
            if !field.is_virtual && field.field_type.trim().is_empty() {
                return invalid(format!("field '{}' has no type", field.name));
            }
        }

        if self.key.partition.is_empty() {
            return invalid("key must declare at least one partition column".to_string());
        }
        for column in self.key.columns() {
            match self.get_field(column) {
                None => return invalid(format!("key column '{column}' is not a declared field")),
                Some(field) if field.is_virtual => {
                    return invalid(format!("key column '{column}' cannot be virtual"));
                }
                Some(field) if field.is_static => {
                    return invalid(format!("key column '{column}' cannot be static"));
                }
                Some(_) => {}
            }
        }
        if self.key.clustering.is_empty() {
            if let Some(field) = self.persisted_fields().find(|f| f.is_static) {
                return invalid(format!(
                    "static column '{}' requires clustering columns",
                    field.name
                ));
            }
        }
        for column in self.clustering_order.keys() {
            if !self.key.is_clustering(column) {
                return invalid(format!(
                    "clustering_order column '{column}' is not a clustering column"
                ));
            }
        }

        for target in &self.indexes {
            let parsed = IndexTarget::parse(target);
            if self.persisted_field(&parsed.column).is_none() {
                return invalid(format!("index target '{target}' is not a declared field"));
            }
        }
        for index in &self.custom_indexes {
            let column = IndexTarget::parse(&index.on).column;
            if self.persisted_field(&column).is_none() {
                return invalid(format!("custom index column '{}' is not a declared field", index.on));
            }
            if index.using.trim().is_empty() {
                return invalid(format!("custom index on '{}' has no class", index.on));
            }
        }

        for (name, view) in &self.materialized_views {
            check_table_name(name)?;
            if view.select.is_empty() {
                return invalid(format!("materialized view '{name}' selects nothing"));
            }
            if view.key.partition.is_empty() {
                return invalid(format!("materialized view '{name}' has no partition key"));
            }
            for column in view.select.iter().filter(|c| c.as_str() != "*").chain(view.key.columns()) {
                if self.persisted_field(column).is_none() {
                    return invalid(format!(
                        "materialized view '{name}' references unknown field '{column}'"
                    ));
                }
            }
        }

        Ok(())
    }

    fn persisted_field(&self, name: &str) -> Option<&FieldSpec> {
        self.get_field(name).filter(|f| !f.is_virtual)
    }
}

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("Invalid table name pattern regex")
    })
}

/// Checks that a table or view name starts with a letter and continues with
/// letters, digits or underscores.
///
/// # Errors
///
/// Returns [`CqlError::InvalidTableName`] otherwise.
pub fn check_table_name(name: &str) -> Result<()> {
    if table_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(CqlError::InvalidTableName(name.to_string()))
    }
}
