//! Schema normalization.
//!
//! Declared schemas and schemas read back from the catalog differ in ways
//! that carry no meaning: letter case of types, whitespace in type
//! definitions, quoting of index targets, `values(col)` versus `col`, `*`
//! projections, omitted `ASC` orders, declaration order. A
//! [`NormalizedSchema`] removes all of that so two schemas can be compared
//! with `==`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::schema::{ClusteringOrder, CustomIndex, IndexTarget, KeySpec, MaterializedViewSpec, SchemaDescription};
use crate::types::resolve_field_type;

/// A persisted column after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedField {
    /// Lowercase base type.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Lowercase, whitespace-free type definition.
    #[serde(rename = "typeDef", skip_serializing_if = "Option::is_none")]
    pub type_def: Option<String>,
    /// Static column.
    #[serde(rename = "static", skip_serializing_if = "std::ops::Not::not")]
    pub is_static: bool,
}

impl NormalizedField {
    /// Returns the full CQL type, e.g. `map<text,int>`.
    #[must_use]
    pub fn full_type(&self) -> String {
        format!("{}{}", self.field_type, self.type_def.as_deref().unwrap_or_default())
    }
}

/// A materialized view after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedView {
    /// Sorted projection including every key column; `*` is expanded.
    pub select: Vec<String>,
    /// View primary key.
    pub key: KeySpec,
    /// Order of every clustering column.
    pub clustering_order: BTreeMap<String, ClusteringOrder>,
}

impl NormalizedView {
    /// Returns the structural identity of the view definition.
    #[must_use]
    pub fn identity(&self) -> String {
        let mut canonical = format!(
            "select={};partition={};clustering=",
            self.select.join(","),
            self.key.partition.join(",")
        );
        for column in &self.key.clustering {
            let order = self.clustering_order.get(column).copied().unwrap_or_default();
            let _ = write!(canonical, "{column}:{},", order.as_str());
        }
        identity_hash(&canonical)
    }

    /// Returns true if dropping `field` from the base table requires dropping
    /// this view.
    #[must_use]
    pub fn depends_on(&self, field: &str) -> bool {
        self.select.iter().any(|c| c == field || c == "*") || self.key.contains(field)
    }
}

/// SHA-256 hex digest of a canonical definition string.
#[must_use]
pub fn identity_hash(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut hex, byte| {
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}

impl CustomIndex {
    /// Returns the index with quotes and whitespace removed from its column.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            on: IndexTarget::parse(&self.on).normalized(),
            using: self.using.trim().to_string(),
            options: self.options.clone(),
        }
    }

    /// Returns the structural identity of the index definition.
    #[must_use]
    pub fn identity(&self) -> String {
        let normalized = self.normalized();
        let mut canonical = format!("on={};using={}", normalized.on, normalized.using);
        for (key, value) in &normalized.options {
            let _ = write!(canonical, ";{key}={value}");
        }
        identity_hash(&canonical)
    }
}

/// A schema reduced to the parts that matter for comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedSchema {
    /// Persisted columns by name.
    pub fields: BTreeMap<String, NormalizedField>,
    /// Primary key.
    pub key: KeySpec,
    /// Order of every clustering column.
    pub clustering_order: BTreeMap<String, ClusteringOrder>,
    /// Sorted, deduplicated index identities (see [`IndexTarget::normalized`]).
    pub indexes: Vec<String>,
    /// Custom indexes sorted by identity.
    pub custom_indexes: Vec<CustomIndex>,
    /// Views by name.
    pub materialized_views: BTreeMap<String, NormalizedView>,
}

impl NormalizedSchema {
    /// Normalizes a schema description.
    ///
    /// # Errors
    ///
    /// Returns an error if a field type cannot be resolved.
    pub fn from_schema(schema: &SchemaDescription) -> Result<Self> {
        let mut fields = BTreeMap::new();
        for field in schema.persisted_fields() {
            let (field_type, type_def) = resolve_field_type(schema, &field.name)?;
            fields.insert(
                field.name.clone(),
                NormalizedField {
                    field_type,
                    type_def: Some(type_def.to_lowercase()).filter(|t| !t.is_empty()),
                    is_static: field.is_static,
                },
            );
        }

        let mut indexes: Vec<String> = schema
            .indexes
            .iter()
            .map(|target| IndexTarget::parse(target).normalized())
            .collect();
        indexes.sort();
        indexes.dedup();

        let mut custom_indexes: Vec<(String, CustomIndex)> = schema
            .custom_indexes
            .iter()
            .map(|index| (index.identity(), index.normalized()))
            .collect();
        custom_indexes.sort_by(|a, b| a.0.cmp(&b.0));
        custom_indexes.dedup_by(|a, b| a.0 == b.0);

        let materialized_views = schema
            .materialized_views
            .iter()
            .map(|(name, view)| (name.clone(), normalize_view(schema, view)))
            .collect();

        Ok(Self {
            key: schema.key.clone(),
            clustering_order: full_clustering_order(&schema.key, &schema.clustering_order),
            fields,
            indexes,
            custom_indexes: custom_indexes.into_iter().map(|(_, index)| index).collect(),
            materialized_views,
        })
    }

    /// Returns true if `other` has the same key and clustering order.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        self.key == other.key && self.clustering_order == other.clustering_order
    }

    /// Returns the index identities that depend on `field`.
    #[must_use]
    pub fn dependent_indexes(&self, field: &str) -> Vec<String> {
        self.indexes
            .iter()
            .filter(|identity| IndexTarget::parse(identity).column == field)
            .cloned()
            .collect()
    }

    /// Returns the custom indexes on `field`.
    #[must_use]
    pub fn dependent_custom_indexes(&self, field: &str) -> Vec<CustomIndex> {
        self.custom_indexes
            .iter()
            .filter(|index| index.on == field)
            .cloned()
            .collect()
    }

    /// Returns the names of views that depend on `field`.
    #[must_use]
    pub fn dependent_views(&self, field: &str) -> Vec<String> {
        self.materialized_views
            .iter()
            .filter(|(_, view)| view.depends_on(field))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn full_clustering_order(
    key: &KeySpec,
    declared: &BTreeMap<String, ClusteringOrder>,
) -> BTreeMap<String, ClusteringOrder> {
    key.clustering
        .iter()
        .map(|column| {
            (
                column.clone(),
                declared.get(column).copied().unwrap_or_default(),
            )
        })
        .collect()
}

fn normalize_view(schema: &SchemaDescription, view: &MaterializedViewSpec) -> NormalizedView {
    let mut select: Vec<String> = if view.selects_all() {
        schema.persisted_fields().map(|f| f.name.clone()).collect()
    } else {
        view.select.clone()
    };
    select.extend(view.key.columns().cloned());
    select.sort();
    select.dedup();

    NormalizedView {
        select,
        key: view.key.clone(),
        clustering_order: full_clustering_order(&view.key, &view.clustering_order),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn declared() -> SchemaDescription {
        SchemaDescription::new()
            .field(FieldSpec::new("user_id", "UUID"))
            .field(FieldSpec::new("created", "timestamp"))
            .field(FieldSpec::new("attrs", "map").type_def("<text, Text>"))
            .field(FieldSpec::new("label", "text").virtual_field())
            .key(KeySpec::new(["user_id"]).clustering("created"))
            .index("values(attrs)")
            .custom_index(CustomIndex::new("\"created\"", "org.example.Sasi").option("mode", "SPARSE"))
            .materialized_view(
                "by_created",
                MaterializedViewSpec::new(["*"], KeySpec::new(["created"]).clustering("user_id")),
            )
    }

    fn live() -> SchemaDescription {
        SchemaDescription::new()
            .field(FieldSpec::new("attrs", "map<text,text>"))
            .field(FieldSpec::new("created", "timestamp"))
            .field(FieldSpec::new("user_id", "uuid"))
            .key(KeySpec::new(["user_id"]).clustering("created"))
            .order("created", ClusteringOrder::Asc)
            .index("attrs")
            .custom_index(CustomIndex::new("created", "org.example.Sasi").option("mode", "SPARSE"))
            .materialized_view(
                "by_created",
                MaterializedViewSpec::new(["user_id", "attrs", "created"], KeySpec::new(["created"]).clustering("user_id")),
            )
    }

    #[test]
    fn test_equivalent_schemas_normalize_equal() {
        let declared = NormalizedSchema::from_schema(&declared()).unwrap();
        let live = NormalizedSchema::from_schema(&live()).unwrap();
        assert_eq!(declared, live);
        assert!(!declared.fields.contains_key("label"));
        assert_eq!(declared.fields["attrs"].full_type(), "map<text,text>");
    }

    #[test]
    fn test_identity_is_stable() {
        let a = CustomIndex::new("\"c\"", "Cls").option("k", "v");
        let b = CustomIndex::new("c", "Cls").option("k", "v");
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().len(), 64);
        assert_ne!(a.identity(), CustomIndex::new("c", "Cls").identity());
    }

    #[test]
    fn test_dependents() {
        let normalized = NormalizedSchema::from_schema(&declared()).unwrap();
        assert_eq!(normalized.dependent_indexes("attrs"), vec!["attrs".to_string()]);
        assert_eq!(normalized.dependent_custom_indexes("created").len(), 1);
        assert_eq!(normalized.dependent_views("attrs"), vec!["by_created".to_string()]);
        assert!(normalized.dependent_indexes("user_id").is_empty());
    }
}
