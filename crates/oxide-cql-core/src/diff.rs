//! Schema diffing.
//!
//! Compares a live [`NormalizedSchema`] against a declared one and reports
//! the field-level changes plus the index, custom-index and view sets that
//! were added or removed.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::normalize::{NormalizedField, NormalizedSchema};
use crate::schema::{CustomIndex, KeySpec};

// ============================================================================
// Field diffs
// ============================================================================

/// The kind of a field diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffKind {
    /// Only in the declared schema.
    Added,
    /// Only in the live schema.
    Deleted,
    /// In both, with a changed attribute.
    Edited,
}

/// What changed about a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum FieldChange {
    /// The field is new.
    Added {
        /// Declared definition.
        field: NormalizedField,
    },
    /// The field was removed.
    Deleted {
        /// Live definition.
        field: NormalizedField,
    },
    /// The base type changed.
    TypeChanged {
        /// Live type.
        before: String,
        /// Declared type.
        after: String,
    },
    /// The type definition changed.
    TypeDefChanged {
        /// Live type definition.
        before: Option<String>,
        /// Declared type definition.
        after: Option<String>,
    },
    /// The static flag changed.
    StaticChanged {
        /// Live flag.
        before: bool,
        /// Declared flag.
        after: bool,
    },
}

/// One change to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    /// Field name.
    pub field: String,
    /// The change.
    pub change: FieldChange,
}

impl FieldDiff {
    /// Returns the diff kind.
    #[must_use]
    pub const fn kind(&self) -> DiffKind {
        match self.change {
            FieldChange::Added { .. } => DiffKind::Added,
            FieldChange::Deleted { .. } => DiffKind::Deleted,
            _ => DiffKind::Edited,
        }
    }

    /// Returns the path of the changed attribute, e.g. `["age", "type"]`.
    #[must_use]
    pub fn path(&self) -> Vec<String> {
        let attribute = match self.change {
            FieldChange::Added { .. } | FieldChange::Deleted { .. } => None,
            FieldChange::TypeChanged { .. } => Some("type"),
            FieldChange::TypeDefChanged { .. } => Some("typeDef"),
            FieldChange::StaticChanged { .. } => Some("static"),
        };
        std::iter::once(self.field.clone())
            .chain(attribute.map(str::to_string))
            .collect()
    }
}

/// Lists field changes from `live` to `declared`.
///
/// Live fields come first in name order (deletions and edits), then fields
/// only the declared schema has (additions), also in name order.
#[must_use]
pub fn diff_fields(live: &NormalizedSchema, declared: &NormalizedSchema) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();

    for (name, before) in &live.fields {
        let diff = |change| FieldDiff {
            field: name.clone(),
            change,
        };
        let Some(after) = declared.fields.get(name) else {
            diffs.push(diff(FieldChange::Deleted {
                field: before.clone(),
            }));
            continue;
        };
        if before.field_type != after.field_type {
            diffs.push(diff(FieldChange::TypeChanged {
                before: before.field_type.clone(),
                after: after.field_type.clone(),
            }));
        }
        if before.type_def != after.type_def {
            diffs.push(diff(FieldChange::TypeDefChanged {
                before: before.type_def.clone(),
                after: after.type_def.clone(),
            }));
        }
        if before.is_static != after.is_static {
            diffs.push(diff(FieldChange::StaticChanged {
                before: before.is_static,
                after: after.is_static,
            }));
        }
    }

    for (name, field) in &declared.fields {
        if !live.fields.contains_key(name) {
            diffs.push(FieldDiff {
                field: name.clone(),
                change: FieldChange::Added {
                    field: field.clone(),
                },
            });
        }
    }

    diffs
}

// ============================================================================
// Type changes
// ============================================================================

const BLOB_COMPATIBLE: &[&str] = &[
    "text",
    "ascii",
    "bigint",
    "boolean",
    "decimal",
    "double",
    "float",
    "inet",
    "int",
    "timestamp",
    "timeuuid",
    "uuid",
    "varchar",
    "varint",
];

/// Returns true if the database can change the column type in place.
#[must_use]
pub fn is_alterable_type_change(before: &str, after: &str) -> bool {
    match (before, after) {
        ("int", "varint") | ("timeuuid", "uuid") => true,
        (from, "blob") => BLOB_COMPATIBLE.contains(&from),
        _ => false,
    }
}

/// How a type change on a column is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeChangePolicy {
    /// `ALTER TABLE ... ALTER ... TYPE`.
    AlterInPlace,
    /// Drop the column and add it again with the new type.
    RecreateColumn,
    /// Drop and recreate the whole table.
    RecreateTable,
}

/// Decides how to apply a base-type change to `field`.
///
/// Partition key columns always need a new table. Clustering columns can
/// only be altered in place. Regular columns are altered in place when
/// possible and dropped and re-added otherwise.
#[must_use]
pub fn type_change_policy(key: &KeySpec, field: &str, before: &str, after: &str) -> TypeChangePolicy {
    let alterable = is_alterable_type_change(before, after);
    if key.is_partition(field) {
        TypeChangePolicy::RecreateTable
    } else if key.is_clustering(field) {
        if alterable {
            TypeChangePolicy::AlterInPlace
        } else {
            TypeChangePolicy::RecreateTable
        }
    } else if alterable {
        TypeChangePolicy::AlterInPlace
    } else {
        TypeChangePolicy::RecreateColumn
    }
}

// ============================================================================
// Structural diff
// ============================================================================

/// Index, custom-index and view changes, keyed by structural identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuralDiff {
    /// Declared index identities missing from the live schema.
    pub added_indexes: Vec<String>,
    /// Live index identities no longer declared.
    pub removed_indexes: Vec<String>,
    /// Declared custom indexes missing from the live schema.
    pub added_custom_indexes: Vec<CustomIndex>,
    /// Live custom indexes no longer declared.
    pub removed_custom_indexes: Vec<CustomIndex>,
    /// Declared view names whose definition is not live.
    pub added_views: Vec<String>,
    /// Live view names whose definition is no longer declared.
    pub removed_views: Vec<String>,
}

impl StructuralDiff {
    /// Compares the dependent objects of two schemas.
    #[must_use]
    pub fn between(live: &NormalizedSchema, declared: &NormalizedSchema) -> Self {
        let live_indexes: BTreeSet<&String> = live.indexes.iter().collect();
        let declared_indexes: BTreeSet<&String> = declared.indexes.iter().collect();

        let live_custom: BTreeSet<String> = live.custom_indexes.iter().map(CustomIndex::identity).collect();
        let declared_custom: BTreeSet<String> =
            declared.custom_indexes.iter().map(CustomIndex::identity).collect();

        let live_views: BTreeSet<String> = live.materialized_views.values().map(|v| v.identity()).collect();
        let declared_views: BTreeSet<String> =
            declared.materialized_views.values().map(|v| v.identity()).collect();

        Self {
            added_indexes: declared_indexes
                .difference(&live_indexes)
                .map(|s| (*s).clone())
                .collect(),
            removed_indexes: live_indexes
                .difference(&declared_indexes)
                .map(|s| (*s).clone())
                .collect(),
            added_custom_indexes: declared
                .custom_indexes
                .iter()
                .filter(|index| !live_custom.contains(&index.identity()))
                .cloned()
                .collect(),
            removed_custom_indexes: live
                .custom_indexes
                .iter()
                .filter(|index| !declared_custom.contains(&index.identity()))
                .cloned()
                .collect(),
            added_views: declared
                .materialized_views
                .iter()
                .filter(|(_, view)| !live_views.contains(&view.identity()))
                .map(|(name, _)| name.clone())
                .collect(),
            removed_views: live
                .materialized_views
                .iter()
                .filter(|(_, view)| !declared_views.contains(&view.identity()))
                .map(|(name, _)| name.clone())
                .collect(),
        }
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.added_custom_indexes.is_empty()
            && self.removed_custom_indexes.is_empty()
            && self.added_views.is_empty()
            && self.removed_views.is_empty()
    }
}

/// Complete difference between a live and a declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    /// Key or clustering order differ.
    pub key_changed: bool,
    /// Field changes in processing order.
    pub fields: Vec<FieldDiff>,
    /// Index, custom-index and view changes.
    pub structure: StructuralDiff,
}

impl SchemaDiff {
    /// Computes the diff from `live` to `declared`.
    #[must_use]
    pub fn between(live: &NormalizedSchema, declared: &NormalizedSchema) -> Self {
        Self {
            key_changed: !live.same_key(declared),
            fields: diff_fields(live, declared),
            structure: StructuralDiff::between(live, declared),
        }
    }

    /// Returns true if the schemas are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.key_changed && self.fields.is_empty() && self.structure.is_empty()
    }
}
