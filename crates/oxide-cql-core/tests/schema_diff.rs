//! Integration tests for schema loading, definition statements and diffing.

mod common;

use common::timeline;
use oxide_cql_core::{
    ddl, DiffKind, NormalizedSchema, SchemaDescription, SchemaDiff,
};
use serde_json::json;

#[test]
fn users_table_definition() {
    let schema = SchemaDescription::from_json(&json!({
        "fields": {"id": "uuid", "name": "text"},
        "key": [["id"]]
    }))
    .unwrap();
    assert_eq!(
        ddl::create_table("users", &schema),
        "CREATE TABLE IF NOT EXISTS \"users\" (\"id\" uuid , \"name\" text , PRIMARY KEY((\"id\")));"
    );
}

#[test]
fn timeline_definitions() {
    let schema = timeline();
    schema.validate().unwrap();
    assert_eq!(
        ddl::create_table("timeline", &schema),
        "CREATE TABLE IF NOT EXISTS \"timeline\" (\"user_id\" uuid , \"bucket\" int , \"posted\" timestamp , \
         \"author\" text STATIC , \"body\" text , \"likes\" map<text,int> , \
         PRIMARY KEY((\"user_id\",\"bucket\"),\"posted\")) WITH CLUSTERING ORDER BY (\"posted\" DESC);"
    );
    assert_eq!(
        ddl::create_index("timeline", &schema.indexes[0]),
        "CREATE INDEX IF NOT EXISTS ON \"timeline\" (keys(\"likes\"));"
    );
    assert_eq!(
        ddl::create_materialized_view("timeline", "timeline_by_body", &schema.materialized_views["timeline_by_body"]),
        "CREATE MATERIALIZED VIEW IF NOT EXISTS \"timeline_by_body\" AS SELECT * FROM \"timeline\" \
         WHERE \"body\" IS NOT NULL AND \"user_id\" IS NOT NULL AND \"bucket\" IS NOT NULL AND \"posted\" IS NOT NULL \
         PRIMARY KEY((\"body\"),\"user_id\",\"bucket\",\"posted\");"
    );
}

#[test]
fn json_and_builder_schemas_normalize_equal() {
    let from_json = SchemaDescription::from_json(&json!({
        "fields": {
            "body": "text",
            "likes": {"type": "map", "typeDef": "<text, int>"},
            "posted": "timestamp",
            "author": {"type": "text", "static": true},
            "bucket": "int",
            "user_id": "uuid"
        },
        "key": [["user_id", "bucket"], "posted"],
        "clustering_order": {"posted": "DESC"},
        "indexes": ["KEYS(likes)"],
        "custom_indexes": [{"on": "body", "using": "org.apache.cassandra.index.sasi.SASIIndex", "options": {"mode": "CONTAINS"}}],
        "materialized_views": {
            "timeline_by_body": {
                "select": ["body", "likes", "posted", "author", "bucket", "user_id"],
                "key": ["body", "user_id", "bucket", "posted"]
            }
        }
    }))
    .unwrap();

    let left = NormalizedSchema::from_schema(&from_json).unwrap();
    let right = NormalizedSchema::from_schema(&timeline()).unwrap();
    assert_eq!(left, right);
    assert!(SchemaDiff::between(&left, &right).is_empty());
}

#[test]
fn diff_reports_key_and_field_changes() {
    let live = NormalizedSchema::from_schema(&timeline()).unwrap();
    let mut changed = timeline();
    changed.clustering_order.clear();
    changed.fields.retain(|f| f.name != "author");
    let declared = NormalizedSchema::from_schema(&changed).unwrap();

    let diff = SchemaDiff::between(&live, &declared);
    assert!(diff.key_changed);
    assert_eq!(diff.fields.len(), 1);
    assert_eq!(diff.fields[0].kind(), DiffKind::Deleted);
    assert_eq!(diff.fields[0].field, "author");
}
