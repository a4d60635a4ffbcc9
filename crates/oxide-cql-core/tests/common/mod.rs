#![allow(dead_code)]

use oxide_cql_core::{
    ClusteringOrder, CustomIndex, FieldSpec, KeySpec, MaterializedViewSpec, SchemaDescription,
};
use serde_json::{Map, Value};

pub const USER_ID: &str = "0b6d9a2e-5f0c-4c1d-9d8e-3f1c2b4a5d6e";

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("Expected a JSON object, got {other}"),
    }
}

pub fn users() -> SchemaDescription {
    SchemaDescription::new()
        .field(FieldSpec::new("id", "uuid"))
        .field(FieldSpec::new("name", "text"))
        .field(FieldSpec::new("age", "int"))
        .field(FieldSpec::new("tags", "set").type_def("<text>"))
        .field(FieldSpec::new("attrs", "map").type_def("<text,text>"))
        .field(FieldSpec::new("history", "list").type_def("<text>"))
        .key(KeySpec::new(["id"]))
}

pub fn timeline() -> SchemaDescription {
    SchemaDescription::new()
        .field(FieldSpec::new("user_id", "uuid"))
        .field(FieldSpec::new("bucket", "int"))
        .field(FieldSpec::new("posted", "timestamp"))
        .field(FieldSpec::new("author", "text").static_column())
        .field(FieldSpec::new("body", "text"))
        .field(FieldSpec::new("likes", "map").type_def("<text,int>"))
        .key(KeySpec::new(["user_id", "bucket"]).clustering("posted"))
        .order("posted", ClusteringOrder::Desc)
        .index("keys(likes)")
        .custom_index(
            CustomIndex::new("body", "org.apache.cassandra.index.sasi.SASIIndex")
                .option("mode", "CONTAINS"),
        )
        .materialized_view(
            "timeline_by_body",
            MaterializedViewSpec::new(["*"], KeySpec::new(["body"]).clustering("user_id").clustering("bucket").clustering("posted")),
        )
}
