use std::sync::Arc;

use arrow::{
    array::{Float64Array, Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
};

use crate::decode::{FieldDescriptor, SchemaDescriptor};

/// Returns the schema of the `events` test stream.
pub fn events_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("value", DataType::Float64, true),
    ]))
}

pub fn events_descriptor() -> SchemaDescriptor {
    SchemaDescriptor::new(vec![
        FieldDescriptor::new("id", "int64", false),
        FieldDescriptor::new("name", "string", true),
        FieldDescriptor::new("value", "float64", true),
    ])
}

/// Generate `num_rows` events with ids starting at `first_id`.
pub fn events_batch(first_id: i64, num_rows: usize) -> RecordBatch {
    let ids: Vec<i64> = (first_id..first_id + num_rows as i64).collect();
    let names: Vec<String> = ids.iter().map(|id| format!("event-{id}")).collect();
    let values: Vec<f64> = ids.iter().map(|id| *id as f64 / 2.0).collect();

    RecordBatch::try_new(
        events_schema(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(names)),
            Arc::new(Float64Array::from(values)),
        ],
    )
    .expect("Failed to create test batch")
}
