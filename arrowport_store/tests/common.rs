use std::sync::Arc;

use arrow::{
    array::{Float64Array, Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema},
};
use arrowport_store::{StoreGateway, TemporaryDuckDbFactory};

pub fn create_gateway() -> (StoreGateway, Arc<TemporaryDuckDbFactory>) {
    let factory: Arc<_> = TemporaryDuckDbFactory::new()
        .expect("temporary store factory")
        .into();
    let gateway = StoreGateway::new(factory.clone());
    (gateway, factory)
}

pub fn events_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("value", DataType::Float64, true),
    ])
}

/// A batch of `num_rows` events with ids starting at `first_id`.
pub fn events_batch(first_id: i64, num_rows: usize) -> RecordBatch {
    let ids: Vec<i64> = (first_id..first_id + num_rows as i64).collect();
    let names: Vec<String> = ids.iter().map(|id| format!("event-{id}")).collect();
    let values: Vec<f64> = ids.iter().map(|id| *id as f64 * 1.5).collect();

    RecordBatch::try_new(
        Arc::new(events_schema()),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(names)),
            Arc::new(Float64Array::from(values)),
        ],
    )
    .expect("failed to create batch")
}

/// A batch whose columns don't match the events table.
pub fn incompatible_batch() -> RecordBatch {
    let schema = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(StringArray::from(vec!["not-a-number"]))],
    )
    .expect("failed to create batch")
}

pub async fn count_rows(gateway: &StoreGateway, table: &str) -> Option<u64> {
    gateway
        .describe_table(table)
        .await
        .expect("describe_table")
        .map(|description| description.num_rows)
}
