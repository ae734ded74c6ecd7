use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use arrow::{
    array::{RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema},
};
use arrowport_ingestor_core::{
    DecodedBatch, IngestionCoordinator, IngestionMetricsSink, IngestionRecord, SchemaDescriptor,
    decode, encode, test_utils::events_batch,
};
use arrowport_store::{
    InMemoryDuckDbFactory, StoreConnection, StoreFactory, StoreGateway, TableDescription,
};
use arrowport_streams::{InlineSource, PolicyDefaults, ProvisionMode, StreamRegistry};
use parking_lot::Mutex;

/// Metrics sink that keeps every record.
#[derive(Default)]
pub struct RecordingMetrics {
    records: Mutex<Vec<IngestionRecord>>,
}

impl RecordingMetrics {
    pub fn records(&self) -> Vec<IngestionRecord> {
        self.records.lock().clone()
    }
}

impl IngestionMetricsSink for RecordingMetrics {
    fn record(&self, record: &IngestionRecord) {
        self.records.lock().push(record.clone());
    }
}

/// In-memory store factory that counts the transactions begun on its
/// connections.
#[derive(Default)]
pub struct CountingStoreFactory {
    inner: InMemoryDuckDbFactory,
    begins: Arc<AtomicUsize>,
}

struct CountingConnection {
    inner: Box<dyn StoreConnection>,
    begins: Arc<AtomicUsize>,
}

impl CountingStoreFactory {
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StoreFactory for CountingStoreFactory {
    async fn connect(&self) -> arrowport_store::Result<Box<dyn StoreConnection>> {
        let inner = self.inner.connect().await?;
        Ok(Box::new(CountingConnection {
            inner,
            begins: self.begins.clone(),
        }))
    }
}

impl StoreConnection for CountingConnection {
    fn execute(&mut self, sql: &str) -> arrowport_store::Result<()> {
        self.inner.execute(sql)
    }

    fn register_source(&mut self, name: &str, batch: RecordBatch) -> arrowport_store::Result<()> {
        self.inner.register_source(name, batch)
    }

    fn unregister_source(&mut self, name: &str) -> arrowport_store::Result<()> {
        self.inner.unregister_source(name)
    }

    fn begin(&mut self) -> arrowport_store::Result<()> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin()
    }

    fn commit(&mut self) -> arrowport_store::Result<()> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> arrowport_store::Result<()> {
        self.inner.rollback()
    }

    fn describe_table(&mut self, name: &str) -> arrowport_store::Result<Option<TableDescription>> {
        self.inner.describe_table(name)
    }
}

pub struct TestHarness {
    pub coordinator: IngestionCoordinator,
    pub metrics: Arc<RecordingMetrics>,
    pub factory: Arc<CountingStoreFactory>,
}

impl TestHarness {
    pub async fn count_rows(&self, table: &str) -> Option<u64> {
        self.coordinator
            .gateway()
            .describe_table(table)
            .await
            .expect("describe_table")
            .map(|description| description.num_rows)
    }
}

/// A coordinator over an in-memory store with the `events` stream
/// configured with the given chunk size.
pub fn create_harness(chunk_size: usize) -> TestHarness {
    let registry = StreamRegistry::from_source(
        &InlineSource::new(format!(
            r#"{{"streams": {{
                "events": {{"target_table": "events", "chunk_size": {chunk_size}}},
                "zstd_events": {{
                    "target_table": "analytics.events",
                    "compression": {{"algorithm": "zstd", "level": 3}}
                }}
            }}}}"#
        )),
        ProvisionMode::Strict,
        PolicyDefaults::default(),
    );

    let factory = Arc::new(CountingStoreFactory::default());
    let gateway = Arc::new(StoreGateway::new(factory.clone()));
    let metrics = Arc::new(RecordingMetrics::default());
    let coordinator = IngestionCoordinator::new(registry, gateway).with_metrics(metrics.clone());

    TestHarness {
        coordinator,
        metrics,
        factory,
    }
}

/// Encode and decode a batch of events, as a transport adapter would.
pub fn decoded_events(first_id: i64, num_rows: usize) -> DecodedBatch {
    let batch = events_batch(first_id, num_rows);
    let payload = encode(&batch, None).expect("encode");
    decode(&SchemaDescriptor::from_schema(&batch.schema()), &payload).expect("decode")
}

/// A batch that cannot be inserted into the events table.
pub fn incompatible_batch() -> DecodedBatch {
    let schema = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
    let batch = RecordBatch::try_new(
        Arc::new(schema),
        vec![Arc::new(StringArray::from(vec!["not-a-number"]))],
    )
    .expect("failed to create batch");
    DecodedBatch::from(batch)
}
