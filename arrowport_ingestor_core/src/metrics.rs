use arrowport_observability::{Counter, KeyValue};

/// Data recorded after a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionRecord {
    pub stream: String,
    pub destination: String,
    /// Compression algorithm of the stream's policy, or `none`.
    pub compression: &'static str,
    pub rows: u64,
    pub bytes: u64,
}

/// Receives the metrics of committed ingestions.
///
/// Sinks are only called after the data is committed to the store.
pub trait IngestionMetricsSink: Send + Sync {
    fn record(&self, record: &IngestionRecord);
}

/// OpenTelemetry counters for ingested rows and bytes.
pub struct IngestionMetrics {
    pub ingested_rows: Counter<u64>,
    pub ingested_bytes: Counter<u64>,
}

impl Default for IngestionMetrics {
    fn default() -> Self {
        let meter = arrowport_observability::meter("ingestion");
        Self {
            ingested_rows: meter
                .u64_counter("arrowport.ingest.rows")
                .with_unit("{row}")
                .with_description("number of rows ingested into destination tables")
                .build(),
            ingested_bytes: meter
                .u64_counter("arrowport.ingest.bytes")
                .with_unit("By")
                .with_description("encoded bytes ingested into destination tables")
                .build(),
        }
    }
}

impl IngestionMetricsSink for IngestionMetrics {
    fn record(&self, record: &IngestionRecord) {
        self.ingested_rows.add(
            record.rows,
            &[
                KeyValue::new("stream", record.stream.clone()),
                KeyValue::new("destination", record.destination.clone()),
            ],
        );
        self.ingested_bytes.add(
            record.bytes,
            &[
                KeyValue::new("stream", record.stream.clone()),
                KeyValue::new("compression", record.compression),
            ],
        );
    }
}
