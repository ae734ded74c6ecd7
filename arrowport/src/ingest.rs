use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use arrow::{array::RecordBatch, compute::concat_batches, datatypes::SchemaRef};
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_ipc::{
    CompressionType,
    reader::{FileReader, StreamReader},
    writer::IpcWriteOptions,
};
use arrowport_flight::{StreamCommand, decode_put_metadata};
use arrowport_ingestor_core::{IngestionResult, SchemaDescriptor, encode};
use arrowport_ingestor_http::{BatchPayload, IngestRequest};
use arrowport_streams::{
    Compression, CompressionAlgorithm, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL, StreamConfig,
};
use base64::{Engine, prelude::BASE64_STANDARD};
use clap::{Args, ValueEnum};
use futures::TryStreamExt;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{
        ArrowSnafu, EncodeSnafu, FlightResponseSnafu, FlightSnafu, HttpClientSnafu,
        InvalidArgumentSnafu, IoSnafu, PolicySnafu, ResponseSnafu, Result,
    },
    remote::RemoteArgs,
};

/// Magic bytes at the start of an Arrow IPC file.
const ARROW_FILE_MAGIC: &[u8] = b"ARROW1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// One request with the whole file
    Http,
    /// A `DoPut` stream, one message per chunk
    Flight,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// The stream to ingest into
    stream: String,
    /// Arrow IPC file, in either the file or the stream format
    file: PathBuf,
    #[arg(long, value_enum, default_value_t = Transport::Http)]
    transport: Transport,
    /// Load into this table instead of the stream's configured one (HTTP
    /// only)
    #[arg(long)]
    target_table: Option<String>,
    /// Rows per chunk sent over Flight
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_rows: usize,
    /// Compress the payload with zstd or lz4
    #[arg(long)]
    compression: Option<String>,
    #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL as i64)]
    compression_level: i64,
    #[clap(flatten)]
    remote: RemoteArgs,
}

impl IngestArgs {
    pub async fn run(self, _ct: CancellationToken) -> Result<()> {
        let compression = self
            .compression
            .as_deref()
            .map(|algorithm| Compression::parse(algorithm, self.compression_level))
            .transpose()
            .context(PolicySnafu {})?;

        let (schema, batches) = read_batches(&self.file)?;
        let num_rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>();

        println!(
            "Sending {} rows from {} to stream {}",
            num_rows,
            self.file.display(),
            self.stream
        );

        let result = match self.transport {
            Transport::Http => self.send_http(schema, batches, compression).await?,
            Transport::Flight => self.send_flight(schema, batches, compression).await?,
        };

        println!(
            "{:?}: {} rows processed{}",
            result.status,
            result.rows_processed,
            result
                .message
                .map(|message| format!(" ({message})"))
                .unwrap_or_default()
        );

        Ok(())
    }

    async fn send_http(
        &self,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        compression: Option<Compression>,
    ) -> Result<IngestionResult> {
        let batch = concat_batches(&schema, &batches).context(ArrowSnafu {})?;
        let data = encode(&batch, compression).context(EncodeSnafu {})?;

        let request = IngestRequest {
            config: self.target_table.as_ref().map(StreamConfig::new),
            batch: BatchPayload {
                schema: SchemaDescriptor::from_schema(&schema),
                data: BASE64_STANDARD.encode(&data),
            },
        };

        let response = self
            .remote
            .http_client()
            .post(self.remote.http_endpoint(&format!("stream/{}", self.stream)))
            .json(&request)
            .send()
            .await
            .context(HttpClientSnafu {})?;

        let status = response.status();
        let result: IngestionResult = response.json().await.context(HttpClientSnafu {})?;

        if !status.is_success() {
            return ResponseSnafu {
                status: status.as_u16(),
                message: result.message.unwrap_or_default(),
            }
            .fail();
        }

        Ok(result)
    }

    async fn send_flight(
        &self,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
        compression: Option<Compression>,
    ) -> Result<IngestionResult> {
        if self.target_table.is_some() {
            return InvalidArgumentSnafu {
                name: "target-table",
                message: "only supported with the http transport",
            }
            .fail();
        }

        if self.chunk_rows == 0 {
            return InvalidArgumentSnafu {
                name: "chunk-rows",
                message: "must be positive",
            }
            .fail();
        }

        let descriptor = StreamCommand::new(&self.stream)
            .into_descriptor()
            .context(FlightResponseSnafu {})?;

        let options = IpcWriteOptions::default()
            .try_with_compression(compression.map(compression_type))
            .context(ArrowSnafu {})?;

        let chunks = batches
            .iter()
            .flat_map(|batch| slice_batch(batch, self.chunk_rows))
            .map(Ok)
            .collect::<Vec<_>>();

        let input = FlightDataEncoderBuilder::new()
            .with_options(options)
            .with_schema(schema)
            .with_flight_descriptor(Some(descriptor))
            .build(futures::stream::iter(chunks));

        let mut client = self.remote.flight_client().await?;
        let results: Vec<_> = client
            .do_put(input)
            .await
            .context(FlightSnafu {})?
            .try_collect()
            .await
            .context(FlightSnafu {})?;

        let Some(put_result) = results.first() else {
            return InvalidArgumentSnafu {
                name: "response",
                message: "the server sent no result",
            }
            .fail();
        };

        decode_put_metadata(&put_result.app_metadata).context(FlightResponseSnafu {})
    }
}

/// Read every batch of an Arrow IPC file or stream.
fn read_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let data = std::fs::read(path).context(IoSnafu {})?;

    if data.starts_with(ARROW_FILE_MAGIC) {
        let reader = FileReader::try_new(Cursor::new(data), None).context(ArrowSnafu {})?;
        let schema = reader.schema();
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .context(ArrowSnafu {})?;
        Ok((schema, batches))
    } else {
        let reader = StreamReader::try_new(Cursor::new(data), None).context(ArrowSnafu {})?;
        let schema = reader.schema();
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .context(ArrowSnafu {})?;
        Ok((schema, batches))
    }
}

fn slice_batch(batch: &RecordBatch, chunk_rows: usize) -> Vec<RecordBatch> {
    (0..batch.num_rows())
        .step_by(chunk_rows)
        .map(|offset| batch.slice(offset, chunk_rows.min(batch.num_rows() - offset)))
        .collect()
}

fn compression_type(compression: Compression) -> CompressionType {
    match compression.algorithm() {
        CompressionAlgorithm::Zstd => CompressionType::ZSTD,
        CompressionAlgorithm::Lz4 => CompressionType::LZ4_FRAME,
    }
}
