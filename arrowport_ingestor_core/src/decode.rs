//! Decoding of Arrow IPC payloads.
//!
//! A payload is an Arrow IPC stream, optionally compressed with zstd or lz4
//! at the IPC buffer level. Every payload travels with a [`SchemaDescriptor`]
//! describing the columns the sender meant to send. Decoding checks that the
//! payload matches the descriptor and concatenates all the record batches in
//! the stream into a single batch.

use std::{collections::HashSet, io::Cursor, str::FromStr};

use arrow::{
    array::RecordBatch,
    compute::concat_batches,
    datatypes::{DataType, Field, Schema, TimeUnit},
    error::ArrowError,
};
use arrow_ipc::{
    CompressionType,
    reader::StreamReader,
    writer::{IpcWriteOptions, StreamWriter},
};
use arrowport_streams::{Compression, CompressionAlgorithm};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

use crate::batch::DecodedBatch;

/// Prefix of an IPC message carrying an explicit metadata length.
const CONTINUATION_MARKER: [u8; 4] = [0xff; 4];

/// Errors raised while decoding a payload.
///
/// Decoding is deterministic: the same input always yields the same error.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    #[snafu(display("payload is empty"))]
    EmptyPayload,
    #[snafu(display("schema descriptor has no fields"))]
    EmptyDescriptor,
    #[snafu(display("unknown type '{data_type}' for field '{field}'"))]
    UnknownType { field: String, data_type: String },
    #[snafu(display("duplicate column '{column}'"))]
    DuplicateColumn { column: String },
    #[snafu(display("malformed Arrow IPC stream: {message}"))]
    MalformedPayload { message: String },
    #[snafu(display("payload schema does not match descriptor: {message}"))]
    SchemaMismatch { message: String },
    #[snafu(display("field '{field}' is not nullable but contains {null_count} nulls"))]
    UnexpectedNulls { field: String, null_count: usize },
    #[snafu(display("failed to encode batch: {message}"))]
    Encode { message: String },
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

/// Describes the columns of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Either a short alias such as `int64` or `string`, or the display form
    /// of an Arrow data type such as `Timestamp(Millisecond, None)`.
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }

    pub fn to_field(&self) -> Result<Field> {
        let data_type = parse_data_type(&self.data_type).ok_or_else(|| {
            DecodeError::UnknownType {
                field: self.name.clone(),
                data_type: self.data_type.clone(),
            }
        })?;

        Ok(Field::new(&self.name, data_type, self.nullable))
    }
}

impl SchemaDescriptor {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    /// Build a descriptor matching `schema`.
    pub fn from_schema(schema: &Schema) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|field| {
                FieldDescriptor::new(
                    field.name(),
                    data_type_alias(field.data_type()),
                    field.is_nullable(),
                )
            })
            .collect();

        Self { fields }
    }

    /// Convert the descriptor into an Arrow schema.
    pub fn to_schema(&self) -> Result<Schema> {
        ensure!(!self.fields.is_empty(), EmptyDescriptorSnafu);

        let mut seen = HashSet::with_capacity(self.fields.len());
        let fields = self
            .fields
            .iter()
            .map(|field| {
                ensure!(
                    seen.insert(field.name.as_str()),
                    DuplicateColumnSnafu {
                        column: &field.name
                    }
                );
                field.to_field()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Schema::new(fields))
    }
}

/// Decode `payload` and check it against `descriptor`.
pub fn decode(descriptor: &SchemaDescriptor, payload: &[u8]) -> Result<DecodedBatch> {
    ensure!(!payload.is_empty(), EmptyPayloadSnafu);

    let expected = descriptor.to_schema()?;

    check_framing(payload)?;

    let reader = StreamReader::try_new(Cursor::new(payload), None).map_err(malformed)?;
    let schema = reader.schema();

    check_unique_columns(&schema)?;
    check_schema(&expected, &schema)?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(malformed)?;
    let batch = concat_batches(&schema, &batches).map_err(malformed)?;

    check_nulls(&expected, &batch)?;

    Ok(DecodedBatch::new(batch, payload.len()))
}

/// Check a batch received without a descriptor.
///
/// Column names must be unique and the columns `schema` declares
/// non-nullable must not contain nulls.
pub fn validate(schema: &Schema, batch: &RecordBatch) -> Result<()> {
    check_unique_columns(batch.schema_ref())?;
    check_nulls(schema, batch)
}

/// Encode `batch` as an Arrow IPC stream.
pub fn encode(batch: &RecordBatch, compression: Option<Compression>) -> Result<Bytes> {
    let options = IpcWriteOptions::default()
        .try_with_compression(compression.map(|c| match c.algorithm() {
            CompressionAlgorithm::Zstd => CompressionType::ZSTD,
            CompressionAlgorithm::Lz4 => CompressionType::LZ4_FRAME,
        }))
        .map_err(encode_error)?;

    let mut buffer = Vec::new();
    let mut writer = StreamWriter::try_new_with_options(&mut buffer, &batch.schema(), options)
        .map_err(encode_error)?;
    writer.write(batch).map_err(encode_error)?;
    writer.finish().map_err(encode_error)?;
    drop(writer);

    Ok(Bytes::from(buffer))
}

/// Walk the messages of an IPC stream, checking that every metadata and body
/// length fits in the payload.
///
/// The stream reader allocates buffers from these lengths before reading
/// them.
fn check_framing(payload: &[u8]) -> Result<()> {
    let mut offset = 0;

    while offset < payload.len() {
        let (metadata_len, prefix_len) = read_message_prefix(&payload[offset..])?;
        if metadata_len == 0 {
            // End of stream marker.
            return Ok(());
        }

        let metadata_start = offset + prefix_len;
        let metadata_end = metadata_start
            .checked_add(metadata_len)
            .filter(|end| *end <= payload.len())
            .ok_or_else(|| DecodeError::MalformedPayload {
                message: format!(
                    "message at offset {offset} has metadata length {metadata_len}, beyond the end of the payload"
                ),
            })?;

        let message = arrow_ipc::root_as_message(&payload[metadata_start..metadata_end])
            .map_err(|err| DecodeError::MalformedPayload {
                message: format!("invalid message at offset {offset}: {err}"),
            })?;

        let body_len = message.bodyLength();
        offset = usize::try_from(body_len)
            .ok()
            .and_then(|len| metadata_end.checked_add(len))
            .filter(|end| *end <= payload.len())
            .ok_or_else(|| DecodeError::MalformedPayload {
                message: format!(
                    "message at offset {offset} has body length {body_len}, beyond the end of the payload"
                ),
            })?;
    }

    Ok(())
}

/// Returns the metadata length of the message starting `bytes`, and the
/// length of its prefix.
fn read_message_prefix(bytes: &[u8]) -> Result<(usize, usize)> {
    let word = |at: usize| -> Result<[u8; 4]> {
        bytes
            .get(at..at + 4)
            .and_then(|word| word.try_into().ok())
            .ok_or_else(|| DecodeError::MalformedPayload {
                message: "truncated message prefix".to_string(),
            })
    };

    let first = word(0)?;
    let (len, prefix_len) = if first == CONTINUATION_MARKER {
        (i32::from_le_bytes(word(4)?), 8)
    } else {
        // Streams written before the continuation marker was introduced.
        (i32::from_le_bytes(first), 4)
    };

    let len = usize::try_from(len).map_err(|_| DecodeError::MalformedPayload {
        message: format!("negative message length {len}"),
    })?;

    Ok((len, prefix_len))
}

fn check_unique_columns(schema: &Schema) -> Result<()> {
    let mut seen = HashSet::with_capacity(schema.fields().len());
    for field in schema.fields() {
        ensure!(
            seen.insert(field.name().as_str()),
            DuplicateColumnSnafu {
                column: field.name()
            }
        );
    }
    Ok(())
}

fn check_nulls(schema: &Schema, batch: &RecordBatch) -> Result<()> {
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let null_count = column.null_count();
        ensure!(
            field.is_nullable() || null_count == 0,
            UnexpectedNullsSnafu {
                field: field.name(),
                null_count,
            }
        );
    }
    Ok(())
}

fn check_schema(expected: &Schema, actual: &Schema) -> Result<()> {
    let expected_fields = expected.fields();
    let actual_fields = actual.fields();

    ensure!(
        expected_fields.len() == actual_fields.len(),
        SchemaMismatchSnafu {
            message: format!(
                "expected {} fields, got {}",
                expected_fields.len(),
                actual_fields.len()
            ),
        }
    );

    for (index, (expected, actual)) in expected_fields.iter().zip(actual_fields).enumerate() {
        ensure!(
            expected.name() == actual.name(),
            SchemaMismatchSnafu {
                message: format!(
                    "field {index} should be named '{}', got '{}'",
                    expected.name(),
                    actual.name()
                ),
            }
        );
        ensure!(
            expected.data_type() == actual.data_type(),
            SchemaMismatchSnafu {
                message: format!(
                    "field '{}' should have type {}, got {}",
                    expected.name(),
                    expected.data_type(),
                    actual.data_type()
                ),
            }
        );
    }

    Ok(())
}

fn malformed(error: ArrowError) -> DecodeError {
    DecodeError::MalformedPayload {
        message: error.to_string(),
    }
}

fn parse_data_type(name: &str) -> Option<DataType> {
    let data_type = match name.to_ascii_lowercase().as_str() {
        "int" | "int64" => DataType::Int64,
        "int32" => DataType::Int32,
        "float" | "double" | "float64" => DataType::Float64,
        "float32" => DataType::Float32,
        "string" | "utf8" => DataType::Utf8,
        "bool" | "boolean" => DataType::Boolean,
        "date32" => DataType::Date32,
        "timestamp" => DataType::Timestamp(TimeUnit::Microsecond, None),
        "binary" => DataType::Binary,
        _ => return DataType::from_str(name).ok(),
    };

    Some(data_type)
}

fn data_type_alias(data_type: &DataType) -> String {
    let alias = match data_type {
        DataType::Int64 => "int64",
        DataType::Int32 => "int32",
        DataType::Float64 => "float64",
        DataType::Float32 => "float32",
        DataType::Utf8 => "string",
        DataType::Boolean => "bool",
        DataType::Date32 => "date32",
        DataType::Timestamp(TimeUnit::Microsecond, None) => "timestamp",
        DataType::Binary => "binary",
        other => return other.to_string(),
    };

    alias.to_string()
}

fn encode_error(error: ArrowError) -> DecodeError {
    DecodeError::Encode {
        message: error.to_string(),
    }
}
