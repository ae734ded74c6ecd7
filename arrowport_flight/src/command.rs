use arrow_flight::{FlightDescriptor, flight_descriptor::DescriptorType};
use arrowport_ingestor_core::IngestionResult;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::error::{
    DecodeCommandSnafu, EncodeMetadataSnafu, FlightServerError, InvalidDescriptorSnafu,
};

/// The command carried by the `FlightDescriptor` of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCommand {
    pub stream_name: String,
}

impl StreamCommand {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
        }
    }

    /// Extract the stream name from a descriptor.
    ///
    /// `CMD` descriptors carry a JSON encoded [`StreamCommand`], `PATH`
    /// descriptors a single element with the stream name.
    pub fn try_from_descriptor(descriptor: &FlightDescriptor) -> Result<Self, FlightServerError> {
        match descriptor.r#type() {
            DescriptorType::Cmd => {
                serde_json::from_slice(&descriptor.cmd).context(DecodeCommandSnafu)
            }
            DescriptorType::Path => match descriptor.path.as_slice() {
                [stream_name] => Ok(Self::new(stream_name)),
                _ => InvalidDescriptorSnafu {
                    message: format!(
                        "path must contain exactly one element, got {}",
                        descriptor.path.len()
                    ),
                }
                .fail(),
            },
            DescriptorType::Unknown => InvalidDescriptorSnafu {
                message: "unknown descriptor type",
            }
            .fail(),
        }
    }

    pub fn into_descriptor(self) -> Result<FlightDescriptor, FlightServerError> {
        let cmd = serde_json::to_vec(&self).context(EncodeMetadataSnafu)?;
        Ok(FlightDescriptor::new_cmd(cmd))
    }
}

/// Encode the result sent back in `PutResult.app_metadata`.
pub fn encode_put_metadata(result: &IngestionResult) -> Result<Bytes, FlightServerError> {
    let metadata = serde_json::to_vec(result).context(EncodeMetadataSnafu)?;
    Ok(metadata.into())
}

pub fn decode_put_metadata(metadata: &[u8]) -> Result<IngestionResult, FlightServerError> {
    serde_json::from_slice(metadata).context(DecodeCommandSnafu)
}
