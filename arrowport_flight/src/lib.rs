//! Arrow Flight adapter for the ingestion pipeline.
//!
//! Clients stream the chunks of a stream with `DoPut`, see the
//! [`ingestion`] module for the protocol.
mod command;
mod error;
pub mod ingestion;
mod server;

pub use self::command::{StreamCommand, decode_put_metadata, encode_put_metadata};
pub use self::error::FlightServerError;
pub use self::server::ArrowportFlightServer;
