//! Stream definitions and the registry mapping stream names to policies.
//!
//! A [`StreamPolicy`] tells the ingestion pipeline where the batches of a
//! stream land and how they are processed. Policies are loaded from a
//! [`DefinitionsSource`] into a [`StreamRegistry`], which can be kept up to
//! date with a [`RegistryWatcher`].
mod definitions;
mod error;
mod name;
mod policy;
mod registry;
mod watcher;

pub use self::definitions::{
    DefinitionsDocument, DefinitionsFormat, DefinitionsSource, FileSource, Fingerprint,
    InlineSource, validate_stream_name,
};
pub use self::error::{ConfigError, PolicyError, Result};
pub use self::name::{TableName, validate_identifier};
pub use self::policy::{
    Compression, CompressionAlgorithm, CompressionConfig, DEFAULT_CHUNK_SIZE,
    DEFAULT_COMPRESSION_LEVEL, PolicyDefaults, StreamConfig, StreamPolicy,
};
pub use self::registry::{ProvisionMode, RegistrySnapshot, StreamRegistry};
pub use self::watcher::{DEFAULT_WATCH_INTERVAL, RegistryWatcher};
