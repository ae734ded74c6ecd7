use std::path::PathBuf;

use snafu::Snafu;

/// Errors raised while constructing a stream policy.
///
/// Policies are validated when they are built, so a policy that exists is
/// always usable.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum PolicyError {
    #[snafu(display(
        "invalid target table '{name}': must start with a letter or underscore and contain only letters, digits and underscores"
    ))]
    InvalidTargetTable { name: String },
    #[snafu(display("invalid chunk size {chunk_size}: must be a positive integer"))]
    InvalidChunkSize { chunk_size: u64 },
    #[snafu(display("compression algorithm must be either 'zstd' or 'lz4', got '{algorithm}'"))]
    UnsupportedAlgorithm { algorithm: String },
    #[snafu(display(
        "{algorithm} compression level must be between {min} and {max}, got {level}"
    ))]
    LevelOutOfRange {
        algorithm: &'static str,
        level: i64,
        min: u32,
        max: u32,
    },
}

/// Errors raised while loading stream definitions.
///
/// The registry never raises these to readers: a failed load leaves the
/// previous definitions in place.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to read stream definitions from {}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse stream definitions from {origin}"))]
    Parse {
        origin: String,
        source: serde_json::Error,
    },
    #[snafu(display("failed to parse YAML stream definitions from {origin}"))]
    ParseYaml {
        origin: String,
        source: serde_yaml::Error,
    },
    #[snafu(display("invalid definition for stream '{stream}'"))]
    InvalidStream { stream: String, source: PolicyError },
    #[snafu(display("invalid stream name '{stream}'"))]
    InvalidStreamName { stream: String },
}

pub type Result<T, E = ConfigError> = ::std::result::Result<T, E>;

impl ConfigError {
    pub fn is_io(&self) -> bool {
        matches!(self, ConfigError::Io { .. })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, ConfigError::Parse { .. } | ConfigError::ParseYaml { .. })
    }

    pub fn is_invalid_stream(&self) -> bool {
        matches!(self, ConfigError::InvalidStream { .. })
    }
}
