use std::{fmt, num::NonZeroUsize, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::PolicyError, name::TableName};

/// Default number of rows applied to the store per statement.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

const NON_ZERO_DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CHUNK_SIZE) {
    Some(chunk_size) => chunk_size,
    None => panic!("default chunk size must be positive"),
};

/// Default compression level, valid for both algorithms.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 3;

/// Compression algorithms accepted for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    Zstd,
    Lz4,
}

/// A validated compression setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Compression {
    algorithm: CompressionAlgorithm,
    level: u32,
}

/// Process-wide defaults used to fill in missing policy fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDefaults {
    pub chunk_size: NonZeroUsize,
    pub compression: Option<Compression>,
}

/// How a stream's batches are processed and where they land.
///
/// A policy is immutable: reloading the registry replaces whole policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPolicy {
    target_table: TableName,
    chunk_size: NonZeroUsize,
    compression: Option<Compression>,
}

/// Serialized form of a stream policy, as found in definition documents and
/// in request bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Target table name in the store.
    pub target_table: String,
    /// Maximum number of rows applied to the store per statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    /// Compression settings. Defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub algorithm: String,
    pub level: i64,
}

impl CompressionAlgorithm {
    /// The accepted compression levels for this algorithm.
    pub fn level_range(self) -> RangeInclusive<u32> {
        match self {
            CompressionAlgorithm::Zstd => 1..=9,
            CompressionAlgorithm::Lz4 => 1..=12,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            _ => Err(PolicyError::UnsupportedAlgorithm {
                algorithm: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Compression {
    /// Create a compression setting, checking the level against the
    /// algorithm's range.
    pub fn new(algorithm: CompressionAlgorithm, level: i64) -> Result<Self, PolicyError> {
        let range = algorithm.level_range();
        let in_range = u32::try_from(level)
            .map(|level| range.contains(&level))
            .unwrap_or(false);

        if !in_range {
            return Err(PolicyError::LevelOutOfRange {
                algorithm: algorithm.as_str(),
                level,
                min: *range.start(),
                max: *range.end(),
            });
        }

        Ok(Self {
            algorithm,
            level: level as u32,
        })
    }

    /// Parse a compression setting from its textual algorithm name.
    pub fn parse(algorithm: &str, level: i64) -> Result<Self, PolicyError> {
        let algorithm = algorithm.parse::<CompressionAlgorithm>()?;
        Self::new(algorithm, level)
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (level {})", self.algorithm, self.level)
    }
}

impl PolicyDefaults {
    pub fn new(chunk_size: NonZeroUsize, compression: Option<Compression>) -> Self {
        Self {
            chunk_size,
            compression,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_compression(mut self, compression: Option<Compression>) -> Self {
        self.compression = compression;
        self
    }
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            chunk_size: NON_ZERO_DEFAULT_CHUNK_SIZE,
            compression: Some(Compression {
                algorithm: CompressionAlgorithm::Zstd,
                level: DEFAULT_COMPRESSION_LEVEL,
            }),
        }
    }
}

impl StreamPolicy {
    /// Create a new policy. A chunk size of zero is rejected.
    pub fn new(
        target_table: TableName,
        chunk_size: usize,
        compression: Option<Compression>,
    ) -> Result<Self, PolicyError> {
        let chunk_size = NonZeroUsize::new(chunk_size).ok_or(PolicyError::InvalidChunkSize {
            chunk_size: chunk_size as u64,
        })?;

        Ok(Self {
            target_table,
            chunk_size,
            compression,
        })
    }

    /// Create a policy for `target_table` using the process defaults for
    /// everything else.
    pub fn with_defaults(target_table: TableName, defaults: &PolicyDefaults) -> Self {
        Self {
            target_table,
            chunk_size: defaults.chunk_size,
            compression: defaults.compression,
        }
    }

    pub fn target_table(&self) -> &TableName {
        &self.target_table
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// The compression algorithm name, or `none`. Used as a metric attribute.
    pub fn compression_label(&self) -> &'static str {
        self.compression
            .map(|c| c.algorithm().as_str())
            .unwrap_or("none")
    }
}

impl StreamConfig {
    pub fn new(target_table: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            chunk_size: None,
            compression: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_compression(mut self, algorithm: impl Into<String>, level: i64) -> Self {
        self.compression = Some(CompressionConfig {
            algorithm: algorithm.into(),
            level,
        });
        self
    }

    /// Validate the configuration and turn it into a policy.
    pub fn into_policy(self, defaults: &PolicyDefaults) -> Result<StreamPolicy, PolicyError> {
        let target_table = TableName::new(&self.target_table)?;

        let chunk_size = match self.chunk_size {
            None => defaults.chunk_size.get(),
            Some(chunk_size) => usize::try_from(chunk_size)
                .ok()
                .filter(|size| *size > 0)
                .ok_or(PolicyError::InvalidChunkSize { chunk_size })?,
        };

        let compression = match self.compression {
            None => defaults.compression,
            Some(CompressionConfig { algorithm, level }) => {
                Some(Compression::parse(&algorithm, level)?)
            }
        };

        StreamPolicy::new(target_table, chunk_size, compression)
    }
}

impl From<&StreamPolicy> for StreamConfig {
    fn from(policy: &StreamPolicy) -> Self {
        Self {
            target_table: policy.target_table.to_string(),
            chunk_size: Some(policy.chunk_size() as u64),
            compression: policy.compression.map(|c| CompressionConfig {
                algorithm: c.algorithm().as_str().to_string(),
                level: c.level() as i64,
            }),
        }
    }
}
