//! Stream definition documents.
//!
//! A definitions document maps stream names to their configuration. It's
//! written in JSON:
//!
//! ```json
//! {
//!   "streams": {
//!     "events": {
//!       "target_table": "events",
//!       "chunk_size": 1000,
//!       "compression": { "algorithm": "zstd", "level": 3 }
//!     }
//!   }
//! }
//! ```
//!
//! or in YAML:
//!
//! ```yaml
//! streams:
//!   events:
//!     target_table: events
//!     chunk_size: 1000
//!     compression:
//!       algorithm: zstd
//!       level: 3
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::{
    error::{
        InvalidStreamNameSnafu, InvalidStreamSnafu, IoSnafu, ParseSnafu, ParseYamlSnafu, Result,
    },
    name::validate_identifier,
    policy::{PolicyDefaults, StreamConfig, StreamPolicy},
};

/// The on-disk shape of a definitions document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionsDocument {
    #[serde(default)]
    pub streams: BTreeMap<String, StreamConfig>,
}

/// Syntax of a definitions document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DefinitionsFormat {
    #[default]
    Json,
    Yaml,
}

impl DefinitionsFormat {
    /// The format of a file, from its extension. Files that don't end in
    /// `.yaml` or `.yml` are read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DefinitionsFormat::Yaml
            }
            _ => DefinitionsFormat::Json,
        }
    }
}

/// Identifies a version of a definitions source.
///
/// The watcher reloads the registry whenever the fingerprint changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

/// Where stream definitions come from.
pub trait DefinitionsSource: Send + Sync + std::fmt::Debug {
    /// Human readable description of the source, used in logs and errors.
    fn origin(&self) -> String;

    /// Read the raw document text.
    fn read(&self) -> Result<String>;

    fn format(&self) -> DefinitionsFormat {
        DefinitionsFormat::Json
    }

    /// The current fingerprint of the source, if it can change over time.
    fn fingerprint(&self) -> Result<Option<Fingerprint>> {
        Ok(None)
    }
}

/// Definitions stored in a JSON or YAML file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

/// Definitions held in memory.
#[derive(Debug, Clone)]
pub struct InlineSource {
    text: String,
    format: DefinitionsFormat,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DefinitionsSource for FileSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).context(IoSnafu {
            path: self.path.clone(),
        })
    }

    fn format(&self) -> DefinitionsFormat {
        DefinitionsFormat::from_path(&self.path)
    }

    fn fingerprint(&self) -> Result<Option<Fingerprint>> {
        let metadata = fs::metadata(&self.path).context(IoSnafu {
            path: self.path.clone(),
        })?;

        Ok(Some(Fingerprint {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }))
    }
}

impl InlineSource {
    /// A JSON document.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: DefinitionsFormat::Json,
        }
    }

    pub fn with_format(mut self, format: DefinitionsFormat) -> Self {
        self.format = format;
        self
    }
}

impl DefinitionsSource for InlineSource {
    fn origin(&self) -> String {
        "inline definitions".to_string()
    }

    fn read(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    fn format(&self) -> DefinitionsFormat {
        self.format
    }
}

impl DefinitionsDocument {
    /// Parse a document from its text.
    pub fn parse(text: &str, format: DefinitionsFormat, origin: &str) -> Result<Self> {
        match format {
            DefinitionsFormat::Json => serde_json::from_str(text).context(ParseSnafu { origin }),
            // An empty YAML file is an empty document.
            DefinitionsFormat::Yaml if text.trim().is_empty() => Ok(Self::default()),
            DefinitionsFormat::Yaml => {
                serde_yaml::from_str(text).context(ParseYamlSnafu { origin })
            }
        }
    }

    /// Read and parse the document held by `source`.
    pub fn load(source: &dyn DefinitionsSource) -> Result<Self> {
        let text = source.read()?;
        Self::parse(&text, source.format(), &source.origin())
    }

    /// Validate every stream and build its policy.
    ///
    /// Fails on the first invalid stream, so either all policies are built or
    /// none are.
    pub fn into_policies(
        self,
        defaults: &PolicyDefaults,
    ) -> Result<HashMap<String, Arc<StreamPolicy>>> {
        let mut policies = HashMap::with_capacity(self.streams.len());

        for (stream, config) in self.streams {
            ensure!(
                validate_stream_name(&stream),
                InvalidStreamNameSnafu { stream }
            );

            let policy = config
                .into_policy(defaults)
                .context(InvalidStreamSnafu { stream: &stream })?;

            policies.insert(stream, Arc::new(policy));
        }

        Ok(policies)
    }
}

/// Stream names follow the same rules as table identifiers, and may also
/// contain dashes after the first character.
pub fn validate_stream_name(name: &str) -> bool {
    match name.split_at_checked(1) {
        Some((first, rest)) => {
            validate_identifier(first)
                && rest.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        }
        None => false,
    }
}
