use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    definitions::{DefinitionsDocument, DefinitionsSource, validate_stream_name},
    error::{InvalidStreamNameSnafu, InvalidStreamSnafu, Result},
    name::TableName,
    policy::{PolicyDefaults, StreamConfig, StreamPolicy},
    watcher::RegistryWatcher,
};

/// What happens when a stream name is not configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProvisionMode {
    /// Unknown streams are rejected.
    #[default]
    Strict,
    /// Unknown streams get a policy targeting a table named after the
    /// stream, using the process defaults.
    AutoProvision,
}

/// An immutable view of the registry's stream definitions.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    streams: HashMap<String, Arc<StreamPolicy>>,
}

/// Maps stream names to their policies.
///
/// The registry publishes its contents as immutable snapshots: readers clone
/// the current snapshot and never observe a half-applied update. Updates
/// build a full new snapshot and swap it in.
#[derive(Debug, Clone)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    current: RwLock<Arc<RegistrySnapshot>>,
    /// Serializes writers so that copy-on-write updates are never lost.
    writer: Mutex<()>,
    mode: ProvisionMode,
    defaults: PolicyDefaults,
}

impl RegistrySnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, name: &str) -> Option<&Arc<StreamPolicy>> {
        self.streams.get(name)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Stream names in lexicographic order.
    pub fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.streams.keys().cloned().collect();
        names.sort();
        names
    }

    /// All streams with their policies, ordered by name.
    pub fn entries(&self) -> Vec<(String, Arc<StreamPolicy>)> {
        let mut entries: Vec<_> = self
            .streams
            .iter()
            .map(|(name, policy)| (name.clone(), policy.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl StreamRegistry {
    /// Create an empty registry.
    pub fn new(mode: ProvisionMode, defaults: PolicyDefaults) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                current: RwLock::new(Arc::new(RegistrySnapshot::default())),
                writer: Mutex::new(()),
                mode,
                defaults,
            }),
        }
    }

    /// Create a registry and load its initial definitions from `source`.
    ///
    /// A source that cannot be loaded leaves the registry empty.
    pub fn from_source(
        source: &dyn DefinitionsSource,
        mode: ProvisionMode,
        defaults: PolicyDefaults,
    ) -> Self {
        let registry = Self::new(mode, defaults);
        if let Err(err) = registry.reload(source) {
            debug!(err = %err, "starting with no stream definitions");
        }
        registry
    }

    pub fn mode(&self) -> ProvisionMode {
        self.inner.mode
    }

    pub fn defaults(&self) -> &PolicyDefaults {
        &self.inner.defaults
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Returns the policy for `name`.
    ///
    /// In [`ProvisionMode::AutoProvision`] a miss returns a policy built from
    /// the defaults. The synthesized policy is not stored.
    pub fn lookup(&self, name: &str) -> Option<Arc<StreamPolicy>> {
        let snapshot = self.snapshot();
        if let Some(policy) = snapshot.get(name) {
            return Some(policy.clone());
        }

        match self.inner.mode {
            ProvisionMode::Strict => None,
            ProvisionMode::AutoProvision => {
                let target_table = TableName::new(name).ok()?;
                debug!(stream = %name, "auto-provisioning stream policy");
                Some(Arc::new(StreamPolicy::with_defaults(
                    target_table,
                    &self.inner.defaults,
                )))
            }
        }
    }

    /// Stream names in the current snapshot, ordered.
    pub fn stream_names(&self) -> Vec<String> {
        self.snapshot().stream_names()
    }

    /// Replace all definitions with the ones read from `source`.
    ///
    /// The new snapshot is built and validated completely before it is
    /// published. On failure the current snapshot stays active.
    pub fn reload(&self, source: &dyn DefinitionsSource) -> Result<()> {
        let origin = source.origin();

        let policies = match DefinitionsDocument::load(source)
            .and_then(|document| document.into_policies(&self.inner.defaults))
        {
            Ok(policies) => policies,
            Err(error) => {
                warn!(
                    %origin,
                    generation = self.generation(),
                    err = ?error,
                    "failed to reload stream definitions, keeping current streams"
                );
                return Err(error);
            }
        };

        let _writer = self.inner.writer.lock();
        let generation = self.publish(policies);

        info!(
            %origin,
            generation,
            streams = self.snapshot().len(),
            "reloaded stream definitions"
        );

        Ok(())
    }

    /// Add or replace a single stream definition.
    pub fn register(&self, name: impl Into<String>, policy: StreamPolicy) -> Result<()> {
        let name = name.into();
        ensure!(
            validate_stream_name(&name),
            InvalidStreamNameSnafu { stream: name }
        );

        let _writer = self.inner.writer.lock();
        let mut streams = self.snapshot().streams.clone();
        streams.insert(name.clone(), Arc::new(policy));
        let generation = self.publish(streams);

        debug!(stream = %name, generation, "registered stream");

        Ok(())
    }

    /// Build a policy from its serialized form and register it.
    pub fn register_config(
        &self,
        name: impl Into<String>,
        config: StreamConfig,
    ) -> Result<()> {
        let name = name.into();
        let policy = config
            .into_policy(&self.inner.defaults)
            .context(InvalidStreamSnafu { stream: &name })?;
        self.register(name, policy)
    }

    /// Start a watcher that reloads the registry when `source` changes.
    pub fn watch(
        &self,
        source: Arc<dyn DefinitionsSource>,
        interval: Duration,
    ) -> RegistryWatcher {
        RegistryWatcher::start(self.clone(), source, interval)
    }

    /// Publish a new snapshot. Callers must hold the writer lock.
    fn publish(&self, streams: HashMap<String, Arc<StreamPolicy>>) -> u64 {
        let mut current = self.inner.current.write();
        let generation = current.generation + 1;
        *current = Arc::new(RegistrySnapshot {
            generation,
            streams,
        });
        generation
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        definitions::InlineSource,
        policy::{Compression, CompressionAlgorithm},
    };

    use super::*;

    fn events_source() -> InlineSource {
        InlineSource::new(
            r#"{"streams": {"events": {"target_table": "events", "chunk_size": 100}}}"#,
        )
    }

    #[test]
    fn test_strict_lookup() {
        let registry = StreamRegistry::from_source(
            &events_source(),
            ProvisionMode::Strict,
            PolicyDefaults::default(),
        );

        let policy = registry.lookup("events").unwrap();
        assert_eq!(policy.chunk_size(), 100);
        assert!(registry.lookup("metrics").is_none());
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_auto_provision_lookup() {
        let registry = StreamRegistry::new(ProvisionMode::AutoProvision, PolicyDefaults::default());

        let policy = registry.lookup("metrics").unwrap();
        assert_eq!(policy.target_table().to_string(), "metrics");
        assert_eq!(policy.chunk_size(), 10_000);
        assert_eq!(
            policy.compression(),
            Some(Compression::new(CompressionAlgorithm::Zstd, 3).unwrap())
        );

        // synthesized policies are not stored
        assert!(registry.snapshot().is_empty());
        assert_eq!(registry.generation(), 0);

        // names that are not valid table names cannot be provisioned
        assert!(registry.lookup("page-views").is_none());
    }

    #[test]
    fn test_failed_reload_keeps_snapshot() {
        let registry = StreamRegistry::from_source(
            &events_source(),
            ProvisionMode::Strict,
            PolicyDefaults::default(),
        );
        let before = registry.snapshot();

        let err = registry
            .reload(&InlineSource::new("not json"))
            .unwrap_err();
        assert!(err.is_parse());

        let err = registry
            .reload(&InlineSource::new(
                r#"{"streams": {"bad": {"target_table": "bad", "compression": {"algorithm": "gzip", "level": 1}}}}"#,
            ))
            .unwrap_err();
        assert!(err.is_invalid_stream());

        let after = registry.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(registry.lookup("events").is_some());
        assert!(registry.lookup("bad").is_none());
    }

    #[test]
    fn test_reload_replaces_snapshot() {
        let registry = StreamRegistry::from_source(
            &events_source(),
            ProvisionMode::Strict,
            PolicyDefaults::default(),
        );
        let before = registry.lookup("events").unwrap();

        registry
            .reload(&InlineSource::new(
                r#"{"streams": {"metrics": {"target_table": "metrics"}}}"#,
            ))
            .unwrap();

        assert!(registry.lookup("events").is_none());
        assert!(registry.lookup("metrics").is_some());
        assert_eq!(registry.generation(), 2);
        // previously handed out policies stay valid
        assert_eq!(before.chunk_size(), 100);
    }

    #[test]
    fn test_register() {
        let registry = StreamRegistry::new(ProvisionMode::Strict, PolicyDefaults::default());
        let policy = StreamPolicy::new(TableName::new("events").unwrap(), 50, None).unwrap();

        registry.register("events", policy.clone()).unwrap();
        registry
            .register_config(
                "metrics",
                StreamConfig::new("metrics").with_chunk_size(7),
            )
            .unwrap();

        assert_eq!(registry.lookup("events").as_deref(), Some(&policy));
        assert_eq!(registry.lookup("metrics").unwrap().chunk_size(), 7);
        assert_eq!(registry.stream_names(), vec!["events", "metrics"]);
        assert_eq!(registry.generation(), 2);

        assert!(registry.register("bad name", policy).is_err());
    }
}
