use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    definitions::{DefinitionsSource, Fingerprint},
    registry::StreamRegistry,
};

/// Default interval between two checks of the definitions source.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Reloads a [`StreamRegistry`] whenever its definitions source changes.
///
/// The watcher runs on its own task. Stopping it, or dropping it, cancels
/// the task.
#[derive(Debug)]
pub struct RegistryWatcher {
    ct: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RegistryWatcher {
    /// Spawn the watcher task. Must be called from within a tokio runtime.
    pub fn start(
        registry: StreamRegistry,
        source: Arc<dyn DefinitionsSource>,
        interval: Duration,
    ) -> Self {
        let ct = CancellationToken::new();
        // Taken before returning, so any later change triggers a reload.
        let last = current_fingerprint(source.as_ref());
        let task = tokio::spawn(watch_loop(registry, source, interval, last, ct.clone()));

        Self {
            ct,
            task: Some(task),
        }
    }

    /// Whether the watcher task is still running.
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Stop the watcher and wait for its task to exit.
    ///
    /// Calling `stop` more than once is a no-op.
    pub async fn stop(&mut self) {
        self.ct.cancel();

        let Some(task) = self.task.take() else {
            return;
        };

        if let Err(err) = task.await {
            warn!(err = ?err, "stream definitions watcher task failed");
        }
    }
}

impl Drop for RegistryWatcher {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

async fn watch_loop(
    registry: StreamRegistry,
    source: Arc<dyn DefinitionsSource>,
    interval: Duration,
    mut last: Option<Fingerprint>,
    ct: CancellationToken,
) {
    let origin = source.origin();
    info!(%origin, ?interval, "watching stream definitions");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ct.cancelled() => {
                debug!(%origin, "stream definitions watcher stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        // Reading the source is blocking file system work.
        let poll = tokio::task::spawn_blocking({
            let registry = registry.clone();
            let source = source.clone();
            move || poll_source(&registry, source.as_ref(), last)
        });

        match poll.await {
            Ok(fingerprint) => last = fingerprint,
            Err(err) => warn!(%origin, err = ?err, "stream definitions poll failed"),
        }
    }
}

/// Reload `registry` if the fingerprint of `source` differs from `last`.
/// Returns the current fingerprint.
fn poll_source(
    registry: &StreamRegistry,
    source: &dyn DefinitionsSource,
    last: Option<Fingerprint>,
) -> Option<Fingerprint> {
    let fingerprint = current_fingerprint(source);
    if fingerprint == last {
        return fingerprint;
    }

    debug!(origin = %source.origin(), "stream definitions changed");

    // A missing file keeps the current definitions until it reappears.
    if fingerprint.is_none() {
        return fingerprint;
    }

    // The registry keeps its current streams and logs a warning.
    if let Err(err) = registry.reload(source) {
        debug!(err = %err, "stream definitions not reloaded");
    }

    fingerprint
}

fn current_fingerprint(source: &dyn DefinitionsSource) -> Option<Fingerprint> {
    match source.fingerprint() {
        Ok(fingerprint) => fingerprint,
        Err(err) => {
            debug!(err = ?err, "failed to read stream definitions fingerprint");
            None
        }
    }
}
