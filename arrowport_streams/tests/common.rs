use std::{fs, path::Path, time::Duration};

use arrowport_streams::StreamRegistry;

pub fn write_definitions(path: &Path, streams: &[(&str, &str)]) {
    let streams = streams
        .iter()
        .map(|(name, table)| format!(r#""{name}": {{"target_table": "{table}"}}"#))
        .collect::<Vec<_>>()
        .join(", ");
    fs::write(path, format!(r#"{{"streams": {{{streams}}}}}"#)).expect("write definitions");
}

pub fn write_yaml_definitions(path: &Path, streams: &[(&str, &str)]) {
    let streams = streams
        .iter()
        .map(|(name, table)| format!("  {name}:\n    target_table: {table}\n"))
        .collect::<String>();
    fs::write(path, format!("streams:\n{streams}")).expect("write definitions");
}

pub fn default_watch_interval() -> Duration {
    Duration::from_millis(20)
}

/// Wait until the registry reaches `generation`, failing after a few seconds.
pub async fn wait_for_generation(registry: &StreamRegistry, generation: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while registry.generation() < generation {
        assert!(
            tokio::time::Instant::now() < deadline,
            "registry did not reach generation {generation}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
