use arrowport_ingestor_core::IngestionCoordinator;
use arrowport_streams::StreamConfig;
use axum::{Json, extract::State};

use crate::types::{StreamEntry, StreamsResponse};

/// Handler for the /streams endpoint.
///
/// Lists the streams of the current registry snapshot, sorted by name.
pub async fn streams_handler(
    State(coordinator): State<IngestionCoordinator>,
) -> Json<StreamsResponse> {
    let snapshot = coordinator.registry().snapshot();

    let mut streams = snapshot
        .entries()
        .into_iter()
        .map(|(name, policy)| StreamEntry {
            name,
            config: StreamConfig::from(policy.as_ref()),
        })
        .collect::<Vec<_>>();
    streams.sort_by(|a, b| a.name.cmp(&b.name));

    Json(StreamsResponse {
        generation: snapshot.generation(),
        streams,
    })
}
