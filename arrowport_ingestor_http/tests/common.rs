use std::sync::Arc;

use arrowport_ingestor_core::{IngestionCoordinator, encode, test_utils::events_batch};
use arrowport_ingestor_http::HttpIngestor;
use arrowport_store::{InMemoryDuckDbFactory, StoreGateway};
use arrowport_streams::{PolicyDefaults, ProvisionMode, StreamConfig, StreamRegistry};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use serde_json::{Value, json};
use tower::ServiceExt;

pub struct TestServer {
    pub router: Router,
    pub coordinator: IngestionCoordinator,
}

impl TestServer {
    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_raw(&self, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    pub async fn count_rows(&self, table: &str) -> Option<u64> {
        self.coordinator
            .gateway()
            .describe_table(table)
            .await
            .unwrap()
            .map(|description| description.num_rows)
    }
}

/// Server with a single configured stream, `events`, loading into the
/// `events` table.
pub fn create_server() -> TestServer {
    create_server_with(HttpIngestor::new)
}

/// Like [`create_server`], with the ingestor built by `build`.
pub fn create_server_with(build: impl FnOnce(IngestionCoordinator) -> HttpIngestor) -> TestServer {
    let registry = StreamRegistry::new(ProvisionMode::Strict, PolicyDefaults::default());
    registry
        .register_config("events", StreamConfig::new("events"))
        .unwrap();

    let gateway = Arc::new(StoreGateway::new(Arc::new(InMemoryDuckDbFactory::new())));
    let coordinator = IngestionCoordinator::new(registry, gateway);
    let router = build(coordinator.clone()).into_router();

    TestServer {
        router,
        coordinator,
    }
}

pub fn events_schema_json() -> Value {
    json!({
        "fields": [
            { "name": "id", "type": "int64", "nullable": false },
            { "name": "name", "type": "string" },
            { "name": "value", "type": "float64" },
        ]
    })
}


/// Request body carrying `num_rows` events encoded as base64 Arrow IPC.
pub fn events_request(first_id: i64, num_rows: usize) -> Value {
    let data = encode(&events_batch(first_id, num_rows), None).unwrap();
    json!({
        "batch": {
            "schema": events_schema_json(),
            "data": BASE64_STANDARD.encode(&data),
        }
    })
}
