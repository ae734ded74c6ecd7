use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow_flight::{
    FlightClient, FlightData, FlightDescriptor, PutResult, encode::FlightDataEncoderBuilder,
    error::FlightError,
};
use arrowport_flight::{ArrowportFlightServer, StreamCommand};
use arrowport_ingestor_core::{IngestionCoordinator, SessionOptions};
use arrowport_store::{InMemoryDuckDbFactory, StoreGateway};
use arrowport_streams::{PolicyDefaults, ProvisionMode, StreamConfig, StreamRegistry};
use futures::{Stream, TryStreamExt};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Server};

pub use arrowport_ingestor_core::test_utils::events_batch;

pub struct TestServer {
    pub client: FlightClient,
    pub coordinator: IngestionCoordinator,
    pub ct: CancellationToken,
}

impl TestServer {
    pub async fn count_rows(&self, table: &str) -> Option<u64> {
        self.coordinator
            .gateway()
            .describe_table(table)
            .await
            .unwrap()
            .map(|description| description.num_rows)
    }

    /// Send `batches` to `stream`, returning the server's answer.
    pub async fn put(
        &mut self,
        stream: &str,
        batches: Vec<RecordBatch>,
    ) -> Result<Vec<PutResult>, FlightError> {
        let input = FlightDataEncoderBuilder::new()
            .with_flight_descriptor(Some(descriptor(stream)))
            .build(futures::stream::iter(batches.into_iter().map(Ok)));
        self.put_stream(input).await
    }

    pub async fn put_stream<S>(&mut self, input: S) -> Result<Vec<PutResult>, FlightError>
    where
        S: Stream<Item = Result<FlightData, FlightError>> + Send + 'static,
    {
        let response = self.client.do_put(input).await?;
        response.try_collect().await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Start a server with two configured streams: `events`, loading into the
/// `events` table in chunks of 64 rows, and `bulk`, loading into the `bulk`
/// table with the default policy.
pub async fn start_server(options: SessionOptions) -> TestServer {
    let registry = StreamRegistry::new(ProvisionMode::Strict, PolicyDefaults::default());
    registry
        .register_config("events", StreamConfig::new("events").with_chunk_size(64))
        .unwrap();
    registry
        .register_config("bulk", StreamConfig::new("bulk"))
        .unwrap();

    let gateway = Arc::new(StoreGateway::new(Arc::new(InMemoryDuckDbFactory::new())));
    let coordinator = IngestionCoordinator::new(registry, gateway);

    let ct = CancellationToken::new();
    let server = ArrowportFlightServer::new(coordinator.clone(), ct.clone())
        .with_session_options(options)
        .into_tonic_server();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn({
        let ct = ct.clone();
        async move {
            Server::builder()
                .add_service(server)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    ct.cancelled().await;
                })
                .await
                .unwrap();
        }
    });

    let channel = Channel::from_shared(format!("http://{address}"))
        .unwrap()
        .connect()
        .await
        .unwrap();

    TestServer {
        client: FlightClient::new(channel),
        coordinator,
        ct,
    }
}

pub fn descriptor(stream: &str) -> FlightDescriptor {
    StreamCommand::new(stream).into_descriptor().unwrap()
}

pub fn status_code(err: FlightError) -> tonic::Code {
    match err {
        FlightError::Tonic(status) => status.code(),
        other => panic!("expected a status, got {other:?}"),
    }
}
