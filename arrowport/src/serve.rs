use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf, sync::Arc, time::Duration};

use arrowport_flight::ArrowportFlightServer;
use arrowport_ingestor_core::{IngestionCoordinator, SessionOptions};
use arrowport_ingestor_http::{DEFAULT_BODY_LIMIT, HttpIngestor};
use arrowport_store::{DuckDbFactory, StoreGateway};
use arrowport_streams::{
    Compression, DEFAULT_COMPRESSION_LEVEL, DEFAULT_WATCH_INTERVAL, FileSource, PolicyDefaults,
    ProvisionMode, StreamRegistry,
};
use axum::Router;
use clap::Args;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{
    InvalidArgumentSnafu, InvalidServerUrlSnafu, IoSnafu, PolicySnafu, Result, TonicServerSnafu,
};

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Path of the DuckDB database file.
    #[arg(long, env = "ARROWPORT_DB_PATH", default_value = "arrowport.duckdb")]
    db_path: PathBuf,
    /// The address of the HTTP ingestor server.
    #[arg(long, env = "ARROWPORT_HTTP_ADDRESS", default_value = "127.0.0.1:8080")]
    http_address: String,
    /// The address of the Flight server.
    #[arg(long, env = "ARROWPORT_FLIGHT_ADDRESS", default_value = "127.0.0.1:8081")]
    flight_address: String,
    /// JSON or YAML document with the stream definitions, chosen by the file
    /// extension. It's reloaded when it changes.
    #[arg(long, env = "ARROWPORT_STREAMS_CONFIG")]
    streams_config: Option<PathBuf>,
    /// Accept unknown streams, loading them into a table with the stream's
    /// name.
    #[arg(long, env = "ARROWPORT_AUTO_PROVISION")]
    auto_provision: bool,
    /// Chunk size of streams that don't set one.
    #[arg(long, env = "ARROWPORT_DEFAULT_CHUNK_SIZE", default_value_t = PolicyDefaults::default().chunk_size)]
    default_chunk_size: NonZeroUsize,
    /// Compression of streams that don't set one: zstd, lz4 or none.
    #[arg(long, env = "ARROWPORT_DEFAULT_COMPRESSION", default_value = "zstd")]
    default_compression: String,
    #[arg(long, env = "ARROWPORT_DEFAULT_COMPRESSION_LEVEL", default_value_t = DEFAULT_COMPRESSION_LEVEL as i64)]
    default_compression_level: i64,
    /// How often the stream definitions are checked for changes, in
    /// milliseconds.
    #[arg(
        long,
        env = "ARROWPORT_WATCH_INTERVAL_MS",
        default_value_t = DEFAULT_WATCH_INTERVAL.as_millis() as u64
    )]
    watch_interval_ms: u64,
    /// Maximum size of an HTTP request body, in bytes.
    #[arg(long, env = "ARROWPORT_HTTP_BODY_LIMIT", default_value_t = DEFAULT_BODY_LIMIT)]
    http_body_limit: usize,
    /// Time to wait for the next chunk of a Flight stream, in seconds.
    #[arg(long, env = "ARROWPORT_CHUNK_TIMEOUT_SECS", default_value_t = 30)]
    chunk_timeout_secs: u64,
}

impl ServeArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let http_address = self
            .http_address
            .parse::<SocketAddr>()
            .context(InvalidServerUrlSnafu {})?;

        let flight_address = self
            .flight_address
            .parse::<SocketAddr>()
            .context(InvalidServerUrlSnafu {})?;

        if self.watch_interval_ms == 0 {
            return InvalidArgumentSnafu {
                name: "watch-interval-ms",
                message: "must be a positive number of milliseconds",
            }
            .fail();
        }

        let defaults = self.policy_defaults()?;
        let mode = if self.auto_provision {
            ProvisionMode::AutoProvision
        } else {
            ProvisionMode::Strict
        };

        let (registry, watcher) = match &self.streams_config {
            Some(path) => {
                let source = Arc::new(FileSource::new(path));
                let registry = StreamRegistry::from_source(source.as_ref(), mode, defaults);
                let interval = Duration::from_millis(self.watch_interval_ms);
                let watcher = registry.watch(source, interval);
                (registry, Some(watcher))
            }
            None => (StreamRegistry::new(mode, defaults), None),
        };

        info!(
            db_path = %self.db_path.display(),
            streams = registry.snapshot().len(),
            mode = ?registry.mode(),
            "starting arrowport"
        );
        println!("HTTP ingestor listening on {}", http_address);
        println!("Flight server listening on {}", flight_address);

        let gateway = Arc::new(StoreGateway::new(Arc::new(DuckDbFactory::new(
            &self.db_path,
        ))));
        let coordinator = IngestionCoordinator::new(registry, gateway);

        let options = SessionOptions {
            chunk_timeout: Duration::from_secs(self.chunk_timeout_secs),
        };

        let ingestor = HttpIngestor::new(coordinator.clone()).with_body_limit(self.http_body_limit);
        let http_fut = run_http_server(ingestor, http_address, ct.clone());
        let flight_fut = run_flight_server(coordinator, options, flight_address, ct.clone());

        tokio::select! {
            res = http_fut => {
                println!("HTTP ingestor server exited with {:?}", res);
            },
            res = flight_fut => {
                println!("Flight server exited with {:?}", res);
            },
        }

        if let Some(mut watcher) = watcher {
            watcher.stop().await;
        }

        Ok(())
    }

    fn policy_defaults(&self) -> Result<PolicyDefaults> {
        let compression = match self.default_compression.to_ascii_lowercase().as_str() {
            "none" => None,
            algorithm => Some(
                Compression::parse(algorithm, self.default_compression_level)
                    .context(PolicySnafu {})?,
            ),
        };

        Ok(PolicyDefaults::default()
            .with_chunk_size(self.default_chunk_size)
            .with_compression(compression))
    }
}

async fn run_http_server(
    ingestor: HttpIngestor,
    address: SocketAddr,
    ct: CancellationToken,
) -> Result<()> {
    let app = Router::new().merge(ingestor.into_router());

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .context(IoSnafu {})?;

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        ct.cancelled().await;
    });

    server.await.context(IoSnafu {})
}

async fn run_flight_server(
    coordinator: IngestionCoordinator,
    options: SessionOptions,
    address: SocketAddr,
    ct: CancellationToken,
) -> Result<()> {
    let flight_service = ArrowportFlightServer::new(coordinator, ct.clone())
        .with_session_options(options)
        .into_tonic_server();

    let server = tonic::transport::Server::builder()
        .add_service(flight_service)
        .serve_with_shutdown(address, async move {
            ct.cancelled().await;
        });

    server.await.context(TonicServerSnafu {})
}
