use clap::{Parser, Subcommand};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ObservabilitySnafu, Result},
    ingest::IngestArgs,
    serve::ServeArgs,
    streams::StreamsArgs,
};

mod error;
mod ingest;
mod remote;
mod serve;
mod streams;

#[derive(Parser)]
#[command(name = "arrowport")]
#[command(about = "Load Arrow batches into DuckDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and Flight ingestion servers
    Serve {
        #[clap(flatten)]
        inner: ServeArgs,
    },
    /// List the configured streams
    Streams {
        #[clap(flatten)]
        inner: StreamsArgs,
    },
    /// Send an Arrow IPC file to a stream
    Ingest {
        #[clap(flatten)]
        inner: IngestArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = arrowport_observability::init_observability(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    )
    .context(ObservabilitySnafu {})?;

    let ct = CancellationToken::new();

    let ct_clone = ct.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ct_clone.cancel();
    });

    match cli.command {
        Commands::Serve { inner } => inner.run(ct).await,
        Commands::Streams { inner } => inner.run(ct).await,
        Commands::Ingest { inner } => inner.run(ct).await,
    }
}
