use std::path::{Path, PathBuf};

use arrowport_ingestor_http::StreamsResponse;
use arrowport_streams::{DefinitionsDocument, FileSource, PolicyDefaults, StreamConfig};
use clap::Args;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ConfigSnafu, HttpClientSnafu, Result, ResponseSnafu},
    remote::RemoteArgs,
};

#[derive(Debug, Args)]
pub struct StreamsArgs {
    /// Validate and list the streams of a definitions document instead of
    /// asking the server.
    #[arg(long)]
    config: Option<PathBuf>,
    #[clap(flatten)]
    remote: RemoteArgs,
}

impl StreamsArgs {
    pub async fn run(self, _ct: CancellationToken) -> Result<()> {
        let streams = match &self.config {
            Some(path) => load_local_streams(path)?,
            None => self.fetch_remote_streams().await?,
        };

        if streams.is_empty() {
            println!("No streams configured");
            return Ok(());
        }

        for (name, config) in streams {
            print_stream(&name, &config);
        }

        Ok(())
    }

    async fn fetch_remote_streams(&self) -> Result<Vec<(String, StreamConfig)>> {
        let response = self
            .remote
            .http_client()
            .get(self.remote.http_endpoint("streams"))
            .send()
            .await
            .context(HttpClientSnafu {})?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.context(HttpClientSnafu {})?;
            return ResponseSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        let response: StreamsResponse = response.json().await.context(HttpClientSnafu {})?;
        println!("Registry generation {}", response.generation);

        Ok(response
            .streams
            .into_iter()
            .map(|entry| (entry.name, entry.config))
            .collect())
    }
}

/// Load the document at `path`, failing on the first invalid stream.
fn load_local_streams(path: &Path) -> Result<Vec<(String, StreamConfig)>> {
    let source = FileSource::new(path);
    let document = DefinitionsDocument::load(&source).context(ConfigSnafu {})?;
    let policies = document
        .into_policies(&PolicyDefaults::default())
        .context(ConfigSnafu {})?;

    let mut streams = policies
        .iter()
        .map(|(name, policy)| (name.clone(), StreamConfig::from(policy.as_ref())))
        .collect::<Vec<_>>();
    streams.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(streams)
}

fn print_stream(name: &str, config: &StreamConfig) {
    let chunk_size = config
        .chunk_size
        .map(|size| size.to_string())
        .unwrap_or_else(|| "default".to_string());
    let compression = config
        .compression
        .as_ref()
        .map(|c| format!("{}({})", c.algorithm, c.level))
        .unwrap_or_else(|| "none".to_string());

    println!(
        "{name}\t-> {}\tchunk_size={chunk_size}\tcompression={compression}",
        config.target_table
    );
}
