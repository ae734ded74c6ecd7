use arrow_flight::FlightClient;
use clap::Args;
use snafu::ResultExt;
use tonic::transport::Channel;

use crate::error::{ConnectionSnafu, InvalidRemoteUrlSnafu, Result};

/// Arguments for configuring the remote server connection.
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// The address of the remote HTTP ingestor
    #[arg(long, env = "ARROWPORT_HTTP_URL", default_value = "http://localhost:8080")]
    pub http_url: String,
    /// The address of the remote Flight server
    #[arg(long, env = "ARROWPORT_FLIGHT_URL", default_value = "http://localhost:8081")]
    pub flight_url: String,
}

impl RemoteArgs {
    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    /// Build the URL of `path` on the HTTP ingestor.
    pub fn http_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.http_url.trim_end_matches('/'), path)
    }

    /// Create a new Flight client.
    pub async fn flight_client(&self) -> Result<FlightClient> {
        let channel = Channel::from_shared(self.flight_url.clone())
            .context(InvalidRemoteUrlSnafu {})?
            .connect()
            .await
            .context(ConnectionSnafu {})?;

        Ok(FlightClient::new(channel))
    }
}
