use std::pin::Pin;

use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightInfo,
    HandshakeRequest, HandshakeResponse, PollInfo, PutResult, SchemaResult, Ticket,
    error::FlightError,
    flight_service_server::{FlightService, FlightServiceServer},
};
use arrowport_ingestor_core::{IngestionCoordinator, SessionOptions};
use futures::{Stream, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info};

use crate::{
    command::{StreamCommand, encode_put_metadata},
    error::FlightServerError,
    ingestion::process_ingestion_stream,
};

type TonicStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// Flight server ingesting long-lived streams with `DoPut`.
pub struct ArrowportFlightServer {
    coordinator: IngestionCoordinator,
    options: SessionOptions,
    ct: CancellationToken,
}

impl ArrowportFlightServer {
    /// Create a new server. Sessions still running when `ct` is cancelled
    /// are aborted.
    pub fn new(coordinator: IngestionCoordinator, ct: CancellationToken) -> Self {
        Self {
            coordinator,
            options: SessionOptions::default(),
            ct,
        }
    }

    pub fn with_session_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn into_tonic_server(self) -> FlightServiceServer<Self> {
        FlightServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl FlightService for ArrowportFlightServer {
    type HandshakeStream = TonicStream<HandshakeResponse>;
    type ListFlightsStream = TonicStream<FlightInfo>;
    type DoGetStream = TonicStream<FlightData>;
    type DoPutStream = TonicStream<PutResult>;
    type DoActionStream = TonicStream<arrow_flight::Result>;
    type ListActionsStream = TonicStream<ActionType>;
    type DoExchangeStream = TonicStream<FlightData>;

    async fn handshake(
        &self,
        _request: Request<Streaming<HandshakeRequest>>,
    ) -> Result<Response<Self::HandshakeStream>, Status> {
        Err(Status::unimplemented("Not yet implemented: handshake"))
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> Result<Response<Self::ListFlightsStream>, Status> {
        let mut stream_names = self.coordinator.registry().stream_names();
        stream_names.sort();

        let infos = stream_names
            .into_iter()
            .map(stream_flight_info)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(streams = infos.len(), "listing flights");

        let stream = futures::stream::iter(infos.into_iter().map(Ok));
        Ok(Response::new(stream.boxed()))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> Result<Response<FlightInfo>, Status> {
        let command = StreamCommand::try_from_descriptor(request.get_ref())?;

        if self.coordinator.registry().lookup(&command.stream_name).is_none() {
            return Err(Status::not_found(format!(
                "stream '{}' not found",
                command.stream_name
            )));
        }

        let info = stream_flight_info(command.stream_name)?;
        Ok(Response::new(info))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("Not yet implemented: poll_flight_info"))
    }

    async fn get_schema(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> Result<Response<SchemaResult>, Status> {
        Err(Status::unimplemented("Not yet implemented: get_schema"))
    }

    async fn do_get(
        &self,
        _request: Request<Ticket>,
    ) -> Result<Response<Self::DoGetStream>, Status> {
        Err(Status::unimplemented("Not yet implemented: do_get"))
    }

    async fn do_put(
        &self,
        request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoPutStream>, Status> {
        let request_stream = request.into_inner().map_err(FlightError::from);

        let result = process_ingestion_stream(
            &self.coordinator,
            request_stream,
            self.options.clone(),
            self.ct.child_token(),
        )
        .await?;

        info!(rows = result.rows_processed, "flight ingestion complete");

        let put_result = PutResult {
            app_metadata: encode_put_metadata(&result)?,
        };

        let stream = futures::stream::iter([Ok(put_result)]);
        Ok(Response::new(stream.boxed()))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("Not yet implemented: do_exchange"))
    }

    async fn do_action(
        &self,
        _request: Request<Action>,
    ) -> Result<Response<Self::DoActionStream>, Status> {
        Err(Status::unimplemented("Not yet implemented: do_action"))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ListActionsStream>, Status> {
        Err(Status::unimplemented("Not yet implemented: list_actions"))
    }
}

/// Placeholder info for a stream. Sizes are unknown.
fn stream_flight_info(stream_name: String) -> Result<FlightInfo, FlightServerError> {
    let descriptor = StreamCommand::new(stream_name).into_descriptor()?;

    let mut info = FlightInfo::new().with_descriptor(descriptor);
    info.total_records = -1;
    info.total_bytes = -1;

    Ok(info)
}
