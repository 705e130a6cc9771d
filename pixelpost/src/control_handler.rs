//! Control handler for a running pixelpost instance
//!
//! Maps control protocol commands onto [`QueueService`] operations.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use pixelpost_control::{
    CommandHandler, ControlAuthConfig, ControlError, DeadLetterCommand, QueueCommand, Request,
    RequestCommand, Response, ResponseData, SystemCommand,
    protocol::{DeadLetterRow, QueueRow, QueueSummary, SystemStatus},
};
use pixelpost_delivery::{
    DeadLetterEntry, DeliveryError, QueueEntry, QueueService, QueueStatus,
    destination::config::EnabledDestinations,
};

fn server_error(e: DeliveryError) -> ControlError {
    ControlError::ServerError(e.to_string())
}

fn queue_row(entry: QueueEntry) -> QueueRow {
    QueueRow {
        id: entry.id,
        destination: entry.destination,
        event_name: entry.event_name,
        attempts: entry.attempts,
        next_attempt_at: entry.next_attempt_at,
        created_at: entry.created_at,
        preview: entry.preview,
    }
}

fn deadletter_row(entry: DeadLetterEntry) -> DeadLetterRow {
    DeadLetterRow {
        id: entry.id,
        destination: entry.destination,
        event_name: entry.event_name,
        failure_message: entry.failure_message,
        failed_at: entry.failed_at,
        preview: entry.preview,
    }
}

const fn summary(status: QueueStatus) -> QueueSummary {
    QueueSummary {
        queue_length: status.queue_length,
        deadletter_length: status.deadletter_length,
        last_processed: status.last_processed,
    }
}

pub struct PixelpostControlHandler {
    service: Arc<QueueService>,
    auth: ControlAuthConfig,
    destinations: EnabledDestinations,
    relaying: bool,
    /// Rows read by `ProcessNow` when the client gives no limit
    manual_limit: usize,
    start_time: Instant,
}

impl PixelpostControlHandler {
    #[must_use]
    pub fn new(service: Arc<QueueService>, auth: ControlAuthConfig, manual_limit: usize) -> Self {
        Self {
            service,
            auth,
            destinations: EnabledDestinations::default(),
            relaying: false,
            manual_limit,
            start_time: Instant::now(),
        }
    }

    /// Report which integrations are active in `System Status`.
    #[must_use]
    pub const fn with_destinations(mut self, destinations: EnabledDestinations, relaying: bool) -> Self {
        self.destinations = destinations;
        self.relaying = relaying;
        self
    }

    fn destination_names(&self) -> Vec<String> {
        let EnabledDestinations {
            meta,
            tiktok,
            google_ads,
            snapchat,
            pinterest,
        } = self.destinations;

        [
            (meta, "meta"),
            (tiktok, "tiktok"),
            (google_ads, "google_ads"),
            (snapchat, "snapchat"),
            (pinterest, "pinterest"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then(|| name.to_string()))
        .collect()
    }

    async fn handle_queue_command(&self, command: QueueCommand) -> pixelpost_control::Result<Response> {
        let data = match command {
            QueueCommand::List { limit, offset } => {
                let entries = self
                    .service
                    .list_queue(limit, offset)
                    .await
                    .map_err(server_error)?;
                ResponseData::QueueList(entries.into_iter().map(queue_row).collect())
            }
            QueueCommand::Retry { id } => {
                ResponseData::Changed(self.service.retry_item(id).await.map_err(server_error)?)
            }
            QueueCommand::Delete { id } => {
                ResponseData::Changed(self.service.delete_item(id).await.map_err(server_error)?)
            }
            QueueCommand::Status => {
                ResponseData::QueueStatus(summary(self.service.status().await.map_err(server_error)?))
            }
            QueueCommand::ProcessNow { limit } => {
                let limit = limit.unwrap_or(self.manual_limit);
                ResponseData::Processed(self.service.process_now(limit).await.map_err(server_error)?)
            }
        };

        Ok(Response::data(data))
    }

    async fn handle_deadletter_command(
        &self,
        command: DeadLetterCommand,
    ) -> pixelpost_control::Result<Response> {
        let data = match command {
            DeadLetterCommand::List { limit, offset } => {
                let entries = self
                    .service
                    .list_deadletter(limit, offset)
                    .await
                    .map_err(server_error)?;
                ResponseData::DeadLetterList(entries.into_iter().map(deadletter_row).collect())
            }
            DeadLetterCommand::Retry { id } => ResponseData::Requeued(
                self.service.retry_deadletter(id).await.map_err(server_error)?,
            ),
            DeadLetterCommand::Delete { id } => ResponseData::Changed(
                self.service.delete_deadletter(id).await.map_err(server_error)?,
            ),
        };

        Ok(Response::data(data))
    }

    async fn handle_system_command(&self, command: SystemCommand) -> pixelpost_control::Result<Response> {
        match command {
            SystemCommand::Ping => Ok(Response::ok()),

            SystemCommand::Status => {
                let queue = summary(self.service.status().await.map_err(server_error)?);

                let status = SystemStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    uptime_secs: self.start_time.elapsed().as_secs(),
                    queue,
                    destinations: self.destination_names(),
                    relaying: self.relaying,
                };

                Ok(Response::data(ResponseData::SystemStatus(status)))
            }

            SystemCommand::Logs { limit } => Ok(Response::data(ResponseData::Logs(self.service.logs(limit)))),
        }
    }
}

#[async_trait]
impl CommandHandler for PixelpostControlHandler {
    async fn handle_request(&self, request: Request) -> pixelpost_control::Result<Response> {
        if let Err(message) = self.auth.authorise(request.token.as_deref()) {
            tracing::warn!(command = ?request.command, "Rejected control request: {message}");
            return Ok(Response::error(message));
        }

        match request.command {
            RequestCommand::Queue(command) => self.handle_queue_command(command).await,
            RequestCommand::DeadLetter(command) => self.handle_deadletter_command(command).await,
            RequestCommand::System(command) => self.handle_system_command(command).await,
        }
    }
}
