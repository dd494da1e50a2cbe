//! Request handlers for the submission and read endpoints.
//!
//! Handlers are synchronous. The router runs them on the blocking pool since
//! status updates wait on the store writer and the disk.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use claimflow_core::projection::{
    self, ClaimPage, ClaimStats, SearchResult, StatusHistoryView, DEFAULT_PAGE_LIMIT,
};
use claimflow_core::{ClaimRecord, HistoryMode, RecordStore};
use claimflow_protocol::ClaimSubmission;
use claimflow_queue::{QueueProducer, QueueTransport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Name reported by `GET /`.
pub const SERVICE_NAME: &str = "Claims Reader API";

/// Service banner returned by `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBanner {
    /// Service name.
    pub service: &'static str,
    /// Always `"active"` while the server runs.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
}

/// Liveness report returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `"ok"`, or `"degraded"` when submissions cannot be enqueued.
    pub status: &'static str,
    /// Whether the queue transport accepts messages.
    pub queue_connected: bool,
    /// Records in the latest committed snapshot.
    pub total_claims: usize,
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitResponse {
    /// Always `"received"`.
    pub status: &'static str,
}

/// Body of a status update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    /// The new status label.
    pub status: String,
}

/// Result of a status update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdateResponse {
    /// Human-readable summary.
    pub message: String,
    /// The claim id.
    pub id: String,
    /// Status before the update; only reported for tracked updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    /// Status after the update.
    pub new_status: String,
    /// `"PUT"` or `"PATCH"`.
    pub operation: &'static str,
    /// The updated record.
    pub claim: ClaimRecord,
}

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The record store, shared with the queue consumer.
    pub store: Arc<RecordStore>,
    /// Publisher for accepted submissions.
    pub producer: QueueProducer<Arc<dyn QueueTransport>>,
}

impl HandlerContext {
    /// Creates a handler context publishing to `config.queue`.
    pub fn new(
        config: ServerConfig,
        store: Arc<RecordStore>,
        transport: Arc<dyn QueueTransport>,
    ) -> Self {
        let producer = QueueProducer::new(transport, config.queue.clone());
        Self {
            config,
            store,
            producer,
        }
    }
}

/// Handler for claim requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Returns the service banner.
    pub fn banner(&self) -> ServiceBanner {
        ServiceBanner {
            service: SERVICE_NAME,
            status: "active",
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Reports queue connectivity and the committed record count.
    pub fn health(&self) -> HealthReport {
        let queue_connected = self.context.producer.transport().is_connected();
        HealthReport {
            status: if queue_connected { "ok" } else { "degraded" },
            queue_connected,
            total_claims: self.context.store.read_all().len(),
        }
    }

    /// Validates a submission and publishes it to the claims queue.
    ///
    /// Returns once the broker accepted the message.
    pub fn submit(&self, submission: ClaimSubmission) -> ServerResult<SubmitResponse> {
        self.context.producer.publish(&submission)?;
        debug!(id = %submission.id, queue = %self.context.producer.queue(), "submission enqueued");
        Ok(SubmitResponse { status: "received" })
    }

    /// Returns a page of claims. `limit` defaults to [`DEFAULT_PAGE_LIMIT`].
    pub fn list_claims(&self, limit: Option<usize>, offset: Option<usize>) -> ClaimPage {
        let collection = self.context.store.read_all();
        projection::page(
            &collection,
            limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            offset.unwrap_or(0),
        )
    }

    /// Searches customer and description fields.
    pub fn search(&self, query: &str) -> SearchResult {
        projection::search(&self.context.store.read_all(), query)
    }

    /// Returns the first claim with `id`.
    pub fn get_claim(&self, id: &str) -> ServerResult<ClaimRecord> {
        Ok(self.context.store.read_by_id(id)?)
    }

    /// Returns the status history of the first claim with `id`.
    pub fn status_history(&self, id: &str) -> ServerResult<StatusHistoryView> {
        Ok(projection::status_history(
            &self.context.store.read_all(),
            id,
        )?)
    }

    /// Sets the status of a claim. [`HistoryMode::Track`] also records the
    /// previous status.
    pub fn update_status(
        &self,
        id: &str,
        body: StatusBody,
        mode: HistoryMode,
    ) -> ServerResult<StatusUpdateResponse> {
        if body.status.trim().is_empty() {
            return Err(ServerError::Validation("status must not be empty".into()));
        }

        let update = self.context.store.update_status(id, &body.status, mode)?;
        info!(
            id,
            from = %update.previous_status,
            to = %body.status,
            operation = mode.operation(),
            "claim status updated"
        );

        Ok(StatusUpdateResponse {
            message: format!("Status updated successfully for claim {id}"),
            id: id.to_string(),
            old_status: match mode {
                HistoryMode::Track => Some(update.previous_status),
                HistoryMode::Replace => None,
            },
            new_status: update.record.status.clone(),
            operation: mode.operation(),
            claim: update.record,
        })
    }

    /// Computes statistics from a strict re-read of the claims file.
    pub fn stats(&self) -> ServerResult<ClaimStats> {
        let collection = self.context.store.read_disk()?;
        let size = self.context.store.file_size()?;
        Ok(projection::stats(&collection, size))
    }
}
