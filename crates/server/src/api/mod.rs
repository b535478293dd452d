//! JSON API for the premium freight approval portal.
//!
//! - `POST /api/orders`                - create an order and open its ledger
//! - `POST /api/orders/status`        - legacy approve/reject endpoint
//! - `GET  /api/orders/progress`      - chain position and history
//! - `GET  /api/orders/queue`         - per-level pending queue
//! - `POST /api/orders/edit-requests` - creator asks to reopen an order
//! - `POST /api/edit-tokens/release`  - approver releases an edit token
//! - `POST /api/orders/edit-submissions` - consume a token, resubmit the order

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use freightgate_core::audit::{AuditEvent, AuditSink};
use freightgate_core::errors::{ChainError, LevelError, TransitionError};
use freightgate_core::levels::CurrencyRates;
use freightgate_db::repositories::RepositoryError;
use freightgate_db::DbPool;
use freightgate_notify::{ApprovalNotification, Notifier};

use crate::bootstrap::Application;

pub mod edit;
pub mod orders;
pub mod progress;
pub mod queue;
pub mod status;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub rates: CurrencyRates,
    pub edit_token_ttl_hours: u64,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn from_application(app: &Application) -> Self {
        Self {
            db_pool: app.db_pool.clone(),
            rates: app.config.currency.currency_rates(),
            edit_token_ttl_hours: app.config.currency.edit_token_ttl_hours,
            notifier: app.notifier.clone(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Delivery happens after commit and never affects the response.
    pub async fn send_notification(&self, notification: ApprovalNotification) {
        if let Err(notify_error) = self.notifier.notify(notification).await {
            warn!(
                event_name = "approval.notification_failed",
                error = %notify_error,
                "dropping undeliverable approval notification"
            );
        }
    }
}

/// Audit events go to the log stream in production; tests swap in the
/// in-memory sink to assert on them.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            event_id = %event.event_id,
            correlation_id = %event.correlation_id,
            order_id = event.order_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-"),
            actor = %event.actor,
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/orders", post(orders::create_order))
        .route("/api/orders/status", post(status::update_status))
        .route("/api/orders/progress", get(progress::order_progress))
        .route("/api/orders/queue", get(queue::approval_queue))
        .route("/api/orders/edit-requests", post(edit::request_edit))
        .route("/api/edit-tokens/release", post(edit::release_edit_token))
        .route("/api/orders/edit-submissions", post(edit::submit_edit))
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internals carry database detail; log it, never return it.
        let message = match &self {
            Self::Internal(detail) => {
                error!(
                    event_name = "api.internal_error",
                    detail = %detail,
                    "request failed with internal error"
                );
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { success: false, message })).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(message) => Self::Conflict(message),
            RepositoryError::Database(e) => Self::Internal(e.to_string()),
            RepositoryError::Decode(message) => Self::Internal(message),
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(error: TransitionError) -> Self {
        // Out-of-turn and terminal-state attempts are refusals of the caller,
        // not races: the legacy surface reports them as 403.
        match &error {
            TransitionError::CrossPlantForbidden { .. }
            | TransitionError::OutOfSequence { .. }
            | TransitionError::AlreadyFullyApproved { .. }
            | TransitionError::TerminalState { .. } => Self::Forbidden(error.to_string()),
            TransitionError::InvalidRejectionReason(_) => Self::BadRequest(error.to_string()),
        }
    }
}

impl From<LevelError> for ApiError {
    fn from(error: LevelError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl From<ChainError> for ApiError {
    fn from(error: ChainError) -> Self {
        Self::Conflict(error.to_string())
    }
}
