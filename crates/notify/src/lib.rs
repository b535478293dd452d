//! Outbound mail notifications for approval state changes.
//!
//! Delivery is fire-and-forget from the caller's point of view: handlers
//! commit first, then hand a notification to a [`Notifier`]. A failed send is
//! logged and dropped; it never rolls back an approval.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use freightgate_core::config::MailerConfig;
use freightgate_core::domain::order::OrderId;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mailer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mailer returned status {status}")]
    UnexpectedStatus { status: u16 },
    #[error("mailer client could not be built: {0}")]
    ClientBuild(String),
}

/// One approval-chain event worth telling somebody about.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalNotification {
    /// The chain advanced; `recipient` is the approver now holding the order.
    ApprovalNeeded { order_id: OrderId, level: u8, recipient: String },
    /// Fully approved; sent to the order's creator.
    OrderApproved { order_id: OrderId, recipient: String },
    /// Rejected at `level`; sent to the order's creator.
    OrderRejected { order_id: OrderId, level: u8, reason: String, recipient: String },
    /// A creator asked to reopen an order; sent to the reviewing role.
    EditRequested { order_id: OrderId, reason: String, recipient: String },
    /// An edit token was released back to the requester.
    EditReleased { order_id: OrderId, recipient: String },
}

impl ApprovalNotification {
    pub fn recipient(&self) -> &str {
        match self {
            Self::ApprovalNeeded { recipient, .. }
            | Self::OrderApproved { recipient, .. }
            | Self::OrderRejected { recipient, .. }
            | Self::EditRequested { recipient, .. }
            | Self::EditReleased { recipient, .. } => recipient,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::ApprovalNeeded { order_id, .. }
            | Self::OrderApproved { order_id, .. }
            | Self::OrderRejected { order_id, .. }
            | Self::EditRequested { order_id, .. }
            | Self::EditReleased { order_id, .. } => order_id,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::ApprovalNeeded { order_id, level, .. } => {
                format!("Premium freight order {order_id} awaits your level {level} approval")
            }
            Self::OrderApproved { order_id, .. } => {
                format!("Premium freight order {order_id} is fully approved")
            }
            Self::OrderRejected { order_id, level, .. } => {
                format!("Premium freight order {order_id} was rejected at level {level}")
            }
            Self::EditRequested { order_id, .. } => {
                format!("Premium freight order {order_id} has a pending edit request")
            }
            Self::EditReleased { order_id, .. } => {
                format!("Premium freight order {order_id} is unlocked for editing")
            }
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: ApprovalNotification) -> Result<(), NotifyError>;
}

/// Posts each notification to the transactional-mail gateway.
pub struct HttpMailer {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpMailer {
    /// `None` when the mailer is disabled or not fully configured; callers
    /// fall back to [`NoopNotifier`].
    pub fn from_config(config: &MailerConfig) -> Result<Option<Self>, NotifyError> {
        if !config.enabled {
            return Ok(None);
        }

        let (base_url, api_key) = match (&config.base_url, &config.api_key) {
            (Some(base_url), Some(api_key)) => (base_url.clone(), api_key.clone()),
            _ => return Ok(None),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| NotifyError::ClientBuild(e.to_string()))?;

        Ok(Some(Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key }))
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn notify(&self, notification: ApprovalNotification) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "to": notification.recipient(),
            "subject": notification.subject(),
            "order_id": notification.order_id().0,
            "event": notification,
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "mailer rejected notification");
            return Err(NotifyError::UnexpectedStatus { status: status.as_u16() });
        }

        Ok(())
    }
}

/// Used when no mailer is configured.
#[derive(Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: ApprovalNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Test double that records everything it is asked to send.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<ApprovalNotification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<ApprovalNotification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: ApprovalNotification) -> Result<(), NotifyError> {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}
