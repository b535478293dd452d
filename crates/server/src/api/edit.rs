use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use freightgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use freightgate_core::domain::edit_token::{EditToken, EditTokenStatus};
use freightgate_core::domain::order::{FreightOrder, OrderId, OrderStatus};
use freightgate_core::edit::{resolve_resume_point, ResumePoint};
use freightgate_core::errors::ChainError;
use freightgate_core::levels::{normalize_to_eur, required_level_for_cost};
use freightgate_notify::ApprovalNotification;

use freightgate_db::repositories::{
    ApproverRepository, EditTokenRepository, LedgerRepository, OrderRepository,
    SqlApproverRepository, SqlEditTokenRepository, SqlLedgerRepository, SqlOrderRepository,
};

use crate::api::{ApiError, AppState};
use crate::session::require_actor;

/// Edit requests are reviewed by the Logistics Manager rung.
const EDIT_REVIEW_LEVEL: u8 = 3;

#[derive(Debug, Deserialize)]
pub struct EditRequestBody {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct EditRequestResponse {
    pub success: bool,
    pub token: String,
    pub status: EditTokenStatus,
    pub expires_at: DateTime<Utc>,
}

/// Only the order's creator may ask to reopen it. The token starts out
/// `Issued` and is worthless until a reviewer releases it.
pub async fn request_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EditRequestBody>,
) -> Result<Json<EditRequestResponse>, ApiError> {
    let actor = require_actor(&state.db_pool, &headers).await?;

    let reason = body.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ApiError::BadRequest("reason must not be empty".to_string()));
    }

    let order_id = OrderId(body.order_id);
    let order = SqlOrderRepository::new(state.db_pool.clone())
        .find_by_id(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} does not exist")))?;

    if order.created_by != actor.user_id {
        return Err(ApiError::Forbidden(format!(
            "only the creator of order {order_id} may request an edit"
        )));
    }

    let now = Utc::now();
    let token = EditToken {
        token: Uuid::new_v4().to_string(),
        order_id: order.id.clone(),
        requested_by: actor.user_id,
        reason,
        status: EditTokenStatus::Issued,
        created_at: now,
        expires_at: now + Duration::hours(state.edit_token_ttl_hours as i64),
    };
    SqlEditTokenRepository::new(state.db_pool.clone()).save(token.clone()).await?;

    info!(
        event_name = "approval.edit_requested",
        order_id = %order.id,
        requested_by = %token.requested_by,
        "edit token issued"
    );

    match SqlApproverRepository::new(state.db_pool.clone())
        .resolve(EDIT_REVIEW_LEVEL, &order.plant)
        .await
    {
        Ok(Some(reviewer)) => {
            state
                .send_notification(ApprovalNotification::EditRequested {
                    order_id: order.id.clone(),
                    reason: token.reason.clone(),
                    recipient: reviewer.email,
                })
                .await;
        }
        Ok(None) => {}
        Err(error) => {
            warn!(order_id = %order.id, %error, "could not resolve the edit reviewer to notify");
        }
    }

    Ok(Json(EditRequestResponse {
        success: true,
        token: token.token,
        status: token.status,
        expires_at: token.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub success: bool,
    pub token: String,
    pub status: EditTokenStatus,
}

/// Flip an issued token to `Released`. Any approver may do this; creators
/// without an approval level may not release their own requests.
pub async fn release_edit_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReleaseBody>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let actor = require_actor(&state.db_pool, &headers).await?;
    if actor.authorization_level < 1 {
        return Err(ApiError::Forbidden(
            "releasing an edit token requires an approval level".to_string(),
        ));
    }

    let token = SqlEditTokenRepository::new(state.db_pool.clone()).release(&body.token).await?;

    info!(
        event_name = "approval.edit_released",
        order_id = %token.order_id,
        released_by = %actor.user_id,
        "edit token released"
    );

    state
        .send_notification(ApprovalNotification::EditReleased {
            order_id: token.order_id.clone(),
            recipient: token.requested_by.clone(),
        })
        .await;

    Ok(Json(ReleaseResponse { success: true, token: token.token, status: token.status }))
}

#[derive(Debug, Deserialize)]
pub struct EditSubmissionBody {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub token: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost_amount: Option<Decimal>,
    #[serde(default)]
    pub cost_currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EditSubmissionResponse {
    pub success: bool,
    pub order_id: String,
    pub cost_eur: Decimal,
    pub required_level: u8,
    pub act_approv: i64,
    pub status: OrderStatus,
    pub resume: ResumePoint,
}

/// Consume a released token and apply the edited fields. The approval chain
/// resumes where it left off; only a previously rejected order restarts from
/// level 1.
pub async fn submit_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EditSubmissionBody>,
) -> Result<Json<EditSubmissionResponse>, ApiError> {
    let actor = require_actor(&state.db_pool, &headers).await?;

    let tokens = SqlEditTokenRepository::new(state.db_pool.clone());
    let pending = tokens
        .find(&body.token)
        .await?
        .ok_or_else(|| ApiError::NotFound("unknown edit token".to_string()))?;
    if pending.requested_by != actor.user_id {
        return Err(ApiError::Forbidden(
            "an edit token may only be submitted by its requester".to_string(),
        ));
    }
    if pending.order_id.0 != body.order_id {
        return Err(ApiError::BadRequest(format!(
            "edit token was issued for order {}, not {}",
            pending.order_id, body.order_id
        )));
    }

    let now = Utc::now();
    if !pending.is_usable(now) {
        return Err(ApiError::Conflict(format!(
            "edit token {} has not been released or has expired",
            pending.token
        )));
    }

    let orders = SqlOrderRepository::new(state.db_pool.clone());
    let order = orders
        .find_by_id(&pending.order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {} does not exist", pending.order_id)))?;

    let ledger = SqlLedgerRepository::new(state.db_pool.clone());
    let snapshot = ledger
        .snapshot(&order.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {} has no approval ledger", order.id)))?;

    let description = match body.description {
        Some(description) => {
            let description = description.trim().to_string();
            if description.is_empty() {
                return Err(ApiError::BadRequest("description must not be empty".to_string()));
            }
            description
        }
        None => order.description.clone(),
    };
    let cost_amount = body.cost_amount.unwrap_or(order.cost_amount);
    let cost_currency = body
        .cost_currency
        .map(|currency| currency.trim().to_ascii_uppercase())
        .unwrap_or_else(|| order.cost_currency.clone());

    let cost_eur = normalize_to_eur(cost_amount, &cost_currency, &state.rates)?;
    let required_after = required_level_for_cost(cost_eur)?.get();

    // A raised ceiling must still be clearable at this plant.
    let approvers = SqlApproverRepository::new(state.db_pool.clone());
    let missing = approvers.missing_levels(required_after, &order.plant).await?;
    if !missing.is_empty() {
        return Err(ChainError::IncompleteApproverChain { plant: order.plant, missing }.into());
    }

    let resume = resolve_resume_point(snapshot.act_approv, order.required_auth_level, required_after);
    let (new_act_approv, new_status) = match resume {
        ResumePoint::NoFurtherApproval => (snapshot.act_approv, OrderStatus::Approved),
        ResumePoint::CeilingLowered => (snapshot.act_approv, OrderStatus::Approved),
        ResumePoint::Resume { .. } => (snapshot.act_approv, OrderStatus::Pending),
        ResumePoint::RestartChain => (0, OrderStatus::Pending),
    };

    let updated = FreightOrder {
        description,
        cost_amount,
        cost_currency,
        cost_eur,
        required_auth_level: required_after,
        status: new_status,
        updated_at: now,
        ..order
    };
    // The token flips to used inside the same transaction; a failed
    // submission leaves it released and retryable.
    ledger.apply_edit(&updated, new_act_approv, &pending.token).await?;

    info!(
        event_name = "approval.edit_applied",
        order_id = %updated.id,
        required_level = updated.required_auth_level,
        act_approv = new_act_approv,
        "edit submission applied"
    );

    state.audit.emit(
        AuditEvent::new(
            Some(updated.id.clone()),
            pending.token.clone(),
            "approval.edit_applied",
            AuditCategory::EditFlow,
            actor.user_id,
            AuditOutcome::Success,
        )
        .with_metadata("required_level", required_after.to_string())
        .with_metadata("act_approv", new_act_approv.to_string()),
    );

    match resume {
        ResumePoint::NoFurtherApproval | ResumePoint::CeilingLowered => {
            state
                .send_notification(ApprovalNotification::OrderApproved {
                    order_id: updated.id.clone(),
                    recipient: updated.created_by.clone(),
                })
                .await;
        }
        ResumePoint::Resume { next_level } => {
            notify_level(&state, &approvers, &updated, next_level).await;
        }
        ResumePoint::RestartChain => {
            notify_level(&state, &approvers, &updated, 1).await;
        }
    }

    Ok(Json(EditSubmissionResponse {
        success: true,
        order_id: updated.id.0,
        cost_eur,
        required_level: required_after,
        act_approv: new_act_approv,
        status: new_status,
        resume,
    }))
}

// Runs after the edit has committed; a recipient lookup failure must not
// turn a durable write into an error response.
async fn notify_level(
    state: &AppState,
    approvers: &SqlApproverRepository,
    order: &FreightOrder,
    level: u8,
) {
    match approvers.resolve(level, &order.plant).await {
        Ok(Some(approver)) => {
            state
                .send_notification(ApprovalNotification::ApprovalNeeded {
                    order_id: order.id.clone(),
                    level,
                    recipient: approver.email,
                })
                .await;
        }
        Ok(None) => {}
        Err(error) => {
            warn!(
                order_id = %order.id,
                level,
                %error,
                "could not resolve the approver to notify"
            );
        }
    }
}
