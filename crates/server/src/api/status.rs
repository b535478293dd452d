use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use freightgate_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use freightgate_core::domain::ledger::{ApprovalState, REJECTED_SENTINEL};
use freightgate_core::domain::order::{FreightOrder, OrderId};
use freightgate_core::machine::{plan_transition, ActorContext, ApprovalAction, PlannedTransition};
use freightgate_notify::ApprovalNotification;

use freightgate_db::repositories::{
    ApproverRepository, LedgerRepository, OrderRepository, SqlApproverRepository,
    SqlLedgerRepository, SqlOrderRepository,
};

use crate::api::{ApiError, AppState};
use crate::session::require_actor;

/// Legacy portal body. `newStatusId` is the target `act_approv` value: the
/// caller's own level for an approval, 99 for a rejection.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(rename = "orderId")]
    pub order_id: String,
    #[serde(rename = "newStatusId")]
    pub new_status_id: i64,
    #[serde(rename = "userLevel")]
    pub user_level: u8,
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Client-side action timestamp; accepted for compatibility but the
    /// server clock is authoritative.
    #[serde(rename = "authDate", default)]
    pub auth_date: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub message: String,
    pub new_status: i64,
    pub required_level: u8,
}

pub async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    let actor = require_actor(&state.db_pool, &headers).await?;

    // The body duplicates the caller's identity; both fields must agree with
    // the session before anything else is considered.
    if actor.user_id != request.user_id {
        return Err(ApiError::Forbidden(format!(
            "session user `{}` does not match userID `{}`",
            actor.user_id, request.user_id
        )));
    }
    if actor.authorization_level != request.user_level {
        return Err(ApiError::Forbidden(format!(
            "session holds level {}, request claims level {}",
            actor.authorization_level, request.user_level
        )));
    }

    let order_id = OrderId(request.order_id.clone());
    let order = SqlOrderRepository::new(state.db_pool.clone())
        .find_by_id(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} does not exist")))?;

    let ledger = SqlLedgerRepository::new(state.db_pool.clone());
    let snapshot = ledger
        .snapshot(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} has no approval ledger")))?;
    let current = ApprovalState::from_wire(snapshot.act_approv, order.required_auth_level);

    let action = decode_action(&request, &actor)?;
    let planned = plan_transition(&actor, &order, current, &action)?;

    ledger.advance(&order, &planned, Utc::now()).await?;

    info!(
        event_name = "approval.ledger_advanced",
        order_id = %order.id,
        acting_user = %planned.acting_user,
        level = planned.level,
        new_act_approv = planned.new_act_approv,
        "approval ledger advanced"
    );

    let outcome = match planned.resulting_state {
        ApprovalState::Rejected => AuditOutcome::Rejected,
        _ => AuditOutcome::Success,
    };
    state.audit.emit(
        AuditEvent::new(
            Some(order.id.clone()),
            Uuid::new_v4().to_string(),
            "approval.ledger_advanced",
            AuditCategory::Approval,
            planned.acting_user.clone(),
            outcome,
        )
        .with_metadata("level", planned.level.to_string())
        .with_metadata("act_approv", planned.new_act_approv.to_string()),
    );

    notify_after_advance(&state, &order, &planned).await;

    Ok(Json(StatusUpdateResponse {
        success: true,
        message: match planned.resulting_state {
            ApprovalState::Approved => format!("order {order_id} fully approved"),
            ApprovalState::Rejected => format!("order {order_id} rejected"),
            ApprovalState::Pending { reached } => {
                format!("order {order_id} approved through level {reached}")
            }
        },
        new_status: planned.new_act_approv,
        required_level: order.required_auth_level,
    }))
}

fn decode_action(
    request: &StatusUpdateRequest,
    actor: &ActorContext,
) -> Result<ApprovalAction, ApiError> {
    if request.new_status_id == REJECTED_SENTINEL {
        let reason = request.rejection_reason.clone().unwrap_or_default();
        return Ok(ApprovalAction::Reject { reason });
    }

    if request.new_status_id != i64::from(actor.authorization_level) {
        return Err(ApiError::BadRequest(format!(
            "newStatusId must be the caller's level ({}) or the rejection sentinel {}",
            actor.authorization_level, REJECTED_SENTINEL
        )));
    }

    Ok(ApprovalAction::Approve)
}

// Runs after the ledger transaction has committed; a recipient lookup
// failure must not turn a durable approval into an error response.
async fn notify_after_advance(state: &AppState, order: &FreightOrder, planned: &PlannedTransition) {
    match planned.resulting_state {
        ApprovalState::Approved => {
            state
                .send_notification(ApprovalNotification::OrderApproved {
                    order_id: order.id.clone(),
                    recipient: order.created_by.clone(),
                })
                .await;
        }
        ApprovalState::Rejected => {
            state
                .send_notification(ApprovalNotification::OrderRejected {
                    order_id: order.id.clone(),
                    level: planned.level,
                    reason: planned.rejection_reason.clone().unwrap_or_default(),
                    recipient: order.created_by.clone(),
                })
                .await;
        }
        ApprovalState::Pending { reached } => {
            let next_level = reached + 1;
            match SqlApproverRepository::new(state.db_pool.clone())
                .resolve(next_level, &order.plant)
                .await
            {
                Ok(Some(approver)) => {
                    state
                        .send_notification(ApprovalNotification::ApprovalNeeded {
                            order_id: order.id.clone(),
                            level: next_level,
                            recipient: approver.email,
                        })
                        .await;
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        order_id = %order.id,
                        level = next_level,
                        %error,
                        "could not resolve the next approver to notify"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{header, HeaderMap, HeaderValue};
    use axum::Json;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use freightgate_core::audit::{AuditOutcome, InMemoryAuditSink};
    use freightgate_core::domain::approver::{ApprovalLevel, Approver};
    use freightgate_core::domain::ledger::REJECTED_SENTINEL;
    use freightgate_core::domain::order::{FreightOrder, OrderId, OrderStatus};
    use freightgate_core::levels::CurrencyRates;
    use freightgate_db::repositories::{
        ApproverRepository, LedgerRepository, OrderRepository, SessionRecord, SessionRepository,
        SqlApproverRepository, SqlLedgerRepository, SqlOrderRepository, SqlSessionRepository,
    };
    use freightgate_db::{connect_with_settings, migrations, DbPool};
    use freightgate_notify::{ApprovalNotification, RecordingNotifier};

    use super::{update_status, StatusUpdateRequest};
    use crate::api::{ApiError, AppState};

    async fn setup() -> (AppState, RecordingNotifier, InMemoryAuditSink) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let notifier = RecordingNotifier::default();
        let audit = InMemoryAuditSink::default();
        let state = AppState {
            db_pool: pool,
            rates: CurrencyRates::default(),
            edit_token_ttl_hours: 72,
            notifier: Arc::new(notifier.clone()),
            audit: Arc::new(audit.clone()),
        };
        (state, notifier, audit)
    }

    async fn seed_world(pool: &DbPool, required: u8) -> OrderId {
        let approvers = SqlApproverRepository::new(pool.clone());
        let sessions = SqlSessionRepository::new(pool.clone());
        for level in 1..=8u8 {
            approvers
                .save(Approver {
                    user_id: format!("u-10{level:02}"),
                    name: format!("Approver {level}"),
                    email: format!("approver{level}@freightgate.test"),
                    level: ApprovalLevel::new(level).expect("level"),
                    plant: None,
                })
                .await
                .expect("approver");
            sessions
                .save(SessionRecord {
                    token: format!("tok-{level}"),
                    user_id: format!("u-10{level:02}"),
                    authorization_level: level,
                    plant: Some("3310".to_string()),
                    created_at: Utc::now(),
                    expires_at: None,
                })
                .await
                .expect("session");
        }

        let now = Utc::now();
        let order_id = OrderId("PF-7001".to_string());
        SqlOrderRepository::new(pool.clone())
            .create(FreightOrder {
                id: order_id.clone(),
                plant: "3310".to_string(),
                description: "expedited freight".to_string(),
                cost_amount: Decimal::new(200_000, 2),
                cost_currency: "EUR".to_string(),
                cost_eur: Decimal::new(200_000, 2),
                required_auth_level: required,
                created_by: "u-2001".to_string(),
                status: OrderStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("order");
        order_id
    }

    fn auth(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    fn approve_request(order_id: &str, level: u8) -> StatusUpdateRequest {
        StatusUpdateRequest {
            order_id: order_id.to_string(),
            new_status_id: i64::from(level),
            user_level: level,
            user_id: format!("u-10{level:02}"),
            auth_date: Some(Utc::now().to_rfc3339()),
            rejection_reason: None,
        }
    }

    #[tokio::test]
    async fn a_2000_eur_order_walks_levels_one_through_six() {
        let (state, notifier, audit) = setup().await;
        let order_id = seed_world(&state.db_pool, 6).await;

        for level in 1..=6u8 {
            let Json(response) = update_status(
                State(state.clone()),
                auth(&format!("tok-{level}")),
                Json(approve_request(&order_id.0, level)),
            )
            .await
            .expect("approve");
            assert!(response.success);
            assert_eq!(response.new_status, i64::from(level));
            assert_eq!(response.required_level, 6);
        }

        let order = SqlOrderRepository::new(state.db_pool.clone())
            .find_by_id(&order_id)
            .await
            .expect("find")
            .expect("order");
        assert_eq!(order.status, OrderStatus::Approved);

        let history =
            SqlLedgerRepository::new(state.db_pool.clone()).history(&order_id).await.expect("history");
        assert_eq!(history.len(), 6);

        // Five handoffs to the next approver, then the creator's completion mail.
        let sent = notifier.sent();
        assert_eq!(sent.len(), 6);
        assert!(matches!(sent[4], ApprovalNotification::ApprovalNeeded { level: 6, .. }));
        assert!(matches!(sent[5], ApprovalNotification::OrderApproved { .. }));

        let events = audit.events();
        assert_eq!(events.len(), 6);
        assert!(events.iter().all(|event| event.outcome == AuditOutcome::Success));
    }

    #[tokio::test]
    async fn out_of_turn_approvals_are_refused() {
        let (state, _notifier, _audit) = setup().await;
        let order_id = seed_world(&state.db_pool, 6).await;

        let err = update_status(
            State(state),
            auth("tok-3"),
            Json(approve_request(&order_id.0, 3)),
        )
        .await
        .expect_err("level 3 cannot move first");
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rejection_at_level_three_terminates_the_chain() {
        let (state, notifier, audit) = setup().await;
        let order_id = seed_world(&state.db_pool, 6).await;

        for level in 1..=2u8 {
            update_status(
                State(state.clone()),
                auth(&format!("tok-{level}")),
                Json(approve_request(&order_id.0, level)),
            )
            .await
            .expect("approve");
        }

        let Json(response) = update_status(
            State(state.clone()),
            auth("tok-3"),
            Json(StatusUpdateRequest {
                order_id: order_id.0.clone(),
                new_status_id: REJECTED_SENTINEL,
                user_level: 3,
                user_id: "u-1003".to_string(),
                auth_date: None,
                rejection_reason: Some("carrier invoice disagrees with quote".to_string()),
            }),
        )
        .await
        .expect("reject");
        assert_eq!(response.new_status, REJECTED_SENTINEL);

        let order = SqlOrderRepository::new(state.db_pool.clone())
            .find_by_id(&order_id)
            .await
            .expect("find")
            .expect("order");
        assert_eq!(order.status, OrderStatus::Rejected);

        let err = update_status(
            State(state),
            auth("tok-4"),
            Json(approve_request(&order_id.0, 4)),
        )
        .await
        .expect_err("rejected orders accept nothing further");
        assert!(matches!(err, ApiError::Forbidden(_)));

        let sent = notifier.sent();
        assert!(matches!(sent.last(), Some(ApprovalNotification::OrderRejected { level: 3, .. })));

        let events = audit.events();
        assert_eq!(events.last().map(|event| event.outcome.clone()), Some(AuditOutcome::Rejected));
    }

    #[tokio::test]
    async fn empty_rejection_reasons_are_a_bad_request() {
        let (state, _notifier, _audit) = setup().await;
        let order_id = seed_world(&state.db_pool, 6).await;

        let err = update_status(
            State(state),
            auth("tok-1"),
            Json(StatusUpdateRequest {
                order_id: order_id.0.clone(),
                new_status_id: REJECTED_SENTINEL,
                user_level: 1,
                user_id: "u-1001".to_string(),
                auth_date: None,
                rejection_reason: Some("   ".to_string()),
            }),
        )
        .await
        .expect_err("blank reason");
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn body_identity_must_match_the_session() {
        let (state, _notifier, _audit) = setup().await;
        let order_id = seed_world(&state.db_pool, 6).await;

        let mut request = approve_request(&order_id.0, 1);
        request.user_id = "u-1002".to_string();

        let err = update_status(State(state.clone()), auth("tok-1"), Json(request))
            .await
            .expect_err("mismatched userID");
        assert!(matches!(err, ApiError::Forbidden(_)));

        let mut request = approve_request(&order_id.0, 1);
        request.user_level = 2;
        request.new_status_id = 2;

        let err = update_status(State(state), auth("tok-1"), Json(request))
            .await
            .expect_err("mismatched userLevel");
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn a_notification_lookup_failure_does_not_void_a_committed_approval() {
        let (state, notifier, _audit) = setup().await;
        let order_id = seed_world(&state.db_pool, 6).await;

        // Break the approver lookup after the sessions and the order exist.
        sqlx::query("DROP TABLE approver").execute(&state.db_pool).await.expect("drop table");

        let Json(response) = update_status(
            State(state.clone()),
            auth("tok-1"),
            Json(approve_request(&order_id.0, 1)),
        )
        .await
        .expect("approval committed despite the lookup failure");
        assert!(response.success);

        let history =
            SqlLedgerRepository::new(state.db_pool.clone()).history(&order_id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn unknown_orders_are_not_found() {
        let (state, _notifier, _audit) = setup().await;
        seed_world(&state.db_pool, 6).await;

        let err = update_status(
            State(state),
            auth("tok-1"),
            Json(approve_request("PF-missing", 1)),
        )
        .await
        .expect_err("missing order");
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
